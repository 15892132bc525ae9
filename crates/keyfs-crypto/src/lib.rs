//! keyfs-crypto: key material, passphrase derivation, and chain-entry wrapping
//!
//! Key model:
//! ```text
//! passphrase [+ SHA-512 keyfile digest]
//!   └── PBKDF2-HMAC-SHA512 (iteration-counted) → XKey (algorithm-sized)
//!         ├── fingerprint: BLAKE3 derive-key → KeyId (8 bytes, public)
//!         └── wrap subkey: HKDF-SHA256 → XChaCha20-Poly1305 over the
//!             successor record persisted in the chain store
//! ```

pub mod kdf;
pub mod wrap;
pub mod xkey;

pub use kdf::{derive, KeyParam, DEFAULT_ITERATIONS};
pub use wrap::{unwrap_xkey, wrap_xkey, WRAPPED_SIZE};
pub use xkey::{KeyId, XKey};

/// Largest key size across the algorithm registry
pub const KEY_BYTES_MAX: usize = 32;

/// Public key fingerprint size
pub const KEYID_SIZE: usize = 8;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;
