//! Chain-entry wrapping: one key sealed under another.
//!
//! Record layout (plaintext): `[alg id][key len][key bytes; 32]` — 34 bytes,
//! fixed, so filler and real successors are the same size on disk. Sealed as
//! `nonce ‖ XChaCha20-Poly1305 ciphertext`. The AEAD key is expanded from the
//! wrapping key with HKDF-SHA256 so wrapping keys of any registry size drive
//! a 256-bit cipher key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::xkey::XKey;
use crate::{KEY_BYTES_MAX, NONCE_SIZE, TAG_SIZE};

const WRAP_INFO: &[u8] = b"keyfs/wrap/v1";
const RECORD_SIZE: usize = 2 + KEY_BYTES_MAX;

/// Total size of a sealed successor record.
pub const WRAPPED_SIZE: usize = NONCE_SIZE + RECORD_SIZE + TAG_SIZE;

fn wrap_cipher(wrapping: &XKey) -> KeyfsResult<XChaCha20Poly1305> {
    let hk = Hkdf::<Sha256>::new(None, wrapping.secret_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_INFO, &mut okm[..])
        .map_err(|e| KeyfsError::Other(anyhow::anyhow!("HKDF expand failed: {e}")))?;
    Ok(XChaCha20Poly1305::new((&*okm).into()))
}

/// Seal `successor` under `wrapping` for the chain store.
pub fn wrap_xkey(wrapping: &XKey, successor: &XKey) -> KeyfsResult<Vec<u8>> {
    let cipher = wrap_cipher(wrapping)?;

    let mut record = Zeroizing::new([0u8; RECORD_SIZE]);
    let bytes = successor.secret_bytes();
    record[0] = successor.alg().id();
    record[1] = bytes.len() as u8;
    record[2..2 + bytes.len()].copy_from_slice(bytes);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, &record[..])
        .map_err(|_| KeyfsError::Other(anyhow::anyhow!("chain entry encryption failed")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed successor record with `wrapping`.
///
/// An authentication failure means the entry was not written under this key
/// (or was tampered with) and is reported as `CorruptEntry`, distinct from an
/// absent entry.
pub fn unwrap_xkey(wrapping: &XKey, wrapped: &[u8]) -> KeyfsResult<XKey> {
    if wrapped.len() != WRAPPED_SIZE {
        return Err(KeyfsError::CorruptEntry(format!(
            "sealed record is {} bytes, expected {WRAPPED_SIZE}",
            wrapped.len()
        )));
    }
    let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_SIZE);
    let cipher = wrap_cipher(wrapping)?;
    let record = Zeroizing::new(
        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| KeyfsError::CorruptEntry("authentication failed".into()))?,
    );

    let alg = KeyAlg::from_id(record[0])
        .ok_or_else(|| KeyfsError::CorruptEntry(format!("unknown algorithm id {}", record[0])))?;
    let len = record[1] as usize;
    if len != alg.key_size() {
        return Err(KeyfsError::CorruptEntry(format!(
            "{len} byte key for {alg}"
        )));
    }
    XKey::new(alg, &record[2..2 + len])
}
