//! Key material and public fingerprints.

use std::fmt;
use std::str::FromStr;

use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use rand::RngCore;
use zeroize::Zeroize;

use crate::{KEYID_SIZE, KEY_BYTES_MAX};

const KEYID_CONTEXT: &str = "keyfs v1 key fingerprint";

/// Public fingerprint of a key: BLAKE3 derive-key over (algorithm, key bytes).
///
/// Two keys with equal fingerprints are the same key for chain matching.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId([u8; KEYID_SIZE]);

impl KeyId {
    pub fn as_bytes(&self) -> &[u8; KEYID_SIZE] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({self})")
    }
}

impl FromStr for KeyId {
    type Err = KeyfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEYID_SIZE * 2 || !s.is_ascii() {
            return Err(KeyfsError::CorruptChain(format!("malformed key id: {s}")));
        }
        let mut out = [0u8; KEYID_SIZE];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| KeyfsError::CorruptChain(format!("malformed key id: {s}")))?;
        }
        Ok(KeyId(out))
    }
}

/// Key material for one chain element.
///
/// The buffer is fixed-size; only the first `alg.key_size()` bytes are
/// significant. Filler keys carrying the `Invalid` sentinel use the whole
/// buffer so they are indistinguishable from real keys by length. Wiped on
/// drop, including every clone.
#[derive(Clone)]
pub struct XKey {
    alg: KeyAlg,
    key: [u8; KEY_BYTES_MAX],
    id: KeyId,
    index: u32,
}

impl XKey {
    /// Build key material from algorithm-sized bytes.
    pub fn new(alg: KeyAlg, bytes: &[u8]) -> KeyfsResult<Self> {
        if bytes.len() != alg.key_size() {
            return Err(KeyfsError::CorruptEntry(format!(
                "{} byte key for {alg} (expected {})",
                bytes.len(),
                alg.key_size()
            )));
        }
        let mut key = [0u8; KEY_BYTES_MAX];
        key[..bytes.len()].copy_from_slice(bytes);
        let id = fingerprint(alg, &key[..alg.key_size()]);
        Ok(Self {
            alg,
            key,
            id,
            index: 0,
        })
    }

    /// Fresh random key for `alg`.
    pub fn random(alg: KeyAlg) -> Self {
        let mut key = [0u8; KEY_BYTES_MAX];
        rand::thread_rng().fill_bytes(&mut key[..alg.key_size()]);
        let id = fingerprint(alg, &key[..alg.key_size()]);
        Self {
            alg,
            key,
            id,
            index: 0,
        }
    }

    /// Random filler carrying the `Invalid` sentinel. Used for decoy chain
    /// records and end-of-chain terminators; never installed into the engine.
    pub fn random_filler() -> Self {
        Self::random(KeyAlg::Invalid)
    }

    pub fn alg(&self) -> KeyAlg {
        self.alg
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    /// Position reported by the engine when enumerating; 0 otherwise.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// The algorithm-sized significant prefix of the key buffer.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.key[..self.alg.key_size()]
    }
}

impl Drop for XKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for XKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XKey")
            .field("alg", &self.alg)
            .field("id", &self.id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

fn fingerprint(alg: KeyAlg, key: &[u8]) -> KeyId {
    let mut hasher = blake3::Hasher::new_derive_key(KEYID_CONTEXT);
    hasher.update(&[alg.id()]);
    hasher.update(key);
    let mut out = [0u8; KEYID_SIZE];
    hasher.finalize_xof().fill(&mut out);
    KeyId(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = XKey::new(KeyAlg::Aes256Ctr, &[7u8; 32]).unwrap();
        let b = XKey::new(KeyAlg::Aes256Ctr, &[7u8; 32]).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_fingerprint_depends_on_algorithm() {
        let a = XKey::new(KeyAlg::Aes256Ctr, &[7u8; 32]).unwrap();
        let b = XKey::new(KeyAlg::Chacha20, &[7u8; 32]).unwrap();
        assert_ne!(a.id(), b.id(), "same bytes, different algorithm");
    }

    #[test]
    fn test_random_keys_differ() {
        let a = XKey::random(KeyAlg::Aes128Ctr);
        let b = XKey::random(KeyAlg::Aes128Ctr);
        assert_ne!(a.secret_bytes(), b.secret_bytes());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_key_size_enforced() {
        assert!(XKey::new(KeyAlg::Aes128Ctr, &[0u8; 32]).is_err());
        assert!(XKey::new(KeyAlg::Aes128Ctr, &[0u8; 16]).is_ok());
    }

    #[test]
    fn test_keyid_display_roundtrip() {
        let key = XKey::random(KeyAlg::Aes256Ctr);
        let hex = key.id().to_string();
        assert_eq!(hex.len(), KEYID_SIZE * 2);
        assert_eq!(hex.parse::<KeyId>().unwrap(), key.id());
    }

    #[test]
    fn test_keyid_rejects_malformed() {
        assert!("zz00".parse::<KeyId>().is_err());
        assert!("0123".parse::<KeyId>().is_err());
    }

    #[test]
    fn test_debug_redacts_key_bytes() {
        let key = XKey::new(KeyAlg::Aes256Ctr, &[0xAA; 32]).unwrap();
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("170")); // 0xAA
    }
}
