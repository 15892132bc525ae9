//! Cipher algorithm registry.
//!
//! The engine owns the cipher implementations; the registry only maps stable
//! identifiers to names and key sizes. `Invalid` is a real on-disk value: it
//! marks filler keys and explicit end-of-chain records and is never accepted
//! by name or installed into the engine.

use std::fmt;

use crate::error::{KeyfsError, KeyfsResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyAlg {
    /// End-of-chain / filler sentinel. Not a usable cipher.
    Invalid,
    #[default]
    Aes128Ctr,
    Aes192Ctr,
    Aes256Ctr,
    Chacha20,
}

impl KeyAlg {
    /// Every algorithm a key can actually be derived for.
    pub const ALL: [KeyAlg; 4] = [
        KeyAlg::Aes128Ctr,
        KeyAlg::Aes192Ctr,
        KeyAlg::Aes256Ctr,
        KeyAlg::Chacha20,
    ];

    /// Stable wire/store identifier.
    pub fn id(self) -> u8 {
        match self {
            KeyAlg::Invalid => 0,
            KeyAlg::Aes128Ctr => 1,
            KeyAlg::Aes192Ctr => 2,
            KeyAlg::Aes256Ctr => 3,
            KeyAlg::Chacha20 => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<KeyAlg> {
        match id {
            0 => Some(KeyAlg::Invalid),
            1 => Some(KeyAlg::Aes128Ctr),
            2 => Some(KeyAlg::Aes192Ctr),
            3 => Some(KeyAlg::Aes256Ctr),
            4 => Some(KeyAlg::Chacha20),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyAlg::Invalid => "invalid",
            KeyAlg::Aes128Ctr => "aes128-ctr",
            KeyAlg::Aes192Ctr => "aes192-ctr",
            KeyAlg::Aes256Ctr => "aes256-ctr",
            KeyAlg::Chacha20 => "chacha20",
        }
    }

    /// Key size in bytes. The sentinel uses the whole key buffer so filler
    /// records are indistinguishable from real ones by length.
    pub fn key_size(self) -> usize {
        match self {
            KeyAlg::Aes128Ctr => 16,
            KeyAlg::Aes192Ctr => 24,
            KeyAlg::Aes256Ctr | KeyAlg::Chacha20 | KeyAlg::Invalid => 32,
        }
    }

    /// Parse a user-supplied algorithm name. Case-insensitive; the `-ctr`
    /// suffix may be omitted. The sentinel is not nameable.
    pub fn parse(name: &str) -> KeyfsResult<KeyAlg> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "aes128-ctr" | "aes128" => Ok(KeyAlg::Aes128Ctr),
            "aes192-ctr" | "aes192" => Ok(KeyAlg::Aes192Ctr),
            "aes256-ctr" | "aes256" => Ok(KeyAlg::Aes256Ctr),
            "chacha20" => Ok(KeyAlg::Chacha20),
            _ => Err(KeyfsError::InvalidAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for KeyAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        for alg in KeyAlg::ALL {
            assert_eq!(KeyAlg::from_id(alg.id()), Some(alg));
        }
        assert_eq!(KeyAlg::from_id(KeyAlg::Invalid.id()), Some(KeyAlg::Invalid));
        assert_eq!(KeyAlg::from_id(200), None);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(KeyAlg::parse("AES256").unwrap(), KeyAlg::Aes256Ctr);
        assert_eq!(KeyAlg::parse("aes128-ctr").unwrap(), KeyAlg::Aes128Ctr);
        assert_eq!(KeyAlg::parse("ChaCha20").unwrap(), KeyAlg::Chacha20);
    }

    #[test]
    fn test_parse_rejects_unknown_and_sentinel() {
        assert!(matches!(
            KeyAlg::parse("des"),
            Err(KeyfsError::InvalidAlgorithm(_))
        ));
        assert!(KeyAlg::parse("invalid").is_err());
    }

    #[test]
    fn test_key_sizes() {
        assert_eq!(KeyAlg::Aes128Ctr.key_size(), 16);
        assert_eq!(KeyAlg::Aes192Ctr.key_size(), 24);
        assert_eq!(KeyAlg::Aes256Ctr.key_size(), 32);
        assert_eq!(KeyAlg::Invalid.key_size(), 32);
    }
}
