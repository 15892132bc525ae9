//! Passphrase/keyfile key derivation.
//!
//! Derivation is deterministic in (passphrase, keyfile contents, iteration
//! count, algorithm): the same inputs always reproduce the same key, which is
//! what lets a chain root be re-derived at every invocation instead of being
//! stored anywhere.

use std::path::PathBuf;

use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use crate::xkey::XKey;
use crate::KEY_BYTES_MAX;

/// Default PBKDF2 work factor; config and command flags override.
pub const DEFAULT_ITERATIONS: u32 = 50_000;

const KDF_SALT_PREFIX: &[u8] = b"keyfs/kdf/v1/";

/// Parameters for a single key derivation.
#[derive(Debug, Clone)]
pub struct KeyParam {
    /// Target algorithm; `None` selects the registry default.
    pub alg: Option<KeyAlg>,
    /// PBKDF2 work factor; must be positive.
    pub iterations: u32,
    /// Supplementary secret material mixed with the passphrase.
    pub keyfile: Option<PathBuf>,
    /// Derive from the keyfile alone.
    pub no_passphrase: bool,
}

impl Default for KeyParam {
    fn default() -> Self {
        Self {
            alg: None,
            iterations: DEFAULT_ITERATIONS,
            keyfile: None,
            no_passphrase: false,
        }
    }
}

impl KeyParam {
    /// Check the parameter combination before any secret is touched.
    pub fn validate(&self) -> KeyfsResult<()> {
        if self.iterations == 0 {
            return Err(KeyfsError::Usage("iteration count must be positive".into()));
        }
        if self.no_passphrase && self.keyfile.is_none() {
            return Err(KeyfsError::Usage(
                "a keyfile is required when the passphrase is disabled".into(),
            ));
        }
        Ok(())
    }
}

/// Derive key material from a passphrase and optional keyfile.
///
/// The caller owns the passphrase; nothing is retained here and every
/// intermediate buffer is wiped on all exit paths.
pub fn derive(passphrase: &SecretString, params: &KeyParam) -> KeyfsResult<XKey> {
    params.validate()?;
    let alg = params.alg.unwrap_or_default();

    let mut secret = Zeroizing::new(Vec::new());
    if !params.no_passphrase {
        secret.extend_from_slice(passphrase.expose_secret().as_bytes());
    }
    if let Some(path) = &params.keyfile {
        let contents = Zeroizing::new(std::fs::read(path).map_err(|e| {
            KeyfsError::Io(std::io::Error::new(
                e.kind(),
                format!("keyfile {}: {e}", path.display()),
            ))
        })?);
        let mut hasher = Sha512::new();
        hasher.update(&contents);
        let mut digest = Zeroizing::new([0u8; 64]);
        digest.copy_from_slice(&hasher.finalize());
        secret.extend_from_slice(&digest[..]);
    }

    let mut salt = Vec::from(KDF_SALT_PREFIX);
    salt.extend_from_slice(alg.name().as_bytes());

    let mut okm = Zeroizing::new([0u8; KEY_BYTES_MAX]);
    pbkdf2::pbkdf2_hmac::<Sha512>(&secret, &salt, params.iterations, &mut okm[..alg.key_size()]);

    tracing::debug!(alg = %alg, iterations = params.iterations, "key derived");
    XKey::new(alg, &okm[..alg.key_size()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Iteration counts are tiny here; derivation cost is irrelevant to the
    // properties under test.
    fn fast_params(alg: KeyAlg, iterations: u32) -> KeyParam {
        KeyParam {
            alg: Some(alg),
            iterations,
            keyfile: None,
            no_passphrase: false,
        }
    }

    #[test]
    fn test_derive_deterministic() {
        let passphrase = SecretString::from("correcthorse");
        let params = fast_params(KeyAlg::Aes256Ctr, 1000);

        let a = derive(&passphrase, &params).unwrap();
        let b = derive(&passphrase, &params).unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(a.secret_bytes(), b.secret_bytes());
    }

    #[test]
    fn test_iteration_count_changes_key() {
        let passphrase = SecretString::from("correcthorse");

        let a = derive(&passphrase, &fast_params(KeyAlg::Aes256Ctr, 1000)).unwrap();
        let b = derive(&passphrase, &fast_params(KeyAlg::Aes256Ctr, 1001)).unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_algorithm_changes_key() {
        let passphrase = SecretString::from("correcthorse");

        let a = derive(&passphrase, &fast_params(KeyAlg::Aes256Ctr, 100)).unwrap();
        let b = derive(&passphrase, &fast_params(KeyAlg::Chacha20, 100)).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.secret_bytes().len(), 32);
    }

    #[test]
    fn test_keyfile_mixed_into_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("secret.bin");
        let mut f = std::fs::File::create(&keyfile).unwrap();
        f.write_all(b"supplementary material").unwrap();

        let passphrase = SecretString::from("correcthorse");
        let plain = derive(&passphrase, &fast_params(KeyAlg::Aes128Ctr, 100)).unwrap();

        let mut with_file = fast_params(KeyAlg::Aes128Ctr, 100);
        with_file.keyfile = Some(keyfile);
        let mixed = derive(&passphrase, &with_file).unwrap();

        assert_ne!(plain.id(), mixed.id());
    }

    #[test]
    fn test_keyfile_only_derivation() {
        let dir = tempfile::tempdir().unwrap();
        let keyfile = dir.path().join("secret.bin");
        std::fs::write(&keyfile, b"only material").unwrap();

        let params = KeyParam {
            alg: Some(KeyAlg::Aes128Ctr),
            iterations: 100,
            keyfile: Some(keyfile),
            no_passphrase: true,
        };
        let empty = SecretString::from("");
        let ignored = SecretString::from("ignored entirely");

        let a = derive(&empty, &params).unwrap();
        let b = derive(&ignored, &params).unwrap();
        assert_eq!(a.id(), b.id(), "passphrase must not contribute");
    }

    #[test]
    fn test_no_passphrase_requires_keyfile() {
        let params = KeyParam {
            no_passphrase: true,
            ..KeyParam::default()
        };
        assert!(matches!(
            derive(&SecretString::from("x"), &params),
            Err(KeyfsError::Usage(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let params = fast_params(KeyAlg::Aes128Ctr, 0);
        assert!(matches!(
            derive(&SecretString::from("x"), &params),
            Err(KeyfsError::Usage(_))
        ));
    }

    #[test]
    fn test_missing_keyfile_is_io_error() {
        let mut params = fast_params(KeyAlg::Aes128Ctr, 100);
        params.keyfile = Some(PathBuf::from("/nonexistent/keyfile"));
        assert!(matches!(
            derive(&SecretString::from("x"), &params),
            Err(KeyfsError::Io(_))
        ));
    }
}
