use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from keyfs.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyfsConfig {
    pub kdf: KdfConfig,
    pub chain: ChainConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    /// Default cipher for derived keys (overridden per command)
    pub algorithm: String,
    /// Default PBKDF2 iteration count
    pub iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Lower bound for randomchain filler entries (inclusive)
    pub random_min: u32,
    /// Upper bound for randomchain filler entries (exclusive)
    pub random_max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine control socket path
    pub socket: PathBuf,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            algorithm: "aes128-ctr".into(),
            iterations: 50_000,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            random_min: 8,
            random_max: 16,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            socket: PathBuf::from("/run/keyfsd/keyfsd.sock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[kdf]
algorithm = "aes256-ctr"
iterations = 100000

[chain]
random_min = 4
random_max = 10

[engine]
socket = "/tmp/keyfsd.sock"
"#;
        let config: KeyfsConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.kdf.algorithm, "aes256-ctr");
        assert_eq!(config.kdf.iterations, 100_000);
        assert_eq!(config.chain.random_min, 4);
        assert_eq!(config.chain.random_max, 10);
        assert_eq!(config.engine.socket, PathBuf::from("/tmp/keyfsd.sock"));
    }

    #[test]
    fn test_parse_defaults() {
        let config: KeyfsConfig = toml::from_str("").unwrap();

        assert_eq!(config.kdf.algorithm, "aes128-ctr");
        assert_eq!(config.kdf.iterations, 50_000);
        assert_eq!(config.chain.random_min, 8);
        assert_eq!(config.chain.random_max, 16);
        assert_eq!(config.engine.socket, PathBuf::from("/run/keyfsd/keyfsd.sock"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[kdf]
iterations = 200000
"#;
        let config: KeyfsConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.kdf.iterations, 200_000);
        // Defaults
        assert_eq!(config.kdf.algorithm, "aes128-ctr");
        assert_eq!(config.chain.random_max, 16);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = KeyfsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: KeyfsConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.kdf.algorithm, parsed.kdf.algorithm);
        assert_eq!(config.chain.random_min, parsed.chain.random_min);
        assert_eq!(config.engine.socket, parsed.engine.socket);
    }
}
