//! Wire format for the driver control socket.
//!
//! One JSON object per line in each direction. Key bytes travel
//! base64-encoded inside `KeyRecord`; records wipe the encoding on drop and
//! the client wipes its serialized request lines after writing them.

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use keyfs_crypto::XKey;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

/// Key material as it crosses the control socket.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub alg: u8,
    /// base64 of the algorithm-sized key bytes
    pub key: String,
    #[serde(default)]
    pub index: u32,
}

impl KeyRecord {
    pub fn from_xkey(key: &XKey) -> Self {
        Self {
            alg: key.alg().id(),
            key: BASE64.encode(key.secret_bytes()),
            index: key.index(),
        }
    }

    pub fn into_xkey(self) -> KeyfsResult<XKey> {
        let alg = KeyAlg::from_id(self.alg)
            .ok_or_else(|| KeyfsError::Engine(format!("unknown algorithm id {}", self.alg)))?;
        let bytes = Zeroizing::new(
            BASE64
                .decode(&self.key)
                .map_err(|e| KeyfsError::Engine(format!("malformed key record: {e}")))?,
        );
        Ok(XKey::new(alg, &bytes)?.with_index(self.index))
    }
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Install { root: PathBuf, key: KeyRecord },
    Remove { root: PathBuf, key: KeyRecord },
    RemoveAll { root: PathBuf },
    Query { node: PathBuf },
    Enumerate { root: PathBuf, index: u32 },
    Bind { node: PathBuf, key: KeyRecord },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<KeyRecord>,
        #[serde(default)]
        removed: bool,
    },
    Err {
        message: String,
    },
}
