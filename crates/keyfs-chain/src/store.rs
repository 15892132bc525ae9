//! Per-filesystem chain store.
//!
//! One JSON file per filesystem root, mapping a wrapping key's fingerprint to
//! the sealed successor record. Every mutation rewrites the whole file
//! through a temp file + rename in the same directory, so concurrent readers
//! observe either the old or the new store, never a mix. The map keyed by
//! fingerprint makes forward branching (two successors for one wrapping key)
//! unrepresentable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyfs_core::{KeyfsError, KeyfsResult};
use keyfs_crypto::{unwrap_xkey, wrap_xkey, KeyId, XKey};
use serde::{Deserialize, Serialize};

/// Store file name, relative to the filesystem root.
pub const STORE_FILE: &str = ".keyfs";

const STORE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// wrapping key id (hex) → base64(nonce ‖ sealed successor record)
    entries: BTreeMap<String, String>,
}

pub struct ChainStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ChainStore {
    /// Open the store for a filesystem root. A missing store file is an
    /// empty store; the file is created on first write.
    pub fn open(root: &Path) -> KeyfsResult<Self> {
        let path = root.join(STORE_FILE);
        let entries = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let file: StoreFile = serde_json::from_str(&content)
                .map_err(|e| KeyfsError::CorruptChain(format!("{}: {e}", path.display())))?;
            if file.version != STORE_VERSION {
                return Err(KeyfsError::CorruptChain(format!(
                    "{}: unsupported store version {}",
                    path.display(),
                    file.version
                )));
            }
            file.entries
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, entries })
    }

    /// Look up and open the successor sealed under `wrapping`.
    ///
    /// `None` means no entry exists for this key. A present entry that fails
    /// authentication is `CorruptEntry`.
    pub fn get_successor(&self, wrapping: &XKey) -> KeyfsResult<Option<XKey>> {
        let Some(encoded) = self.entries.get(&wrapping.id().to_string()) else {
            return Ok(None);
        };
        let sealed = BASE64
            .decode(encoded)
            .map_err(|e| KeyfsError::CorruptEntry(format!("entry {}: {e}", wrapping.id())))?;
        unwrap_xkey(wrapping, &sealed).map(Some)
    }

    /// Whether any entry is keyed by `id`, decryptable or not.
    pub fn contains(&self, id: &KeyId) -> bool {
        self.entries.contains_key(&id.to_string())
    }

    /// Seal `successor` under `wrapping` and persist, replacing any previous
    /// entry for the same wrapping key.
    pub fn put_successor(&mut self, wrapping: &XKey, successor: &XKey) -> KeyfsResult<()> {
        let sealed = wrap_xkey(wrapping, successor)?;
        self.entries
            .insert(wrapping.id().to_string(), BASE64.encode(sealed));
        self.flush()?;
        tracing::debug!(wrapping = %wrapping.id(), "chain entry written");
        Ok(())
    }

    /// Remove the entry keyed by `wrapping`. `false` when none existed.
    pub fn delete_successor(&mut self, wrapping: &XKey) -> KeyfsResult<bool> {
        if self.entries.remove(&wrapping.id().to_string()).is_none() {
            return Ok(false);
        }
        self.flush()?;
        tracing::debug!(wrapping = %wrapping.id(), "chain entry deleted");
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomic whole-file rewrite: temp file in the same directory, then
    /// rename over the store.
    fn flush(&self) -> KeyfsResult<()> {
        let file = StoreFile {
            version: STORE_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| KeyfsError::Other(anyhow::anyhow!("encoding chain store: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

fn io_err(path: &Path, e: std::io::Error) -> KeyfsError {
    KeyfsError::Io(std::io::Error::new(
        e.kind(),
        format!("{}: {e}", path.display()),
    ))
}
