//! In-process key tables mirroring the driver's behavior.

use std::collections::HashMap;
use std::path::PathBuf;

use keyfs_core::{KeyAlg, KeyfsError, KeyfsResult};
use keyfs_crypto::XKey;

use crate::table::{KeyTable, Scope};

/// In-memory engine backend used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemoryKeyTable {
    filesystems: HashMap<PathBuf, Vec<XKey>>,
    nodes: HashMap<PathBuf, XKey>,
}

impl MemoryKeyTable {
    pub fn new() -> Self {
        Self::default()
    }
}

fn reject_sentinel(key: &XKey) -> KeyfsResult<()> {
    if key.alg() == KeyAlg::Invalid {
        return Err(KeyfsError::Usage(
            "the end-of-chain sentinel is not an installable key".into(),
        ));
    }
    Ok(())
}

impl KeyTable for MemoryKeyTable {
    fn install(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()> {
        let root = scope.filesystem()?;
        reject_sentinel(key)?;

        let table = self.filesystems.entry(root.to_path_buf()).or_default();
        if let Some(existing) = table.iter().find(|k| k.id() == key.id()) {
            if existing.alg() != key.alg() || existing.secret_bytes() != key.secret_bytes() {
                return Err(KeyfsError::Engine(format!(
                    "key id collision for {}",
                    key.id()
                )));
            }
            return Ok(());
        }
        table.push(key.clone());
        Ok(())
    }

    fn remove(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<bool> {
        let root = scope.filesystem()?;
        let Some(table) = self.filesystems.get_mut(root) else {
            return Ok(false);
        };
        let Some(pos) = table.iter().position(|k| k.id() == key.id()) else {
            return Ok(false);
        };
        table.remove(pos);
        Ok(true)
    }

    fn remove_all(&mut self, scope: &Scope) -> KeyfsResult<()> {
        let root = scope.filesystem()?;
        self.filesystems.remove(root);
        Ok(())
    }

    fn query(&mut self, scope: &Scope) -> KeyfsResult<Option<XKey>> {
        let node = scope.node()?;
        Ok(self.nodes.get(node).cloned())
    }

    fn enumerate(&mut self, scope: &Scope, index: u32) -> KeyfsResult<Option<XKey>> {
        let root = scope.filesystem()?;
        Ok(self
            .filesystems
            .get(root)
            .and_then(|table| table.get(index as usize))
            .map(|k| k.clone().with_index(index)))
    }

    fn bind(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()> {
        let node = scope.node()?;
        reject_sentinel(key)?;
        self.nodes.insert(node.to_path_buf(), key.clone());
        Ok(())
    }
}
