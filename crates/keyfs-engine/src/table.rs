//! The key-table control contract.

use std::path::{Path, PathBuf};

use keyfs_core::{KeyfsError, KeyfsResult};
use keyfs_crypto::XKey;

/// Granularity of an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A whole mounted filesystem, by its root.
    Filesystem(PathBuf),
    /// A single file or directory inside a mounted filesystem.
    Node(PathBuf),
}

impl Scope {
    pub fn path(&self) -> &Path {
        match self {
            Scope::Filesystem(p) | Scope::Node(p) => p,
        }
    }

    pub(crate) fn filesystem(&self) -> KeyfsResult<&Path> {
        match self {
            Scope::Filesystem(p) => Ok(p),
            Scope::Node(p) => Err(KeyfsError::Usage(format!(
                "{}: operation requires a filesystem scope",
                p.display()
            ))),
        }
    }

    pub(crate) fn node(&self) -> KeyfsResult<&Path> {
        match self {
            Scope::Node(p) => Ok(p),
            Scope::Filesystem(p) => Err(KeyfsError::Usage(format!(
                "{}: operation requires a file or directory scope",
                p.display()
            ))),
        }
    }
}

/// Control protocol to the encryption engine's key tables.
///
/// Every operation is scope-bound: installing, removing, and enumerating act
/// on a filesystem table; querying and binding act on a single node. A scope
/// kind mismatch is a usage error, never a silent degrade.
pub trait KeyTable {
    /// Register `key` for content decryption within a filesystem. Installing
    /// the identical key again is a no-op; a colliding fingerprint with
    /// different bytes is rejected.
    fn install(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()>;

    /// Unregister a key by identity. `false` when it was not installed.
    fn remove(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<bool>;

    /// Unregister every key in the scope; succeeds on an empty table.
    fn remove_all(&mut self, scope: &Scope) -> KeyfsResult<()>;

    /// The key protecting a single node, if one has been assigned.
    fn query(&mut self, scope: &Scope) -> KeyfsResult<Option<XKey>>;

    /// The key at `index` in installation order; `None` past the end. The
    /// returned key carries `index`.
    fn enumerate(&mut self, scope: &Scope, index: u32) -> KeyfsResult<Option<XKey>>;

    /// Assign the key that encrypts a node from now on.
    fn bind(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()>;
}
