//! Synchronous Unix-socket client for the driver control endpoint.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use keyfs_core::{KeyfsError, KeyfsResult};
use keyfs_crypto::XKey;
use zeroize::Zeroize;

use crate::proto::{KeyRecord, Request, Response};
use crate::table::{KeyTable, Scope};

/// Client for the engine control socket. One request/response line per call.
pub struct UdsKeyTable {
    stream: BufReader<UnixStream>,
}

impl UdsKeyTable {
    pub fn connect(socket: &Path) -> KeyfsResult<Self> {
        let stream = UnixStream::connect(socket).map_err(|e| {
            KeyfsError::Engine(format!("connecting to {}: {e}", socket.display()))
        })?;
        tracing::debug!(socket = %socket.display(), "engine control socket connected");
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    fn call(&mut self, request: &Request) -> KeyfsResult<Response> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| KeyfsError::Engine(format!("encoding request: {e}")))?;
        line.push('\n');
        let written = self.stream.get_mut().write_all(line.as_bytes());
        line.zeroize();
        written.map_err(|e| KeyfsError::Engine(format!("engine write: {e}")))?;

        let mut reply = String::new();
        self.stream
            .read_line(&mut reply)
            .map_err(|e| KeyfsError::Engine(format!("engine read: {e}")))?;
        if reply.is_empty() {
            return Err(KeyfsError::Engine("engine closed the control socket".into()));
        }
        let response = serde_json::from_str(&reply)
            .map_err(|e| KeyfsError::Engine(format!("decoding response: {e}")));
        reply.zeroize();
        response
    }

    fn expect_ok(&mut self, request: &Request) -> KeyfsResult<(Option<KeyRecord>, bool)> {
        match self.call(request)? {
            Response::Ok { key, removed } => Ok((key, removed)),
            Response::Err { message } => Err(KeyfsError::Engine(message)),
        }
    }
}

impl KeyTable for UdsKeyTable {
    fn install(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()> {
        let root = scope.filesystem()?.to_path_buf();
        self.expect_ok(&Request::Install {
            root,
            key: KeyRecord::from_xkey(key),
        })?;
        Ok(())
    }

    fn remove(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<bool> {
        let root = scope.filesystem()?.to_path_buf();
        let (_, removed) = self.expect_ok(&Request::Remove {
            root,
            key: KeyRecord::from_xkey(key),
        })?;
        Ok(removed)
    }

    fn remove_all(&mut self, scope: &Scope) -> KeyfsResult<()> {
        let root = scope.filesystem()?.to_path_buf();
        self.expect_ok(&Request::RemoveAll { root })?;
        Ok(())
    }

    fn query(&mut self, scope: &Scope) -> KeyfsResult<Option<XKey>> {
        let node = scope.node()?.to_path_buf();
        let (key, _) = self.expect_ok(&Request::Query { node })?;
        key.map(KeyRecord::into_xkey).transpose()
    }

    fn enumerate(&mut self, scope: &Scope, index: u32) -> KeyfsResult<Option<XKey>> {
        let root = scope.filesystem()?.to_path_buf();
        let (key, _) = self.expect_ok(&Request::Enumerate { root, index })?;
        key.map(KeyRecord::into_xkey).transpose()
    }

    fn bind(&mut self, scope: &Scope, key: &XKey) -> KeyfsResult<()> {
        let node = scope.node()?.to_path_buf();
        self.expect_ok(&Request::Bind {
            node,
            key: KeyRecord::from_xkey(key),
        })?;
        Ok(())
    }
}
