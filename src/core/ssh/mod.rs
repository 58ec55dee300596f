//! Remote sessions.
//!
//! [`RemoteSession`] is the seam between the deployment pipeline and the
//! transport. [`OpenSshConnector`] is the production implementation; tests
//! drive the pipeline with in-memory sessions.

mod client;

pub use client::{OpenSshConnector, OpenSshSession};

use std::ops::{Deref, DerefMut};
use std::path::Path;

use crate::config::ServerConfig;
use crate::error::Result;

/// Which remote stream a line of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One authenticated connection to a remote host.
pub trait RemoteSession {
    /// Push a local file to `remote_path` over the file-transfer sub-channel.
    fn upload(&mut self, local_path: &Path, remote_path: &str) -> Result<()>;

    /// Run a shell command. Output lines are passed to `sink` as they arrive.
    ///
    /// `Ok` carries the remote exit code, zero or not. `Err` means the
    /// command could not be dispatched or its channel broke.
    fn exec(&mut self, command: &str, sink: &mut dyn FnMut(StreamKind, &str))
        -> Result<CommandOutput>;

    /// Tear the connection down. Must be safe to call more than once.
    fn close(&mut self) -> Result<()>;
}

/// Opens sessions to a configured server.
pub trait Connector {
    type Session: RemoteSession;

    fn connect(&self, server: &ServerConfig) -> Result<Self::Session>;
}

/// Owns a session for the length of a pipeline run and closes it when
/// dropped, unless it was already closed explicitly.
pub struct SessionGuard<S: RemoteSession> {
    session: S,
    closed: bool,
}

impl<S: RemoteSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    /// Close the session now and report the result.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.session.close()
    }
}

impl<S: RemoteSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: RemoteSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: RemoteSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.session.close() {
            log_warn!("ssh", "failed to close session: {}", err);
        }
    }
}
