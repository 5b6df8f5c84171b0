//! Seams between the reload engine and its collaborators.
//!
//! A [`CertificateReloader`] does not read PEM files or talk to the
//! operating system's change notification facility directly. It consumes
//! a [`CertificateLoader`] to turn a certificate and key file into a
//! [`CertifiedKey`] and a [`WatchSource`] to learn when the certificate
//! file has changed. Default implementations are
//! [`crate::files::PemFileLoader`] and (with the **notify** feature)
//! [`crate::watch::NotifyWatchSource`].
//!
//! Example of a custom loader which always returns the same pair:
//!
//! ```
//! use reloadable_tls::api::CertificateLoader;
//! use reloadable_tls::files::LoadError;
//! use rustls::sign::CertifiedKey;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Fixed(Arc<CertifiedKey>);
//!
//! impl CertificateLoader for Fixed {
//!     fn load(&self, _: &Path, _: &Path) -> Result<Arc<CertifiedKey>, LoadError> {
//!         Ok(Arc::clone(&self.0))
//!     }
//! }
//! ```
//!
//! [`CertificateReloader`]: crate::reloader::CertificateReloader

use futures::Stream;
use rustls::sign::CertifiedKey;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::files::LoadError;
use crate::watch::WatchError;

/// Turns a certificate file and a key file into a parsed pair.
pub trait CertificateLoader: Send + Sync {
    /// Read and parse both files. Implementations must not return a pair
    /// whose private key does not belong to the leaf certificate.
    fn load(&self, cert_path: &Path, key_path: &Path) -> Result<Arc<CertifiedKey>, LoadError>;
}

/// What happened to a watched path. All kinds are handled identically by
/// the reloader; the distinction is kept for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    /// Contents were written, or the path was (re)created.
    Write,
    /// The path was removed or renamed away.
    Remove,
    /// Ownership or permission bits changed.
    Permissions,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Write => "write",
            Self::Remove => "remove",
            Self::Permissions => "permissions",
        })
    }
}

/// Item produced by [`WatchEvents`].
#[derive(Debug)]
pub enum WatchEvent {
    /// Something changed at `path`.
    Changed {
        /// The affected path.
        path: PathBuf,
        /// Kind of change.
        kind: ChangeKind,
    },
    /// The watch source reported a problem. Not fatal.
    Error(WatchError),
}

/// Stream of notifications for every path registered on the paired
/// [`PathWatcher`]. The stream ends when the watcher is dropped.
pub type WatchEvents = Pin<Box<dyn Stream<Item = WatchEvent> + Send>>;

/// Registration handle returned by [`WatchSource::open`].
pub trait PathWatcher: Send {
    /// Start watching `path`. Watching a path that is already watched is
    /// not an error.
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Stop watching `path`.
    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError>;
}

/// Factory for file change notifications.
pub trait WatchSource: Send + Sync {
    /// Create a new watcher along with the stream of its events.
    fn open(&self) -> Result<(Box<dyn PathWatcher>, WatchEvents), WatchError>;
}

/// Lifecycle of a [`CertificateReloader`](crate::reloader::CertificateReloader).
///
/// ```text
/// Initialized --run()--> Running --(stop signal)--> Stopped
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LifecycleState {
    /// Constructed and holding a certificate, not yet watching.
    Initialized,
    /// Inside [`run`](crate::reloader::CertificateReloader::run).
    Running,
    /// Terminal.
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}
