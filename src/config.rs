//! Configuration for reloaders and registries.
//!
//! # Command line flags
//!
//! | Flag                       | Default  | Meaning                 |
//! |----------------------------|----------|-------------------------|
//! | `--tls-cert-path`          | None     | PEM certificate (chain) file; repeat for more pairs |
//! | `--tls-key-path`           | None     | PEM private key file; repeat, in the same order |
//! | `--tls-reload-debounce-ms` | 1000     | Quiet period after a change before reloading |
//!
//! The n-th `--tls-cert-path` is paired with the n-th `--tls-key-path`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::api::{CertificateLoader, WatchSource};

/// Delay between noticing a change to a certificate and reloading it.
pub const DEFAULT_RELOAD_DEBOUNCE: Duration = Duration::from_secs(1);

/// Command line arguments for building a [`crate::ReloaderRegistry`].
/// Intended to be `#[command(flatten)]`ed into a server's own arguments.
#[derive(clap::Args, Debug)]
#[group(id = "reloadable_tls_args")]
pub struct Args {
    /// Certificate files.
    #[arg(
        long = "tls-cert-path",
        help = "Path to a TLS certificate (chain) in PEM format. May be repeated."
    )]
    pub cert_path: Vec<PathBuf>,

    /// Key files, one per certificate file.
    #[arg(
        long = "tls-key-path",
        help = "Path to the TLS private key in PEM format for the certificate at the same position."
    )]
    pub key_path: Vec<PathBuf>,

    /// Debounce interval in milliseconds.
    #[arg(
        long = "tls-reload-debounce-ms",
        default_value_t = 1000,
        help = "Milliseconds to wait after a certificate file changes before reloading it."
    )]
    pub reload_debounce_ms: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            cert_path: Vec::new(),
            key_path: Vec::new(),
            reload_debounce_ms: DEFAULT_RELOAD_DEBOUNCE.as_millis() as u64,
        }
    }
}

/// Error type returned by [`Args::pairs`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Different numbers of certificate and key paths were given.
    #[error("{certs} --tls-cert-path but {keys} --tls-key-path given")]
    UnpairedPaths {
        /// Number of certificate paths.
        certs: usize,
        /// Number of key paths.
        keys: usize,
    },
}

/// Locations of one certificate and its private key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertKeyPair {
    /// PEM certificate chain, leaf first.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

impl CertKeyPair {
    /// Pair `cert_path` with `key_path`.
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

impl Args {
    /// The configured pairs, in command line order.
    pub fn pairs(&self) -> Result<Vec<CertKeyPair>, ConfigError> {
        if self.cert_path.len() != self.key_path.len() {
            return Err(ConfigError::UnpairedPaths {
                certs: self.cert_path.len(),
                keys: self.key_path.len(),
            });
        }
        Ok(self
            .cert_path
            .iter()
            .zip(self.key_path.iter())
            .map(|(c, k)| CertKeyPair::new(c, k))
            .collect())
    }

    /// The configured debounce interval.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.reload_debounce_ms)
    }

    /// Default [`ReloaderOptions`] with the configured debounce interval.
    #[cfg(feature = "notify")]
    pub fn options(&self) -> ReloaderOptions {
        ReloaderOptions::default().with_debounce(self.debounce())
    }
}

/// Collaborators and tuning shared by the reloaders of a registry.
#[derive(Clone)]
pub struct ReloaderOptions {
    /// Quiet period after a change before reloading.
    pub debounce: Duration,
    /// Reads and parses certificate and key files.
    pub loader: Arc<dyn CertificateLoader>,
    /// Supplies file change notifications.
    pub watch_source: Arc<dyn WatchSource>,
}

impl ReloaderOptions {
    /// Options using `loader` and `watch_source` with the default debounce.
    pub fn new(loader: Arc<dyn CertificateLoader>, watch_source: Arc<dyn WatchSource>) -> Self {
        Self {
            debounce: DEFAULT_RELOAD_DEBOUNCE,
            loader,
            watch_source,
        }
    }

    /// Replace the debounce interval.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

#[cfg(feature = "notify")]
impl Default for ReloaderOptions {
    fn default() -> Self {
        Self::new(
            Arc::new(crate::files::PemFileLoader::default()),
            Arc::new(crate::watch::NotifyWatchSource),
        )
    }
}

impl std::fmt::Debug for ReloaderOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("ReloaderOptions")
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}
