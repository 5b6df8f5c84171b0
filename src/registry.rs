//! Select among several [`CertificateReloader`]s by server name.
//!
//! The names are taken from each reloader's leaf certificate when the
//! registry is built: the subject common name and every DNS subject
//! alternative name, including wildcard names. Certificate renewals which
//! change the set of names are not reflected until the registry is
//! rebuilt.
//!
//! ```no_run
//! use reloadable_tls::{CertKeyPair, ReloaderOptions, ReloaderRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ReloaderRegistry::build(
//!     [
//!         CertKeyPair::new("/etc/tls/www.crt", "/etc/tls/www.key"),
//!         CertKeyPair::new("/etc/tls/wildcard.crt", "/etc/tls/wildcard.key"),
//!     ],
//!     &ReloaderOptions::default(),
//! )?);
//! let server_config = rustls::ServerConfig::builder()
//!     .with_no_client_auth()
//!     .with_cert_resolver(Arc::clone(&registry) as _);
//! # let _ = server_config;
//! registry.run().await?;
//! # Ok(())
//! # }
//! ```

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{CertKeyPair, ReloaderOptions};
use crate::files::LoadError;
use crate::names::{LeafError, normalize, wildcard_for_domain};
use crate::reloader::{CertificateReloader, ReloaderError};

/// Error type returned by [`ReloaderRegistry::resolve`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The registry holds no names at all.
    #[error("no TLS certificates are configured")]
    NoReloadersConfigured,
    /// Neither the name nor its one-level wildcard is known.
    #[error("no TLS certificate matches {0:?}")]
    NoMatchingCertificate(String),
}

/// Error type returned when building a [`ReloaderRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A pair could not be loaded.
    #[error("loading {}: {source}", .cert_path.display())]
    Load {
        /// Certificate path of the pair.
        cert_path: PathBuf,
        /// Underlying error.
        source: LoadError,
    },
    /// Names could not be read from a leaf certificate.
    #[error("reading names from {}: {source}", .cert_path.display())]
    Leaf {
        /// Certificate path of the pair.
        cert_path: PathBuf,
        /// Underlying error.
        source: LeafError,
    },
}

/// Immutable map from server names to [`CertificateReloader`]s.
#[derive(Debug)]
pub struct ReloaderRegistry {
    by_name: HashMap<String, Arc<CertificateReloader>>,
    reloaders: Vec<Arc<CertificateReloader>>,
}

impl ReloaderRegistry {
    /// Construct one reloader per pair and index them by name. If two
    /// pairs claim the same name, the later one wins.
    pub fn build<I>(pairs: I, options: &ReloaderOptions) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = CertKeyPair>,
    {
        let reloaders = pairs
            .into_iter()
            .map(|pair| {
                CertificateReloader::new(pair.cert_path.clone(), pair.key_path, options)
                    .map(Arc::new)
                    .map_err(|source| RegistryError::Load {
                        cert_path: pair.cert_path,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_reloaders(reloaders)
    }

    /// Index already constructed reloaders by the names in their
    /// currently active certificates.
    pub fn from_reloaders<I>(reloaders: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<CertificateReloader>>,
    {
        let mut by_name = HashMap::new();
        let mut all = Vec::new();
        for reloader in reloaders {
            let md = reloader.metadata().map_err(|source| RegistryError::Leaf {
                cert_path: reloader.cert_path().to_owned(),
                source,
            })?;
            for name in md.names().map(normalize) {
                if name.is_empty() {
                    continue;
                }
                if let Some(previous) = by_name.insert(name.clone(), Arc::clone(&reloader)) {
                    if !Arc::ptr_eq(&previous, &reloader) {
                        log::debug!(
                            "{} is served by both {} and {}; using the latter",
                            name,
                            previous.cert_path().display(),
                            reloader.cert_path().display()
                        );
                    }
                }
            }
            all.push(reloader);
        }
        Ok(Self {
            by_name,
            reloaders: all,
        })
    }

    /// Find the reloader serving `server_name`: an exact match first,
    /// then the wildcard one level up.
    pub fn resolve(&self, server_name: &str) -> Result<Arc<CertificateReloader>, ResolveError> {
        if self.by_name.is_empty() {
            return Err(ResolveError::NoReloadersConfigured);
        }
        let name = normalize(server_name);
        if let Some(r) = self.by_name.get(&name) {
            return Ok(Arc::clone(r));
        }
        wildcard_for_domain(&name)
            .and_then(|w| self.by_name.get(&w))
            .map(Arc::clone)
            .ok_or(ResolveError::NoMatchingCertificate(name))
    }

    /// All reloaders, in construction order.
    pub fn reloaders(&self) -> &[Arc<CertificateReloader>] {
        &self.reloaders
    }

    /// Number of reloaders.
    pub fn len(&self) -> usize {
        self.reloaders.len()
    }

    /// Whether there are no reloaders.
    pub fn is_empty(&self) -> bool {
        self.reloaders.is_empty()
    }

    /// All known names and patterns, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.by_name.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    /// Run every reloader concurrently. Returns when all have stopped, or
    /// as soon as one fails, in which case the others are abandoned and
    /// end up [`Stopped`](crate::LifecycleState::Stopped).
    pub async fn run(&self) -> Result<(), ReloaderError> {
        futures::future::try_join_all(self.reloaders.iter().map(|r| r.run()))
            .await
            .map(|_| ())
    }

    /// Signal every reloader to stop. Reloaders which were already told to
    /// stop are skipped. The first other error is returned once all have
    /// been signalled.
    pub fn stop(&self) -> Result<(), ReloaderError> {
        let mut first_error = None;
        for reloader in &self.reloaders {
            match reloader.stop() {
                Ok(()) | Err(ReloaderError::DoubleStop(_)) => (),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl ResolvesServerCert for ReloaderRegistry {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let sni = client_hello.server_name()?;
        match ReloaderRegistry::resolve(self, sni) {
            Ok(reloader) => Some(reloader.get_certificate(Some(sni))),
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }
}
