//! A single hot-reloadable certificate and key pair.
//!
//! ```no_run
//! use reloadable_tls::{CertificateReloader, ReloaderOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let reloader = Arc::new(CertificateReloader::new(
//!     "/etc/tls/server.crt",
//!     "/etc/tls/server.key",
//!     &ReloaderOptions::default(),
//! )?);
//! let server_config = rustls::ServerConfig::builder()
//!     .with_no_client_auth()
//!     .with_cert_resolver(Arc::clone(&reloader) as _);
//! let task = tokio::spawn({
//!     let reloader = Arc::clone(&reloader);
//!     async move { reloader.run().await }
//! });
//! // ...serve with server_config...
//! # let _ = server_config;
//! reloader.stop()?;
//! task.await??;
//! # Ok(())
//! # }
//! ```

use arc_swap::ArcSwap;
use atomic_take::AtomicTake;
use futures::StreamExt;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::api::{CertificateLoader, LifecycleState, PathWatcher, WatchEvent, WatchSource};
use crate::config::ReloaderOptions;
use crate::files::LoadError;
use crate::names::{CertificateMetadata, LeafError};
use crate::watch::WatchError;

/// Error type returned by [`CertificateReloader`] lifecycle operations.
#[derive(Debug, Error)]
pub enum ReloaderError {
    /// The certificate file could not be watched when starting up.
    #[error("could not watch {}: {source}", .path.display())]
    WatchSetup {
        /// Certificate path.
        path: PathBuf,
        /// Underlying error.
        source: WatchError,
    },
    /// [`CertificateReloader::stop`] was called more than once.
    #[error("reloader for {} was already stopped", .0.display())]
    DoubleStop(PathBuf),
    /// [`CertificateReloader::run`] was called on a reloader that is not
    /// [`LifecycleState::Initialized`].
    #[error("cannot run a reloader which is {0}")]
    InvalidState(LifecycleState),
    /// The watch source stopped delivering events.
    #[error("watch on {} ended unexpectedly", .0.display())]
    WatchClosed(PathBuf),
}

/// Moves the state to [`LifecycleState::Stopped`] however `run` exits,
/// including when its future is dropped.
struct StopOnExit<'a>(&'a Mutex<LifecycleState>);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = LifecycleState::Stopped;
    }
}

/// Owns one certificate and key pair on disk and keeps the most recent
/// valid version of it available to TLS handshakes.
///
/// The pair is loaded once on construction. [`run`](Self::run) then
/// watches the certificate file and reloads the pair a short while after
/// it changes. A failed reload leaves the previous pair in place.
pub struct CertificateReloader {
    cert_path: PathBuf,
    key_path: PathBuf,
    active: ArcSwap<CertifiedKey>,
    debounce: Duration,
    loader: Arc<dyn CertificateLoader>,
    watch_source: Arc<dyn WatchSource>,
    state: Mutex<LifecycleState>,
    stop_sender: AtomicTake<oneshot::Sender<()>>,
    stop_receiver: Mutex<Option<oneshot::Receiver<()>>>,
}

impl std::fmt::Debug for CertificateReloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        f.debug_struct("CertificateReloader")
            .field("cert_path", &self.cert_path)
            .field("key_path", &self.key_path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CertificateReloader {
    /// Load the pair synchronously. Fails if it cannot be loaded, in which
    /// case there is no reloader.
    pub fn new(
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        options: &ReloaderOptions,
    ) -> Result<Self, LoadError> {
        let cert_path = cert_path.into();
        let key_path = key_path.into();
        let certified_key = options.loader.load(&cert_path, &key_path)?;
        observe_loaded(&cert_path, &certified_key);
        let (stop_sender, stop_receiver) = oneshot::channel();
        Ok(Self {
            cert_path,
            key_path,
            active: ArcSwap::new(certified_key),
            debounce: options.debounce,
            loader: Arc::clone(&options.loader),
            watch_source: Arc::clone(&options.watch_source),
            state: Mutex::new(LifecycleState::Initialized),
            stop_sender: AtomicTake::new(stop_sender),
            stop_receiver: Mutex::new(Some(stop_receiver)),
        })
    }

    /// Location of the certificate file.
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Location of the key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The currently active pair. The hint (normally the SNI) is not used
    /// for selection; see [`crate::ReloaderRegistry`] for that.
    pub fn get_certificate(&self, _server_name_hint: Option<&str>) -> Arc<CertifiedKey> {
        self.active.load_full()
    }

    /// Names and validity of the currently active leaf certificate.
    pub fn metadata(&self) -> Result<CertificateMetadata, LeafError> {
        CertificateMetadata::from_certified_key(&self.active.load())
    }

    /// Load the pair from disk now and make it active if successful.
    pub fn reload(&self) -> Result<(), LoadError> {
        let r = self.loader.load(&self.cert_path, &self.key_path);
        #[cfg(feature = "metrics")]
        crate::metrics::reload_attempted(r.is_ok());
        match r {
            Ok(certified_key) => {
                observe_loaded(&self.cert_path, &certified_key);
                self.active.store(certified_key);
                log::info!(
                    "Reloaded TLS key and cert from {} and {}",
                    self.key_path.display(),
                    self.cert_path.display()
                );
                Ok(())
            }
            Err(e) => {
                log::warn!(
                    "Could not reload TLS key and cert from {} and {}: {}",
                    self.key_path.display(),
                    self.cert_path.display(),
                    e
                );
                Err(e)
            }
        }
    }

    /// Watch the certificate file and reload on changes until
    /// [`stop`](Self::stop) is called.
    ///
    /// Fails immediately if the reloader is not
    /// [`LifecycleState::Initialized`] or if the watch cannot be set up.
    /// Either way the reloader ends up [`LifecycleState::Stopped`] and
    /// cannot be run again, except in the first case when it is already
    /// running.
    pub async fn run(&self) -> Result<(), ReloaderError> {
        let (mut stop, _exit) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != LifecycleState::Initialized {
                return Err(ReloaderError::InvalidState(*state));
            }
            let Some(stop) = self
                .stop_receiver
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            else {
                return Err(ReloaderError::InvalidState(*state));
            };
            *state = LifecycleState::Running;
            (stop, StopOnExit(&self.state))
        };
        let (mut watcher, events) =
            self.watch_source
                .open()
                .map_err(|source| ReloaderError::WatchSetup {
                    path: self.cert_path.clone(),
                    source,
                })?;
        watcher
            .watch(&self.cert_path)
            .map_err(|source| ReloaderError::WatchSetup {
                path: self.cert_path.clone(),
                source,
            })?;
        log::info!("Watching {} for changes", self.cert_path.display());
        let r = self.event_loop(&mut stop, &mut *watcher, events).await;
        if let Err(e) = watcher.unwatch(&self.cert_path) {
            log::debug!("Unwatching {}: {}", self.cert_path.display(), e);
        }
        r
    }

    async fn event_loop(
        &self,
        stop: &mut oneshot::Receiver<()>,
        watcher: &mut dyn PathWatcher,
        mut events: crate::api::WatchEvents,
    ) -> Result<(), ReloaderError> {
        let mut pending_reload = pin!(tokio::time::sleep(Duration::ZERO));
        let mut armed = false;
        loop {
            tokio::select! {
                biased;
                _ = &mut *stop => {
                    log::info!("Stopped watching {}", self.cert_path.display());
                    return Ok(());
                }
                () = &mut pending_reload, if armed => {
                    armed = false;
                    let _ = self.reload();
                    // The watch is lost if the file was replaced. Until it
                    // is back, no events arrive, so keep polling.
                    if let Err(e) = watcher.watch(&self.cert_path) {
                        log::warn!(
                            "Could not rewatch {}, retrying in {:?}: {}",
                            self.cert_path.display(),
                            self.debounce,
                            e
                        );
                        pending_reload.as_mut().reset(Instant::now() + self.debounce);
                        armed = true;
                    }
                }
                event = events.next() => match event {
                    Some(WatchEvent::Changed { path, kind }) => {
                        log::debug!(
                            "{} changed ({}); reloading in {:?}",
                            path.display(),
                            kind,
                            self.debounce
                        );
                        pending_reload.as_mut().reset(Instant::now() + self.debounce);
                        armed = true;
                    }
                    Some(WatchEvent::Error(e)) => {
                        log::warn!("Error watching {}: {}", self.cert_path.display(), e);
                    }
                    None => {
                        log::error!("Watch on {} ended", self.cert_path.display());
                        return Err(ReloaderError::WatchClosed(self.cert_path.clone()));
                    }
                },
            }
        }
    }

    /// Ask [`run`](Self::run) to return. May be called from any thread.
    /// A reloader that was never run goes straight to
    /// [`LifecycleState::Stopped`]. Calling this twice is an error.
    pub fn stop(&self) -> Result<(), ReloaderError> {
        let Some(sender) = self.stop_sender.take() else {
            return Err(ReloaderError::DoubleStop(self.cert_path.clone()));
        };
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == LifecycleState::Initialized {
                *state = LifecycleState::Stopped;
            }
        }
        // Nobody is listening if run already returned.
        let _ = sender.send(());
        Ok(())
    }
}

fn observe_loaded(cert_path: &Path, certified_key: &CertifiedKey) {
    match CertificateMetadata::from_certified_key(certified_key) {
        Ok(md) => {
            log::info!(
                "TLS certificate {} valid until {}",
                cert_path.display(),
                md.not_after
            );
            #[cfg(feature = "metrics")]
            crate::metrics::certificate_loaded(cert_path, &md);
        }
        Err(e) => {
            log::debug!("Cannot parse leaf of {}: {}", cert_path.display(), e);
        }
    }
}

impl ResolvesServerCert for CertificateReloader {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.get_certificate(client_hello.server_name()))
    }
}
