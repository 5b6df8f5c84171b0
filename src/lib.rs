//! Hot-reloading TLS certificate and key pairs.
//!
//! Servers whose certificates are renewed from under them (by
//! [cert-manager](https://cert-manager.io/), an ACME client, a volume
//! mount being updated...) need to start presenting the new certificate
//! without restarting and without disturbing connections in flight.
//!
//! A [`CertificateReloader`] owns one certificate and key file pair. It
//! loads the pair when constructed, then while [running](CertificateReloader::run)
//! it watches the certificate file and reloads the pair a short, fixed
//! interval after the last change it noticed, so that a multi-step file
//! replacement produces a single reload. A reload that fails leaves the
//! previous pair in service. Handshakes read the active pair through an
//! atomic pointer and never wait for a reload.
//!
//! A [`ReloaderRegistry`] holds several reloaders and picks one for a
//! handshake by SNI, matching the names in each leaf certificate exactly
//! or through a single-label wildcard.
//!
//! Both implement [`rustls::server::ResolvesServerCert`] and can be
//! installed directly into a [`rustls::ServerConfig`].
//!
//! # Feature Flags
//!
//! - `notify` (default): file change notifications through the
//!   [notify](https://crates.io/crates/notify) crate.
//! - `metrics` (default): export reload counters and certificate expiry
//!   to the default [prometheus](https://crates.io/crates/prometheus)
//!   registry.

#![warn(missing_docs)]

pub mod api;
pub mod config;
pub mod crypto_provider;
pub mod files;
#[cfg(feature = "metrics")]
mod metrics;
pub mod names;
pub mod registry;
pub mod reloader;
#[cfg(test)]
mod testdata;
#[cfg(test)]
mod testutil;
pub mod watch;

pub use api::{CertificateLoader, LifecycleState, WatchSource};
pub use config::{Args, CertKeyPair, ReloaderOptions};
pub use files::{LoadError, PemFileLoader};
pub use registry::{RegistryError, ReloaderRegistry, ResolveError};
pub use reloader::{CertificateReloader, ReloaderError};
#[cfg(feature = "notify")]
pub use watch::NotifyWatchSource;
pub use watch::WatchError;
