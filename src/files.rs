//! A [`CertificateLoader`] that reads PEM files on disk.
//!
//! The certificate file may hold a chain; the first certificate is the
//! leaf. The key file must hold a private key in PKCS#1, PKCS#8 or SEC1
//! form. Extra PEM sections in the key file are ignored.

use rustls::crypto::CryptoProvider;
use rustls::sign::CertifiedKey;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::api::CertificateLoader;
use crate::crypto_provider::default_crypto_provider;

/// Error type returned when a certificate and key pair cannot be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A file could not be read or its PEM framing is broken.
    #[error("{}: {source}", .path.display())]
    IOError {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The key file contains no private key.
    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    /// The certificate file contains no certificates.
    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),
    /// The key is unsupported or does not match the certificate.
    #[error("{0}")]
    TLSError(#[from] rustls::Error),
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::IOError {
        path: path.to_owned(),
        source,
    })
}

/// Loads PEM-format certificate chains and private keys.
#[derive(Debug)]
pub struct PemFileLoader {
    provider: Arc<CryptoProvider>,
}

impl Default for PemFileLoader {
    fn default() -> Self {
        Self::new(default_crypto_provider())
    }
}

impl PemFileLoader {
    /// Load keys with the key provider of `provider`.
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl CertificateLoader for PemFileLoader {
    fn load(&self, cert_path: &Path, key_path: &Path) -> Result<Arc<CertifiedKey>, LoadError> {
        let key_pem = read_file(key_path)?;
        let key = rustls_pemfile::private_key(&mut Cursor::new(&key_pem))
            .map_err(|source| LoadError::IOError {
                path: key_path.to_owned(),
                source,
            })?
            .ok_or_else(|| LoadError::NoPrivateKey(key_path.to_owned()))?;

        let cert_pem = read_file(cert_path)?;
        let cert = rustls_pemfile::certs(&mut Cursor::new(&cert_pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| LoadError::IOError {
                path: cert_path.to_owned(),
                source,
            })?;
        if cert.is_empty() {
            return Err(LoadError::NoCertificates(cert_path.to_owned()));
        }

        let private_key = self.provider.key_provider.load_private_key(key)?;
        let certified_key = CertifiedKey::new(cert, private_key);
        certified_key.keys_match()?;
        Ok(Arc::new(certified_key))
    }
}
