//! Pick the [`CryptoProvider`] used to load private keys.

use rustls::crypto::CryptoProvider;
use std::sync::Arc;

/// The process-global default [`CryptoProvider`] if one has been installed,
/// otherwise the `aws-lc-rs` provider.
pub fn default_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}
