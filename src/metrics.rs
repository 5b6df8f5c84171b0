use lazy_static::lazy_static;
use num::NumCast;
use prometheus::{register_gauge_vec, register_int_counter_vec};
use std::path::Path;

use crate::names::CertificateMetadata;

lazy_static! {
    static ref TLS_CERTIFICATE_RELOADS: prometheus::IntCounterVec = register_int_counter_vec!(
        "tls_certificate_reloads_total",
        "Attempts to reload a TLS certificate and key pair from disk",
        &["result"]
    )
    .unwrap();
    static ref TLS_CERTIFICATE_EXPIRATION: prometheus::GaugeVec = register_gauge_vec!(
        "tls_certificate_valid_until",
        "Expiration time of the active TLS certificate loaded from a path",
        &["path"]
    )
    .unwrap();
}

pub(crate) fn reload_attempted(success: bool) {
    TLS_CERTIFICATE_RELOADS
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

pub(crate) fn certificate_loaded(cert_path: &Path, metadata: &CertificateMetadata) {
    let path = cert_path.display().to_string();
    TLS_CERTIFICATE_EXPIRATION
        .with_label_values(&[path.as_str()])
        .set(<f64 as NumCast>::from(metadata.not_after.unix_timestamp()).unwrap_or_default());
}
