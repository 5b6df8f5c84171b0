//! Host name matching and extraction of names from leaf certificates.
//!
//! Wildcards cover exactly one label: `*.example.com` matches
//! `foo.example.com` but neither `foo.bar.example.com` nor `example.com`.

use rustls::sign::CertifiedKey;
use thiserror::Error;
use time::OffsetDateTime;
use x509_parser::extensions::GeneralName;

type X509ParserError = x509_parser::nom::Err<x509_parser::error::X509Error>;

/// Lower-case `name` and strip any trailing dots.
pub fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// The wildcard pattern one level above `domain`, i.e. `domain` with its
/// first label replaced by `*`. `None` if `domain` has a single label.
///
/// ```
/// use reloadable_tls::names::wildcard_for_domain;
///
/// assert_eq!(wildcard_for_domain("foo.example.com").as_deref(), Some("*.example.com"));
/// assert_eq!(wildcard_for_domain("localhost"), None);
/// ```
pub fn wildcard_for_domain(domain: &str) -> Option<String> {
    match domain.split_once('.') {
        Some((first, rest)) if !first.is_empty() && !rest.is_empty() => {
            Some(format!("*.{}", rest))
        }
        _ => None,
    }
}

/// Whether the wildcard `pattern` (of the form `*.<suffix>`) covers `name`.
/// Comparison is case-insensitive and ignores trailing dots.
///
/// ```
/// use reloadable_tls::names::matches_wildcard;
///
/// assert!(matches_wildcard("*.example.com", "foo.example.com"));
/// assert!(!matches_wildcard("*.example.com", "foo.bar.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.com"));
/// ```
pub fn matches_wildcard(pattern: &str, name: &str) -> bool {
    let pattern = normalize(pattern);
    if !pattern.starts_with("*.") {
        return false;
    }
    wildcard_for_domain(&normalize(name)).is_some_and(|w| w == pattern)
}

/// Error returned when names cannot be read from a leaf certificate.
#[derive(Debug, Error)]
pub enum LeafError {
    /// The pair has an empty certificate chain.
    #[error("certificate chain is empty")]
    NoLeaf,
    /// The leaf is not valid DER X.509.
    #[error("{0}")]
    X509Error(#[from] X509ParserError),
    /// An extension of the leaf could not be decoded.
    #[error("{0}")]
    ExtensionError(#[from] x509_parser::error::X509Error),
}

/// Identity and validity of a leaf certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CertificateMetadata {
    /// First subject common name, if any.
    pub common_name: Option<String>,
    /// DNS subject alternative names in certificate order.
    pub dns_names: Vec<String>,
    /// End of the validity period.
    pub not_after: OffsetDateTime,
}

impl CertificateMetadata {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, LeafError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)?;
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(ToOwned::to_owned);
        let dns_names = match cert.subject_alternative_name()? {
            None => Vec::new(),
            Some(ext) => ext
                .value
                .general_names
                .iter()
                .filter_map(|gn| match gn {
                    GeneralName::DNSName(n) => Some((*n).to_owned()),
                    _ => None,
                })
                .collect(),
        };
        Ok(Self {
            common_name,
            dns_names,
            not_after: cert.validity().not_after.to_datetime(),
        })
    }

    /// Parse the leaf of a loaded pair.
    pub fn from_certified_key(certified_key: &CertifiedKey) -> Result<Self, LeafError> {
        let leaf = certified_key.cert.first().ok_or(LeafError::NoLeaf)?;
        Self::from_der(leaf.as_ref())
    }

    /// Common name followed by every DNS name, as written in the certificate.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.common_name
            .iter()
            .chain(self.dns_names.iter())
            .map(String::as_str)
    }
}
