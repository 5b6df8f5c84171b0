use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::path::PathBuf;

pub(crate) struct GeneratedPair {
    pub(crate) cert_pem: String,
    pub(crate) key_pem: String,
    pub(crate) cert_der: Vec<u8>,
}

/// Self-signed pair whose CN is the first name and whose DNS SANs are
/// all of `names`.
pub(crate) fn generate(names: &[&str]) -> GeneratedPair {
    let mut params =
        CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
            .expect("certificate params");
    let mut dn = DistinguishedName::new();
    if let Some(cn) = names.first() {
        dn.push(DnType::CommonName, *cn);
    }
    params.distinguished_name = dn;
    let key_pair = KeyPair::generate().expect("generate key");
    let cert = params.self_signed(&key_pair).expect("self sign");
    GeneratedPair {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        cert_der: cert.der().to_vec(),
    }
}

pub(crate) struct CertAndKeyFiles {
    pub(crate) dir: tempfile::TempDir,
    pub(crate) pair: GeneratedPair,
}

impl CertAndKeyFiles {
    pub(crate) fn new(names: &[&str]) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let pair = generate(names);
        std::fs::write(dir.path().join("cert"), &pair.cert_pem)?;
        std::fs::write(dir.path().join("key"), &pair.key_pem)?;
        Ok(Self { dir, pair })
    }

    pub(crate) fn cert_path(&self) -> PathBuf {
        self.dir.path().join("cert")
    }

    pub(crate) fn key_path(&self) -> PathBuf {
        self.dir.path().join("key")
    }

    /// Overwrite both files with `pair`.
    pub(crate) fn replace(&self, pair: &GeneratedPair) -> std::io::Result<()> {
        std::fs::write(self.key_path(), &pair.key_pem)?;
        std::fs::write(self.cert_path(), &pair.cert_pem)
    }
}
