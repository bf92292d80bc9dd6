use crate::attestation::util::sha256_fingerprint;
use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use x509_parser::prelude::*;

/// AWS Nitro Enclaves root certificate (G1), the default trust anchor.
/// Downloadable from
/// <https://aws-nitro-enclaves.amazonaws.com/AWS_NitroEnclaves_Root-G1.zip>.
static AWS_NITRO_ROOT: Lazy<TrustAnchor> = Lazy::new(|| {
    TrustAnchor::from_pem_bytes(include_bytes!("aws_nitro_root.pem"))
        .expect("embedded AWS Nitro root certificate is valid")
});

#[derive(Clone)]
/// Pinned root of trust terminating certificate-chain validation.
///
/// Loaded once at process start and treated as immutable; the anchor itself
/// is never re-validated during verification.
pub struct TrustAnchor {
    der: Vec<u8>,
    fingerprint: String,
    subject: String,
}

impl TrustAnchor {
    /// The embedded AWS Nitro Enclaves root (G1).
    pub fn aws_nitro() -> &'static TrustAnchor {
        &AWS_NITRO_ROOT
    }

    /// Loads the first certificate from a PEM file.
    pub fn from_pem_file(path: &Path) -> anyhow::Result<Self> {
        let pem = std::fs::read(path).with_context(|| format!("read {:?}", path))?;
        Self::from_pem_bytes(&pem).with_context(|| format!("load trust anchor from {:?}", path))
    }

    /// Loads the first certificate from PEM bytes.
    pub fn from_pem_bytes(pem: &[u8]) -> anyhow::Result<Self> {
        let mut cursor = Cursor::new(pem);
        let der = rustls_pemfile::certs(&mut cursor)
            .next()
            .ok_or_else(|| anyhow!("no certificate found in PEM input"))?
            .map_err(|e| anyhow!("parse PEM: {e}"))?;
        Self::from_der(der.as_ref().to_vec())
    }

    /// Uses a DER-encoded certificate as the anchor, validating that it
    /// parses as X.509.
    pub fn from_der(der: Vec<u8>) -> anyhow::Result<Self> {
        let (rem, cert) = parse_x509_certificate(&der)
            .map_err(|e| anyhow!("parse trust anchor certificate: {e}"))?;
        anyhow::ensure!(rem.is_empty(), "trailing bytes after trust anchor DER");
        let fingerprint = sha256_fingerprint(&der);
        let subject = format!("{}", cert.subject());
        Ok(TrustAnchor {
            der,
            fingerprint,
            subject,
        })
    }

    /// SHA-256 fingerprint of the anchor DER, uppercase colon-separated.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Display form of the anchor's subject name.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn der(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchor")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Published fingerprint of the AWS commercial Nitro root.
    const AWS_ROOT_FP: &str = "64:1A:03:21:A3:E2:44:EF:E4:56:46:31:95:D6:06:31:7E:D7:CD:CC:3C:17:56:E0:98:93:F3:C6:8F:79:BB:5B";

    #[test]
    fn embedded_root_loads_with_known_fingerprint() {
        let anchor = TrustAnchor::aws_nitro();
        assert_eq!(anchor.fingerprint(), AWS_ROOT_FP);
        assert!(anchor.subject().contains("aws.nitro-enclaves"));
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(TrustAnchor::from_pem_bytes(b"not a certificate").is_err());
        assert!(TrustAnchor::from_der(vec![0x30, 0x03, 0x01, 0x01, 0x00]).is_err());
    }

    #[test]
    fn debug_omits_der() {
        let rendered = format!("{:?}", TrustAnchor::aws_nitro());
        assert!(rendered.contains("fingerprint"));
        assert!(!rendered.contains("der"));
    }
}
