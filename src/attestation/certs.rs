use crate::attestation::config::TrustAnchor;
use crate::attestation::errors::AttestationError;
use ring::signature::{self, UnparsedPublicKey};
use x509_parser::prelude::*;

/// Validates the attestation certificate chain against the pinned anchor.
///
/// `cabundle` arrives in the payload's wire order, root-adjacent first; the
/// chain is walked leaf-first with each certificate checked for validity
/// window, role extensions, issuer linkage, and signature, terminating at
/// the anchor's public key. The anchor itself is never re-validated.
pub(crate) fn verify_cert_chain(
    leaf_der: &[u8],
    cabundle: &[Vec<u8>],
    anchor: &TrustAnchor,
    timestamp_ms: u64,
) -> Result<(), AttestationError> {
    let mut chain: Vec<&[u8]> = Vec::with_capacity(1 + cabundle.len());
    chain.push(leaf_der);
    chain.extend(cabundle.iter().rev().map(Vec::as_slice));

    for (idx, der) in chain.iter().enumerate() {
        let role = if idx == 0 { "leaf" } else { "intermediate" };
        let cert = parse_chain_certificate(der, role)?;

        ensure_key_usage(&cert, idx == 0, role)?;
        ensure_basic_constraints(&cert, idx, role)?;
        ensure_validity(&cert, timestamp_ms, role)?;

        // The next chain entry issues this one; the anchor issues the last.
        let issuer_der = chain.get(idx + 1).copied().unwrap_or_else(|| anchor.der());
        let issuer = parse_chain_certificate(issuer_der, "issuer")?;

        if cert.tbs_certificate.issuer.as_raw() != issuer.tbs_certificate.subject.as_raw() {
            return Err(AttestationError::Verify(format!(
                "issuer mismatch in certificate chain (role={role})"
            )));
        }

        let alg = map_signature_oid(&cert.signature_algorithm.algorithm)?;
        let verifier = UnparsedPublicKey::new(
            alg,
            issuer.tbs_certificate.subject_pki.subject_public_key.data.as_ref(),
        );
        verifier
            .verify(
                cert.tbs_certificate.as_ref(),
                cert.signature_value.data.as_ref(),
            )
            .map_err(|_| {
                AttestationError::Verify(format!(
                    "certificate signature verification failed ({role})"
                ))
            })?;
    }

    Ok(())
}

/// Extracts the leaf certificate's raw subject public key for COSE
/// signature verification.
pub(crate) fn leaf_public_key(leaf_der: &[u8]) -> Result<Vec<u8>, AttestationError> {
    let cert = parse_chain_certificate(leaf_der, "leaf")?;
    Ok(cert
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .to_vec())
}

fn parse_chain_certificate<'a>(
    der: &'a [u8],
    role: &str,
) -> Result<X509Certificate<'a>, AttestationError> {
    let (rem, cert) = parse_x509_certificate(der)
        .map_err(|e| AttestationError::Parse(format!("parse {role} certificate: {e}")))?;
    if !rem.is_empty() {
        return Err(AttestationError::Parse(format!(
            "trailing bytes after {role} certificate DER"
        )));
    }
    Ok(cert)
}

/// The reference timestamp must fall inside the certificate's validity
/// window, inclusive at both bounds, compared at millisecond precision.
fn ensure_validity(
    cert: &X509Certificate<'_>,
    timestamp_ms: u64,
    role: &str,
) -> Result<(), AttestationError> {
    let not_before_ms = cert.validity().not_before.timestamp() as i128 * 1000;
    let not_after_ms = cert.validity().not_after.timestamp() as i128 * 1000;
    let ts = timestamp_ms as i128;
    if ts < not_before_ms || ts > not_after_ms {
        return Err(AttestationError::Verify(format!(
            "{role} certificate not valid at reference time \
             (nb={not_before_ms} na={not_after_ms} t={ts})"
        )));
    }
    Ok(())
}

/// Key usage is mandatory on every chain certificate: the leaf signs the
/// attestation, CA certificates sign certificates.
fn ensure_key_usage(
    cert: &X509Certificate<'_>,
    is_leaf: bool,
    role: &str,
) -> Result<(), AttestationError> {
    let ku = cert
        .key_usage()
        .map_err(|e| AttestationError::Parse(format!("keyUsage parse error ({role}): {e}")))?
        .ok_or_else(|| {
            AttestationError::Verify(format!("missing keyUsage extension ({role})"))
        })?;
    if is_leaf {
        if !ku.value.digital_signature() {
            return Err(AttestationError::Verify(
                "leaf certificate missing digitalSignature usage".into(),
            ));
        }
    } else if !ku.value.key_cert_sign() {
        return Err(AttestationError::Verify(
            "CA certificate missing keyCertSign usage".into(),
        ));
    }
    Ok(())
}

fn ensure_basic_constraints(
    cert: &X509Certificate<'_>,
    idx: usize,
    role: &str,
) -> Result<(), AttestationError> {
    let bc = cert.basic_constraints().map_err(|e| {
        AttestationError::Parse(format!("basicConstraints parse error ({role}): {e}"))
    })?;
    if idx != 0 {
        // CA certificates: required, critical, CA=true; pathLenConstraint
        // bounds the number of CA certificates below this one.
        let bc = bc.ok_or_else(|| {
            AttestationError::Verify("CA certificate missing basicConstraints".into())
        })?;
        if !bc.critical || !bc.value.ca {
            return Err(AttestationError::Verify(
                "CA certificate basicConstraints invalid".into(),
            ));
        }
        if let Some(path_len) = bc.value.path_len_constraint {
            if idx - 1 > path_len as usize {
                return Err(AttestationError::Verify(
                    "certificate chain exceeds pathLenConstraint".into(),
                ));
            }
        }
    } else if let Some(bc) = bc {
        // A leaf may carry basicConstraints only as a non-CA without a
        // pathLenConstraint.
        if bc.value.ca || bc.value.path_len_constraint.is_some() {
            return Err(AttestationError::Verify(
                "leaf certificate unexpectedly marked as CA".into(),
            ));
        }
    }
    Ok(())
}

fn map_signature_oid(
    oid: &x509_parser::der_parser::oid::Oid<'_>,
) -> Result<&'static dyn signature::VerificationAlgorithm, AttestationError> {
    let alg: &'static dyn signature::VerificationAlgorithm = match oid.to_string().as_str() {
        "1.2.840.10045.4.3.2" => &signature::ECDSA_P256_SHA256_ASN1,
        "1.2.840.10045.4.3.3" => &signature::ECDSA_P384_SHA384_ASN1,
        "1.2.840.113549.1.1.11" => &signature::RSA_PKCS1_2048_8192_SHA256,
        "1.2.840.113549.1.1.12" => &signature::RSA_PKCS1_2048_8192_SHA384,
        "1.2.840.113549.1.1.13" => &signature::RSA_PKCS1_2048_8192_SHA512,
        other => {
            return Err(AttestationError::NotSupported(format!(
                "certificate signature algorithm OID {other}"
            )))
        }
    };
    Ok(alg)
}
