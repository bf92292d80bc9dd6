use crate::attestation::certs::{leaf_public_key, verify_cert_chain};
use crate::attestation::config::TrustAnchor;
use crate::attestation::cose::CoseEnvelope;
use crate::attestation::errors::AttestationError;
use crate::attestation::types::{AttestationPayload, NitroAttestationDocument};
use crate::attestation::util::constant_time_eq;

/// Attestation verifier bound to a pinned trust anchor.
///
/// Verification is a pure function of the attestation bytes and the
/// reference timestamp: no clock reads, no I/O, no state between calls.
/// The verifier is freely shareable across threads.
#[derive(Debug, Clone)]
pub struct Verifier {
    anchor: TrustAnchor,
}

impl Verifier {
    /// Verifier pinned to the embedded AWS Nitro root.
    pub fn new() -> Self {
        Self {
            anchor: TrustAnchor::aws_nitro().clone(),
        }
    }

    /// Verifier pinned to a caller-supplied anchor.
    pub fn with_anchor(anchor: TrustAnchor) -> Self {
        Self { anchor }
    }

    pub fn trust_anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    /// Verifies an attestation document against the reference timestamp
    /// (milliseconds since epoch, from a trusted clock).
    ///
    /// Either returns the fully authenticated document or a single
    /// classified error; no partial result is ever exposed.
    pub fn verify(
        &self,
        attestation: &[u8],
        timestamp_ms: u64,
    ) -> Result<NitroAttestationDocument, AttestationError> {
        verify_with_anchor(attestation, timestamp_ms, &self.anchor)
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verifies an attestation document against the embedded AWS Nitro root.
pub fn verify_attestation(
    attestation: &[u8],
    timestamp_ms: u64,
) -> Result<NitroAttestationDocument, AttestationError> {
    verify_with_anchor(attestation, timestamp_ms, TrustAnchor::aws_nitro())
}

fn verify_with_anchor(
    attestation: &[u8],
    timestamp_ms: u64,
    anchor: &TrustAnchor,
) -> Result<NitroAttestationDocument, AttestationError> {
    let envelope = CoseEnvelope::parse(attestation)?;
    let payload = AttestationPayload::parse(envelope.payload())?;

    // When the unprotected header duplicates the chain, its leaf must match
    // the one the payload binds.
    if let Some(header_leaf) = envelope.x5chain_leaf()? {
        if !constant_time_eq(header_leaf, &payload.certificate) {
            return Err(AttestationError::Parse(
                "leaf certificate mismatch between COSE header and payload".into(),
            ));
        }
    }

    verify_cert_chain(
        &payload.certificate,
        &payload.cabundle,
        anchor,
        timestamp_ms,
    )?;

    let public_key = leaf_public_key(&payload.certificate)?;
    envelope.verify_signature(&public_key)?;

    Ok(payload.document)
}
