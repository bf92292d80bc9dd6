use crate::attestation::errors::AttestationError;
use coset::{CborSerializable, CoseSign1, Label, TaggedCborSerializable};
use ring::signature::{self, UnparsedPublicKey};

/// COSE payload size bounds from the NSM attestation profile.
const MIN_PAYLOAD_LENGTH: usize = 1;
const MAX_PAYLOAD_LENGTH: usize = 16384;

/// Unprotected-header label carrying an ordered certificate chain (x5chain).
const X5CHAIN_HEADER_LABEL: i64 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Signature algorithms this verifier accepts in the protected header.
pub(crate) enum SignatureAlgorithm {
    Es256,
    Es384,
}

impl SignatureAlgorithm {
    fn ring_verifier(self) -> &'static signature::EcdsaVerificationAlgorithm {
        match self {
            SignatureAlgorithm::Es256 => &signature::ECDSA_P256_SHA256_FIXED,
            SignatureAlgorithm::Es384 => &signature::ECDSA_P384_SHA384_FIXED,
        }
    }

    /// Fixed-width r||s signature size for the curve.
    fn signature_len(self) -> usize {
        match self {
            SignatureAlgorithm::Es256 => 64,
            SignatureAlgorithm::Es384 => 96,
        }
    }
}

/// Parsed COSE_Sign1 attestation envelope.
#[derive(Debug)]
pub(crate) struct CoseEnvelope {
    sign1: CoseSign1,
    algorithm: SignatureAlgorithm,
}

impl CoseEnvelope {
    /// Decodes the tagged or untagged COSE_Sign1 array and classifies the
    /// declared algorithm. Structural defects are parse errors; an algorithm
    /// outside the supported set is a not-supported error.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        let sign1 = CoseSign1::from_tagged_slice(bytes)
            .or_else(|_| CoseSign1::from_slice(bytes))
            .map_err(|e| AttestationError::Parse(format!("decode COSE_Sign1: {e:?}")))?;

        let payload_len = sign1.payload.as_ref().map(Vec::len).unwrap_or(0);
        if !(MIN_PAYLOAD_LENGTH..=MAX_PAYLOAD_LENGTH).contains(&payload_len) {
            return Err(AttestationError::Parse(format!(
                "payload length {payload_len} outside accepted bounds"
            )));
        }
        if sign1.signature.is_empty() {
            return Err(AttestationError::Parse("signature missing".into()));
        }

        let algorithm = match &sign1.protected.header.alg {
            None => {
                return Err(AttestationError::Parse(
                    "protected header missing algorithm".into(),
                ))
            }
            Some(coset::Algorithm::Assigned(coset::iana::Algorithm::ES256)) => {
                SignatureAlgorithm::Es256
            }
            Some(coset::Algorithm::Assigned(coset::iana::Algorithm::ES384)) => {
                SignatureAlgorithm::Es384
            }
            Some(other) => {
                return Err(AttestationError::NotSupported(format!(
                    "COSE algorithm {:?}",
                    other
                )))
            }
        };

        Ok(CoseEnvelope { sign1, algorithm })
    }

    pub(crate) fn payload(&self) -> &[u8] {
        // Presence is enforced in `parse`.
        self.sign1.payload.as_deref().unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Leaf certificate from the unprotected x5chain header, when the
    /// encoding profile carries the chain redundantly next to the payload.
    pub(crate) fn x5chain_leaf(&self) -> Result<Option<&[u8]>, AttestationError> {
        use coset::cbor::value::Value as HeaderValue;

        let entry = self
            .sign1
            .unprotected
            .rest
            .iter()
            .find(|(label, _)| *label == Label::Int(X5CHAIN_HEADER_LABEL));
        match entry.map(|(_, value)| value) {
            None => Ok(None),
            Some(HeaderValue::Bytes(der)) => Ok(Some(der.as_slice())),
            Some(HeaderValue::Array(items)) => match items.first() {
                Some(HeaderValue::Bytes(der)) => Ok(Some(der.as_slice())),
                _ => Err(AttestationError::Parse(
                    "x5chain header entries must be byte strings".into(),
                )),
            },
            Some(_) => Err(AttestationError::Parse(
                "x5chain header must be bytes or an array of bytes".into(),
            )),
        }
    }

    /// Verifies the envelope signature over the canonical Sig_structure
    /// ("Signature1", protected bytes, empty external data, payload) with
    /// the leaf certificate's public key.
    pub(crate) fn verify_signature(&self, leaf_public_key: &[u8]) -> Result<(), AttestationError> {
        let expected_len = self.algorithm.signature_len();
        let key = UnparsedPublicKey::new(self.algorithm.ring_verifier(), leaf_public_key);
        self.sign1.verify_signature(&[], |sig, data| {
            let raw =
                normalize_ecdsa_signature(sig, expected_len).map_err(AttestationError::Verify)?;
            key.verify(data, &raw).map_err(|_| {
                AttestationError::Verify("COSE signature verification failed".into())
            })
        })
    }
}

/// Accepts either raw fixed-width signatures or DER-encoded ones and
/// normalises to raw.
fn normalize_ecdsa_signature(sig: &[u8], expected_len: usize) -> Result<Vec<u8>, String> {
    if sig.len() == expected_len {
        return Ok(sig.to_vec());
    }
    if sig.len() < 8 || sig.first() != Some(&0x30) {
        return Err(format!(
            "unexpected ECDSA signature format (len={})",
            sig.len()
        ));
    }
    let total_len = sig[1] as usize;
    if total_len + 2 != sig.len() {
        return Err(format!(
            "DER signature length mismatch (declared={}, actual={})",
            total_len,
            sig.len()
        ));
    }
    let mut idx = 2;
    let r = der_read_int(sig, &mut idx, expected_len / 2)?;
    let s = der_read_int(sig, &mut idx, expected_len / 2)?;
    if idx != sig.len() {
        return Err("unexpected trailing data in DER signature".into());
    }
    let mut out = Vec::with_capacity(expected_len);
    out.extend_from_slice(&r);
    out.extend_from_slice(&s);
    Ok(out)
}

fn der_read_int(sig: &[u8], idx: &mut usize, part_len: usize) -> Result<Vec<u8>, String> {
    if *idx >= sig.len() || sig[*idx] != 0x02 {
        return Err("expected INTEGER tag in DER signature".into());
    }
    *idx += 1;
    if *idx >= sig.len() {
        return Err("incomplete DER length".into());
    }
    let mut len = sig[*idx] as usize;
    *idx += 1;
    if len & 0x80 != 0 {
        let bytes = len & 0x7F;
        if bytes == 0 || bytes > 2 || *idx + bytes > sig.len() {
            return Err("unsupported DER length encoding".into());
        }
        len = 0;
        for _ in 0..bytes {
            len = (len << 8) | sig[*idx] as usize;
            *idx += 1;
        }
    }
    if *idx + len > sig.len() {
        return Err("DER INTEGER overruns signature buffer".into());
    }
    let mut value = &sig[*idx..*idx + len];
    *idx += len;
    while !value.is_empty() && value[0] == 0 {
        value = &value[1..];
    }
    if value.len() > part_len {
        return Err(format!(
            "DER INTEGER too large (len={}, expected <= {})",
            value.len(),
            part_len
        ));
    }
    let mut out = vec![0u8; part_len];
    let start = part_len - value.len();
    out[start..].copy_from_slice(value);
    Ok(out)
}
