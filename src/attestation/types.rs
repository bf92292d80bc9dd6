use crate::attestation::errors::AttestationError;
use crate::attestation::pcr::{self, Digest, PcrEntry};
use serde::{Serialize, Serializer};
use serde_cbor::Value as CborValue;

/// Max user data length from the AWS Nitro NSM spec.
const MAX_USER_DATA_LENGTH: usize = 512;
/// Max nonce length from the AWS Nitro NSM spec.
const MAX_NONCE_LENGTH: usize = 512;
/// Max public key length from the AWS Nitro NSM spec.
const MAX_PUBLIC_KEY_LENGTH: usize = 1024;
/// Max DER length for the leaf and each cabundle certificate.
const MAX_CERT_LENGTH: usize = 1024;
/// Upper bound on the number of cabundle certificates.
const MAX_CABUNDLE_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Authenticated attestation document returned on successful verification.
///
/// Immutable value type: fields are produced whole by the verification call
/// and exposed through read-only accessors.
pub struct NitroAttestationDocument {
    module_id: String,
    timestamp_ms: u64,
    digest: Digest,
    pcrs: Vec<PcrEntry>,
    #[serde(serialize_with = "ser_opt_hex")]
    public_key: Option<Vec<u8>>,
    #[serde(serialize_with = "ser_opt_hex")]
    user_data: Option<Vec<u8>>,
    #[serde(serialize_with = "ser_opt_hex")]
    nonce: Option<Vec<u8>>,
}

impl NitroAttestationDocument {
    /// Identifier of the issuing hypervisor module.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Document creation time in milliseconds since epoch, as asserted by
    /// the enclave platform.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Hash algorithm used for the PCR measurements.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// PCR measurements, sorted by register index.
    pub fn pcrs(&self) -> &[PcrEntry] {
        &self.pcrs
    }

    /// Value of a single PCR, if the document includes that index.
    pub fn pcr(&self, index: u8) -> Option<&[u8]> {
        self.pcrs
            .iter()
            .find(|entry| entry.index() == index)
            .map(PcrEntry::value)
    }

    /// DER-encoded key the enclave offered for encrypted responses.
    pub fn public_key(&self) -> Option<&[u8]> {
        self.public_key.as_deref()
    }

    /// Free-form data the enclave bound into the document.
    pub fn user_data(&self) -> Option<&[u8]> {
        self.user_data.as_deref()
    }

    /// Caller-supplied freshness value reflected back by the enclave.
    pub fn nonce(&self) -> Option<&[u8]> {
        self.nonce.as_deref()
    }
}

/// Decoded attestation payload. The certificate material is consumed by
/// chain and signature verification and never exposed to callers.
#[derive(Debug)]
pub(crate) struct AttestationPayload {
    pub(crate) document: NitroAttestationDocument,
    pub(crate) certificate: Vec<u8>,
    pub(crate) cabundle: Vec<Vec<u8>>,
}

impl AttestationPayload {
    /// Decodes the COSE payload as the attestation document map and applies
    /// the field presence, type, and size rules.
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, AttestationError> {
        let payload: CborValue = serde_cbor::from_slice(bytes)
            .map_err(|e| AttestationError::Parse(format!("decode payload CBOR: {e}")))?;
        let entries = match payload {
            CborValue::Map(m) => m,
            other => {
                return Err(AttestationError::Parse(format!(
                    "payload expected map, got {:?}",
                    other
                )))
            }
        };

        let mut module_id = None;
        let mut digest_name = None;
        let mut timestamp = None;
        let mut pcrs_value = None;
        let mut certificate = None;
        let mut cabundle_value = None;
        let mut public_key = None;
        let mut user_data = None;
        let mut nonce = None;

        for (key, value) in &entries {
            let name = match key {
                CborValue::Text(s) => s.as_str(),
                other => {
                    return Err(AttestationError::Parse(format!(
                        "payload key expected text, got {:?}",
                        other
                    )))
                }
            };
            match name {
                "module_id" => module_id = Some(string_from_value(value, "module_id")?),
                "digest" => digest_name = Some(string_from_value(value, "digest")?),
                "timestamp" => timestamp = Some(int_from_value(value, "timestamp")?),
                "pcrs" => pcrs_value = Some(value),
                "certificate" => certificate = Some(bytes_from_value(value, "certificate")?),
                "cabundle" => cabundle_value = Some(value),
                "public_key" => public_key = optional_bytes_from_value(value, "public_key")?,
                "user_data" => user_data = optional_bytes_from_value(value, "user_data")?,
                "nonce" => nonce = optional_bytes_from_value(value, "nonce")?,
                // The NSM profile is fixed but tolerant readers ignore
                // additions, matching the signed-map semantics.
                _ => {}
            }
        }

        let module_id =
            module_id.ok_or_else(|| AttestationError::Parse("module_id missing".into()))?;
        if module_id.is_empty() {
            return Err(AttestationError::Parse("module_id is empty".into()));
        }

        let digest_name =
            digest_name.ok_or_else(|| AttestationError::Parse("digest missing".into()))?;
        let digest = Digest::from_name(&digest_name).ok_or_else(|| {
            AttestationError::Parse(format!("unrecognized digest '{digest_name}'"))
        })?;

        let timestamp_ms =
            timestamp.ok_or_else(|| AttestationError::Parse("timestamp missing".into()))?;

        let pcrs_value =
            pcrs_value.ok_or_else(|| AttestationError::Parse("pcrs missing".into()))?;
        let pcrs = pcr::pcrs_from_cbor(pcrs_value, digest)?;

        let certificate =
            certificate.ok_or_else(|| AttestationError::Parse("certificate missing".into()))?;
        if certificate.is_empty() || certificate.len() > MAX_CERT_LENGTH {
            return Err(AttestationError::Parse("invalid certificate length".into()));
        }

        let cabundle_value =
            cabundle_value.ok_or_else(|| AttestationError::Parse("cabundle missing".into()))?;
        let cabundle = cabundle_from_value(cabundle_value)?;

        if let Some(data) = &public_key {
            if data.is_empty() || data.len() > MAX_PUBLIC_KEY_LENGTH {
                return Err(AttestationError::Parse("invalid public_key length".into()));
            }
        }
        if let Some(data) = &user_data {
            if data.len() > MAX_USER_DATA_LENGTH {
                return Err(AttestationError::Parse("invalid user_data length".into()));
            }
        }
        if let Some(data) = &nonce {
            if data.len() > MAX_NONCE_LENGTH {
                return Err(AttestationError::Parse("invalid nonce length".into()));
            }
        }

        Ok(AttestationPayload {
            document: NitroAttestationDocument {
                module_id,
                timestamp_ms,
                digest,
                pcrs,
                public_key,
                user_data,
                nonce,
            },
            certificate,
            cabundle,
        })
    }
}

fn cabundle_from_value(value: &CborValue) -> Result<Vec<Vec<u8>>, AttestationError> {
    let entries = match value {
        CborValue::Array(a) => a,
        other => {
            return Err(AttestationError::Parse(format!(
                "cabundle expected array, got {:?}",
                other
            )))
        }
    };
    if entries.is_empty() || entries.len() > MAX_CABUNDLE_LENGTH {
        return Err(AttestationError::Parse("invalid cabundle length".into()));
    }
    let mut certs = Vec::with_capacity(entries.len());
    for entry in entries {
        let der = bytes_from_value(entry, "cabundle entry")?;
        if der.is_empty() || der.len() > MAX_CERT_LENGTH {
            return Err(AttestationError::Parse(
                "invalid cabundle certificate length".into(),
            ));
        }
        certs.push(der);
    }
    Ok(certs)
}

fn bytes_from_value(value: &CborValue, field: &str) -> Result<Vec<u8>, AttestationError> {
    match value {
        CborValue::Bytes(b) => Ok(b.clone()),
        other => Err(AttestationError::Parse(format!(
            "{field} expected bytes, got {:?}",
            other
        ))),
    }
}

/// Optional fields may be absent or explicitly null; both mean "not present".
fn optional_bytes_from_value(
    value: &CborValue,
    field: &str,
) -> Result<Option<Vec<u8>>, AttestationError> {
    match value {
        CborValue::Null => Ok(None),
        CborValue::Bytes(b) => Ok(Some(b.clone())),
        other => Err(AttestationError::Parse(format!(
            "{field} expected bytes or null, got {:?}",
            other
        ))),
    }
}

fn string_from_value(value: &CborValue, field: &str) -> Result<String, AttestationError> {
    match value {
        CborValue::Text(s) => Ok(s.clone()),
        other => Err(AttestationError::Parse(format!(
            "{field} expected text, got {:?}",
            other
        ))),
    }
}

fn int_from_value(value: &CborValue, field: &str) -> Result<u64, AttestationError> {
    match value {
        CborValue::Integer(i) if (0..=u64::MAX as i128).contains(i) => Ok(*i as u64),
        other => Err(AttestationError::Parse(format!(
            "{field} expected non-negative integer, got {:?}",
            other
        ))),
    }
}

pub(crate) fn ser_hex<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

fn ser_opt_hex<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match bytes {
        Some(b) => serializer.serialize_some(&hex::encode(b)),
        None => serializer.serialize_none(),
    }
}
