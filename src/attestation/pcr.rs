use crate::attestation::errors::AttestationError;
use serde::Serialize;
use serde_cbor::Value as CborValue;
use std::fmt;

/// Highest PCR index the NSM exposes; entries beyond it are malformed.
const MAX_PCR_INDEX: u8 = 31;
/// Upper bound on the number of PCR map entries.
const MAX_PCR_COUNT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Hash algorithm the platform used for PCR measurements.
pub enum Digest {
    #[serde(rename = "SHA256")]
    Sha256,
    #[serde(rename = "SHA384")]
    Sha384,
    #[serde(rename = "SHA512")]
    Sha512,
}

impl Digest {
    /// Maps the payload's digest name to the enumerated algorithm.
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "SHA256" => Some(Digest::Sha256),
            "SHA384" => Some(Digest::Sha384),
            "SHA512" => Some(Digest::Sha512),
            _ => None,
        }
    }

    /// Output size in bytes; every PCR value must have exactly this length.
    pub fn pcr_len(self) -> usize {
        match self {
            Digest::Sha256 => 32,
            Digest::Sha384 => 48,
            Digest::Sha512 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Digest::Sha256 => "SHA256",
            Digest::Sha384 => "SHA384",
            Digest::Sha512 => "SHA512",
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One Platform Configuration Register measurement.
pub struct PcrEntry {
    index: u8,
    #[serde(serialize_with = "crate::attestation::types::ser_hex")]
    value: Vec<u8>,
}

impl PcrEntry {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Decodes and validates the payload's PCR map: integer keys 0..=31 with
/// values sized to the digest output. Returns entries sorted by index.
pub(crate) fn pcrs_from_cbor(
    value: &CborValue,
    digest: Digest,
) -> Result<Vec<PcrEntry>, AttestationError> {
    let entries = match value {
        CborValue::Map(m) => m,
        other => {
            return Err(AttestationError::Parse(format!(
                "pcrs expected map, got {:?}",
                other
            )))
        }
    };
    if entries.is_empty() {
        return Err(AttestationError::Parse("pcrs map is empty".into()));
    }
    if entries.len() > MAX_PCR_COUNT {
        return Err(AttestationError::Parse("too many PCR entries".into()));
    }

    let mut out = Vec::with_capacity(entries.len());
    for (key, pcr_value) in entries {
        let index = match key {
            CborValue::Integer(i) if (0..=MAX_PCR_INDEX as i128).contains(i) => *i as u8,
            other => {
                return Err(AttestationError::Parse(format!(
                    "invalid PCR index {:?}",
                    other
                )))
            }
        };
        let bytes = match pcr_value {
            CborValue::Bytes(b) => b,
            other => {
                return Err(AttestationError::Parse(format!(
                    "PCR{index} expected bytes, got {:?}",
                    other
                )))
            }
        };
        if bytes.len() != digest.pcr_len() {
            return Err(AttestationError::Parse(format!(
                "PCR{index} has {} bytes, {} requires {}",
                bytes.len(),
                digest,
                digest.pcr_len()
            )));
        }
        out.push(PcrEntry {
            index,
            value: bytes.clone(),
        });
    }
    out.sort_by_key(|entry| entry.index);
    Ok(out)
}
