use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Classified verification failure. The diagnostic string is for operators;
/// callers should branch on [`AttestationError::kind`].
pub enum AttestationError {
    /// The envelope declares an algorithm or feature this build cannot verify.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// The input bytes do not conform to the CBOR/COSE/X.509 encoding, or a
    /// structural invariant of the attestation document is violated.
    #[error("parse error: {0}")]
    Parse(String),
    /// Decoding succeeded but cryptographic or trust-chain validation failed.
    #[error("verify error: {0}")]
    Verify(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Payload-free projection of [`AttestationError`] for classification matching.
pub enum ErrorKind {
    NotSupported,
    Parse,
    Verify,
}

impl AttestationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestationError::NotSupported(_) => ErrorKind::NotSupported,
            AttestationError::Parse(_) => ErrorKind::Parse,
            AttestationError::Verify(_) => ErrorKind::Verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_across_messages() {
        assert_eq!(
            AttestationError::Parse("a".into()).kind(),
            AttestationError::Parse("b".into()).kind()
        );
        assert_ne!(
            AttestationError::Parse("x".into()).kind(),
            AttestationError::Verify("x".into()).kind()
        );
        assert_eq!(
            AttestationError::NotSupported("alg".into()).to_string(),
            "not supported: alg"
        );
    }
}
