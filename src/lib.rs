//! Verifier for AWS Nitro Enclave attestation documents.
//!
//! An attestation document is a COSE_Sign1 envelope over a CBOR payload,
//! signed by a certificate chain rooted in the AWS Nitro Enclaves root.
//! [`Verifier::verify`] decodes the envelope, validates the chain against a
//! pinned trust anchor at an explicit reference time, checks the COSE
//! signature, and returns the typed [`NitroAttestationDocument`].
//!
//! ```no_run
//! use nitro_attestation::{verify_attestation, ErrorKind};
//!
//! # fn example(attestation: &[u8], now_ms: u64) {
//! match verify_attestation(attestation, now_ms) {
//!     Ok(doc) => println!("attested module {}", doc.module_id()),
//!     Err(err) if err.kind() == ErrorKind::Verify => eprintln!("untrusted: {err}"),
//!     Err(err) => eprintln!("rejected: {err}"),
//! }
//! # }
//! ```

pub mod attestation;

pub use attestation::{
    verify_attestation, AttestationError, Digest, ErrorKind, NitroAttestationDocument, PcrEntry,
    TrustAnchor, Verifier,
};
