//! End-to-end verification against a captured Nitro Enclave attestation.

use nitro_attestation::{verify_attestation, Digest, ErrorKind, TrustAnchor, Verifier};

const ATTESTATION_HEX: &str = include_str!("data/attestation.hex");

/// Reference time inside every chain certificate's validity window.
const VALID_TIMESTAMP_MS: u64 = 1_731_627_987_382;
/// The leaf certificate bounds the chain's validity window on both ends.
const LEAF_NOT_BEFORE_MS: u64 = 1_731_619_466_000;
const LEAF_NOT_AFTER_MS: u64 = 1_731_630_269_000;

const MODULE_ID: &str = "i-0f73a4b4cb74cc9f2-enc0192e4188fef781d";
const DOCUMENT_TIMESTAMP_MS: u64 = 1_731_627_989_450;
const PCR3_HEX: &str = "639a8b65f68b0223cbb14a0032487e5656d260434e3d1a10e7ec1407fb86143860717fc8afee90df7a1604111709af46";
const PCR4_HEX: &str = "9ab5a1aba055ee41ee254b9b251a58259b29fa1096859762744e9ac73b5869b25e51223854d9f86adbb37fe69f3e5d1c";
const USER_DATA_HEX: &str = "5a264748a62368075d34b9494634a3e096e0e48f6647f965b81d2a653de684f2";

fn attestation_bytes() -> Vec<u8> {
    hex::decode(ATTESTATION_HEX.trim()).unwrap()
}

#[test]
fn verifies_and_extracts_known_fields() {
    let doc = verify_attestation(&attestation_bytes(), VALID_TIMESTAMP_MS).unwrap();

    assert_eq!(doc.module_id(), MODULE_ID);
    assert_eq!(doc.timestamp_ms(), DOCUMENT_TIMESTAMP_MS);
    assert_eq!(doc.digest(), Digest::Sha384);

    // The NSM reports sixteen registers; only 3 and 4 are measured here.
    assert_eq!(doc.pcrs().len(), 16);
    for entry in doc.pcrs() {
        assert_eq!(entry.value().len(), doc.digest().pcr_len());
    }
    assert_eq!(doc.pcr(0), Some(&[0u8; 48][..]));
    assert_eq!(doc.pcr(3), Some(hex::decode(PCR3_HEX).unwrap().as_slice()));
    assert_eq!(doc.pcr(4), Some(hex::decode(PCR4_HEX).unwrap().as_slice()));
    assert_eq!(doc.pcr(16), None);

    // public_key and nonce are CBOR null in this document.
    assert_eq!(doc.public_key(), None);
    assert_eq!(doc.nonce(), None);
    assert_eq!(
        doc.user_data(),
        Some(hex::decode(USER_DATA_HEX).unwrap().as_slice())
    );
}

#[test]
fn verification_is_deterministic() {
    let bytes = attestation_bytes();
    let first = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap();
    let second = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap();
    assert_eq!(first, second);

    let early = verify_attestation(&bytes, LEAF_NOT_BEFORE_MS - 1).unwrap_err();
    let again = verify_attestation(&bytes, LEAF_NOT_BEFORE_MS - 1).unwrap_err();
    assert_eq!(early, again);
}

#[test]
fn validity_window_is_inclusive_at_millisecond_precision() {
    let bytes = attestation_bytes();

    assert!(verify_attestation(&bytes, LEAF_NOT_BEFORE_MS).is_ok());
    assert!(verify_attestation(&bytes, LEAF_NOT_AFTER_MS).is_ok());

    let err = verify_attestation(&bytes, LEAF_NOT_BEFORE_MS - 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
    let err = verify_attestation(&bytes, LEAF_NOT_AFTER_MS + 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
}

#[test]
fn tampered_signature_fails_verification() {
    let mut bytes = attestation_bytes();
    // The 96-byte signature is the envelope's final element.
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    let err = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
}

#[test]
fn tampered_payload_fails_verification() {
    let mut bytes = attestation_bytes();
    // Flip one bit inside a zero-valued PCR: the CBOR stays well-formed but
    // the signed bytes change.
    let offset = find_zero_pcr_offset(&bytes);
    bytes[offset] ^= 0x01;
    let err = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
}

#[test]
fn tampered_protected_header_fails_verification() {
    let mut bytes = attestation_bytes();
    // Protected header is {1: -35}; rewrite the algorithm to -7 (ES256).
    assert_eq!(&bytes[..6], &[0x84, 0x44, 0xA1, 0x01, 0x38, 0x22]);
    bytes[5] = 0x06;
    let err = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
}

#[test]
fn rewriting_algorithm_outside_supported_set_is_not_supported() {
    let mut bytes = attestation_bytes();
    // -35 -> -36 (ES512): registered, but not verifiable here.
    bytes[5] = 0x23;
    let err = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);
}

#[test]
fn every_strict_prefix_is_a_parse_error() {
    let bytes = attestation_bytes();
    for len in 0..bytes.len() {
        let err = verify_attestation(&bytes[..len], VALID_TIMESTAMP_MS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse, "prefix of {len} bytes");
    }
}

#[test]
fn trailing_garbage_is_a_parse_error() {
    let mut bytes = attestation_bytes();
    bytes.push(0x00);
    let err = verify_attestation(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn foreign_trust_anchor_fails_verification() {
    let bytes = attestation_bytes();
    // Pin the document's own leaf certificate as the root.
    let leaf = extract_leaf_der(&bytes);
    let verifier = Verifier::with_anchor(TrustAnchor::from_der(leaf).unwrap());
    let err = verifier.verify(&bytes, VALID_TIMESTAMP_MS).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Verify);
}

/// Offset of a byte in the middle of an all-zero 48-byte PCR value.
fn find_zero_pcr_offset(bytes: &[u8]) -> usize {
    let needle = {
        let mut n = vec![0x58, 0x30]; // bstr(48)
        n.extend_from_slice(&[0u8; 48]);
        n
    };
    let start = bytes
        .windows(needle.len())
        .position(|window| window == needle)
        .expect("fixture contains a zero PCR");
    start + 2 + 24
}

/// Pulls the leaf DER out of the payload ("certificate" key, 638 bytes).
fn extract_leaf_der(bytes: &[u8]) -> Vec<u8> {
    let mut marker = Vec::new();
    marker.push(0x6b); // text(11)
    marker.extend_from_slice(b"certificate");
    marker.extend_from_slice(&[0x59, 0x02, 0x7e]); // bstr(638)
    let start = bytes
        .windows(marker.len())
        .position(|window| window == marker)
        .expect("fixture embeds the leaf certificate");
    let der_start = start + marker.len();
    bytes[der_start..der_start + 0x27e].to_vec()
}
