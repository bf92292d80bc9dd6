use anyhow::{anyhow, bail, Context};
use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine;
use env_logger::Env;
use log::info;
use nitro_attestation::{AttestationError, ErrorKind, NitroAttestationDocument, TrustAnchor, Verifier};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

type CliResult<T> = Result<T, anyhow::Error>;

/// CLI entrypoint: loads the trust anchor and attestation bytes, verifies
/// at the reference time, and prints a summary.
fn main() -> CliResult<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init()
        .ok();

    let (path, timestamp_ms, json) = parse_args()?;
    let verifier = resolve_verifier()?;
    info!(
        "trust anchor: {} ({})",
        verifier.trust_anchor().subject(),
        verifier.trust_anchor().fingerprint()
    );

    let attestation = load_attestation_bytes(&path)?;
    info!("verifying {} attestation bytes at t={timestamp_ms}", attestation.len());

    match verifier.verify(&attestation, timestamp_ms) {
        Ok(doc) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_summary(&doc);
            }
            Ok(())
        }
        Err(err) => Err(anyhow!(format_error(err))),
    }
}

/// Positional arguments: attestation file, optional reference timestamp in
/// milliseconds (defaults to the current time). `--json` switches output.
fn parse_args() -> CliResult<(PathBuf, u64, bool)> {
    let mut path = None;
    let mut timestamp_ms = None;
    let mut json = false;

    for arg in env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else if path.is_none() {
            path = Some(PathBuf::from(arg));
        } else if timestamp_ms.is_none() {
            let parsed = arg
                .parse::<u64>()
                .with_context(|| format!("invalid timestamp '{arg}'"))?;
            timestamp_ms = Some(parsed);
        } else {
            bail!("unexpected argument '{arg}'");
        }
    }

    let path = path.ok_or_else(|| {
        anyhow!("usage: attestation-verify <attestation-file> [timestamp-ms] [--json]")
    })?;
    Ok((path, timestamp_ms.unwrap_or_else(now_millis), json))
}

/// Decide which root certificate to trust: `NITRO_ROOT_PEM_PATH` overrides
/// the embedded AWS Nitro root.
fn resolve_verifier() -> CliResult<Verifier> {
    if let Ok(path) = env::var("NITRO_ROOT_PEM_PATH") {
        let anchor = TrustAnchor::from_pem_file(Path::new(&path))?;
        return Ok(Verifier::with_anchor(anchor));
    }
    Ok(Verifier::new())
}

/// Reads attestation bytes from disk, accepting raw CBOR, hex, or base64.
fn load_attestation_bytes(path: &Path) -> CliResult<Vec<u8>> {
    let raw = fs::read(path).with_context(|| format!("read {:?}", path))?;
    // Raw COSE_Sign1 starts with the array header or the tag-18 prefix.
    if matches!(raw.first(), Some(&0x84) | Some(&0xd2)) {
        return Ok(raw);
    }
    let text = std::str::from_utf8(&raw)
        .map_err(|_| anyhow!("{:?} is neither CBOR, hex, nor base64", path))?
        .trim();
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    if let Ok(bytes) = hex::decode(stripped) {
        return Ok(bytes);
    }
    b64.decode(text.as_bytes())
        .map_err(|_| anyhow!("{:?} is neither CBOR, hex, nor base64", path))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn print_summary(doc: &NitroAttestationDocument) {
    println!("✅ Attestation verified:");
    println!("  module_id    : {}", doc.module_id());
    println!("  timestamp_ms : {}", doc.timestamp_ms());
    println!("  digest       : {}", doc.digest());
    for entry in doc.pcrs() {
        println!("  PCR{:<2}        : {}", entry.index(), hex::encode(entry.value()));
    }
    println!("  public_key   : {}", render_optional(doc.public_key()));
    println!("  user_data    : {}", render_optional(doc.user_data()));
    println!("  nonce        : {}", render_optional(doc.nonce()));
}

fn render_optional(field: Option<&[u8]>) -> String {
    match field {
        Some(bytes) => hex::encode(bytes),
        None => "(absent)".into(),
    }
}

/// Human-friendly rendering of the classified error for CLI output.
fn format_error(err: AttestationError) -> String {
    match err.kind() {
        ErrorKind::NotSupported => format!("attestation uses an unsupported feature: {err}"),
        ErrorKind::Parse => format!("attestation is malformed: {err}"),
        ErrorKind::Verify => format!("attestation failed verification: {err}"),
    }
}
