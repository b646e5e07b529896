//! validate-speaks-for CLI - verify a speaks-for credential
//!
//! Runs the staged verification pipeline against a trust anchor folder.
//! Exits 0 on success, 1 on any stage failure, 2 on usage errors.

use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use clap::{ArgAction, Parser, ValueEnum};

use speaks_for::config::Config;
use speaks_for::prelude::*;

#[derive(Parser)]
#[command(name = "validate-speaks-for")]
#[command(about = "Verify a speaks-for credential against a CA folder", long_about = None)]
#[command(version)]
struct Cli {
    /// Credential file
    #[arg(short = 's', long = "credential")]
    credential: PathBuf,

    /// Credential encoding
    #[arg(short = 'f', long = "format", value_enum, default_value_t = InputFormat::Base64)]
    format: InputFormat,

    /// Trust anchor folder (OpenSSL subject-hash layout)
    #[arg(long = "ca")]
    ca: Option<PathBuf>,

    /// Tool certificate whose keyid must match the rule tail
    #[arg(short = 't', long = "toolcert", conflicts_with = "keyid")]
    toolcert: Option<PathBuf>,

    /// Expected tail keyid as lowercase hex
    #[arg(short = 'k', long = "keyid")]
    keyid: Option<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Path to TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Base64-wrapped credential XML
    Base64,
    /// Raw credential XML
    Xml,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // clap already rejects -t with -k; keep the guard for direct callers
    if cli.toolcert.is_some() && cli.keyid.is_some() {
        eprintln!("error: -t and -k are mutually exclusive");
        std::process::exit(2);
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .map_err(|e| SpeaksForError::InputParse(e.to_string()))?,
        None => Config::default(),
    };

    let blob = fs::read(&cli.credential)?;
    let credential_xml = match cli.format {
        InputFormat::Base64 => {
            let compact: Vec<u8> = blob
                .into_iter()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            let decoded = STANDARD.decode(&compact).map_err(|e| {
                SpeaksForError::InputParse(format!("credential is not base64: {e}"))
            })?;
            String::from_utf8(decoded).map_err(|_| {
                SpeaksForError::InputParse("credential is not UTF-8 XML".to_string())
            })?
        }
        InputFormat::Xml => String::from_utf8(blob).map_err(|_| {
            SpeaksForError::InputParse("credential is not UTF-8 XML".to_string())
        })?,
    };

    let expected_tail = match (&cli.toolcert, &cli.keyid) {
        (Some(path), None) => Some(ExpectedTail::Tool(load_certificate_pem(&fs::read(path)?)?)),
        (None, Some(hex_digest)) => Some(ExpectedTail::KeyId(KeyId::from_hex(hex_digest)?)),
        (None, None) => None,
        (Some(_), Some(_)) => {
            return Err(SpeaksForError::UsageConflict(
                "-t and -k are mutually exclusive".to_string(),
            ))
        }
    };

    let schema = CredentialSchema::load(&config.schema_path)?;
    let store = TrustStore::open(cli.ca.unwrap_or(config.ca_dir))?;

    let verification = verify(
        &credential_xml,
        &schema,
        &store,
        expected_tail.as_ref(),
        Utc::now(),
    )?;

    println!("Speaks-for credential verified OK");
    println!("  head keyid: {}", verification.head_keyid);
    println!("  tail keyid: {}", verification.tail_keyid);
    println!(
        "  expires:    {}",
        verification.expires.format("%Y-%m-%dT%H:%M:%S%.3fZ")
    );
    if !verification.tail_checked {
        println!("  (tail binding not verified: no tool identity supplied)");
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
