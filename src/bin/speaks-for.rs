//! speaks-for CLI - issue a speaks-for credential
//!
//! Loads the signer's key material, signs a delegation to the given tool
//! certificate, and emits the credential as base64 on stdout (and to `-o`
//! when given).

use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{ArgAction, Parser, ValueEnum};
use zeroize::Zeroizing;

use speaks_for::config::Config;
use speaks_for::prelude::*;

#[derive(Parser)]
#[command(name = "speaks-for")]
#[command(about = "Issue a speaks-for credential delegating to a tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Signer credential file (PEM key + chain, or PKCS#12)
    #[arg(short = 'c', long = "credential")]
    credential: PathBuf,

    /// Credential file format
    #[arg(short = 'f', long = "format", value_enum, default_value_t = FormatArg::Pem)]
    format: FormatArg,

    /// Password for an encrypted key or PKCS#12 container
    #[arg(short = 'p', long)]
    password: Option<String>,

    /// Tool certificate (PEM)
    #[arg(short = 't', long = "toolcert")]
    toolcert: PathBuf,

    /// Credential validity in whole days
    #[arg(short = 'd', long)]
    days: Option<i64>,

    /// Also write the base64 credential to this file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Path to TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// PEM armor regions
    Pem,
    /// DER-encoded PKCS#12
    P12,
}

impl From<FormatArg> for KeyFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Pem => KeyFormat::Pem,
            FormatArg::P12 => KeyFormat::P12,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

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

    let blob = Zeroizing::new(fs::read(&cli.credential)?);
    let password = cli.password.map(Zeroizing::new);
    let bundle = CredentialBundle::load(&blob, cli.format.into(), password.as_deref().map(String::as_str))?;

    let tool_cert = load_certificate_pem(&fs::read(&cli.toolcert)?)?;
    let days = cli.days.unwrap_or(config.default_days);

    let credential_xml = sign(&bundle, &tool_cert, days)?;
    let encoded = STANDARD.encode(credential_xml.as_bytes());

    println!("{encoded}");
    if let Some(output) = &cli.output {
        fs::write(output, &encoded)?;
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
