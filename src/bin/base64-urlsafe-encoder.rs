//! base64-urlsafe-encoder CLI - RFC 4648 §5 wrapper
//!
//! Encodes stdin (or a file) with the URL-safe base64 alphabet, or decodes
//! with `-d`. Boundary tooling around the credential core.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use clap::Parser;

#[derive(Parser)]
#[command(name = "base64-urlsafe-encoder")]
#[command(about = "Encode or decode URL-safe base64 (RFC 4648 §5)", long_about = None)]
#[command(version)]
struct Cli {
    /// Decode instead of encode
    #[arg(short = 'd', long)]
    decode: bool,

    /// Input file (stdin when absent)
    #[arg(short = 'i', long)]
    input: Option<PathBuf>,

    /// Output file (stdout when absent)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let input = match &cli.input {
        Some(path) => fs::read(path)?,
        None => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };

    let output = if cli.decode {
        let compact: Vec<u8> = input
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        URL_SAFE.decode(&compact)?
    } else {
        let mut encoded = URL_SAFE.encode(&input).into_bytes();
        encoded.push(b'\n');
        encoded
    };

    match &cli.output {
        Some(path) => fs::write(path, &output)?,
        None => std::io::stdout().write_all(&output)?,
    }
    Ok(())
}
