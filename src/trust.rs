//! Trust anchor store
//!
//! Evaluates a presented certificate chain against a CA folder laid out in
//! OpenSSL subject-hash style: each anchor is reachable through a
//! `<subject_hash>.N` file name, where the hash is the lowercase 8-hex-digit
//! `openssl x509 -hash` value and `N` disambiguates colliding subjects.
//! The walk climbs from the end entity towards a self-signed trusted anchor,
//! locating issuers by hash lookup and verifying every signature on the way.

use std::cmp::Ordering;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::x509::{X509Ref, X509};
use tracing::{debug, warn};

use crate::Result;

/// Upper bound on the number of issuer hops
const MAX_CHAIN_DEPTH: usize = 16;

/// Three-valued outcome of a chain evaluation; this is the only contract the
/// store exposes upward
#[derive(Debug)]
pub enum ChainOutcome {
    /// Chain terminates at a trusted anchor and every link verifies
    Trusted,
    /// No trusted anchor reachable
    NotTrusted(String),
    /// A certificate on the path is outside its validity window
    Expired(String),
    /// The presented chain could not be parsed
    Malformed(String),
}

/// A folder of trust anchors indexed by subject hash
pub struct TrustStore {
    dir: PathBuf,
}

impl TrustStore {
    /// Open a CA folder; the folder must exist
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("CA folder {} not found", dir.display()),
            )
            .into());
        }
        Ok(TrustStore { dir })
    }

    /// File name an anchor is expected under, `<subject_hash>.<n>`
    pub fn anchor_file_name(cert: &X509Ref, n: usize) -> String {
        format!("{:08x}.{n}", cert.subject_name_hash())
    }

    /// Evaluate a PEM chain (end entity first) at the given instant
    pub fn evaluate_pem(&self, chain_pem: &str, now: DateTime<Utc>) -> ChainOutcome {
        let chain = match X509::stack_from_pem(chain_pem.as_bytes()) {
            Ok(chain) => chain,
            Err(e) => return ChainOutcome::Malformed(format!("chain does not parse: {e}")),
        };
        if chain.is_empty() {
            return ChainOutcome::Malformed("chain carries no certificates".to_string());
        }
        let now = match Asn1Time::from_unix(now.timestamp()) {
            Ok(now) => now,
            Err(e) => return ChainOutcome::Malformed(format!("bad evaluation instant: {e}")),
        };
        match self.walk(&chain, &now) {
            Ok(outcome) => outcome,
            Err(e) => ChainOutcome::Malformed(format!("chain evaluation failed: {e}")),
        }
    }

    fn walk(
        &self,
        chain: &[X509],
        now: &Asn1TimeRef,
    ) -> std::result::Result<ChainOutcome, ErrorStack> {
        // Expiry of any presented certificate is reported distinctly from
        // trust failures.
        for cert in chain {
            if let Some(reason) = validity_problem(cert, now)? {
                return Ok(ChainOutcome::Expired(reason));
            }
        }

        let mut current = chain[0].clone();
        for _ in 0..MAX_CHAIN_DEPTH {
            // A trusted anchor whose key verifies the current certificate
            // terminates the walk.
            for anchor in self.lookup(current.issuer_name_hash()) {
                let anchor_pubkey = anchor.public_key()?;
                if current.verify(&anchor_pubkey)? {
                    if let Some(reason) = validity_problem(&anchor, now)? {
                        return Ok(ChainOutcome::Expired(reason));
                    }
                    debug!(anchor = %subject_of(&anchor), "chain anchored");
                    return Ok(ChainOutcome::Trusted);
                }
            }

            if is_self_signed(&current)? {
                return Ok(ChainOutcome::NotTrusted(format!(
                    "self-signed {} is not a trust anchor",
                    subject_of(&current)
                )));
            }

            // Otherwise climb within the presented chain.
            let mut next = None;
            for candidate in &chain[1..] {
                if candidate.subject_name_hash() == current.issuer_name_hash() {
                    let candidate_pubkey = candidate.public_key()?;
                    if current.verify(&candidate_pubkey)? {
                        next = Some(candidate.clone());
                        break;
                    }
                }
            }
            match next {
                Some(candidate) => current = candidate,
                None => {
                    return Ok(ChainOutcome::NotTrusted(format!(
                        "no issuer found for {}",
                        subject_of(&current)
                    )))
                }
            }
        }
        Ok(ChainOutcome::NotTrusted(
            "maximum chain depth exceeded".to_string(),
        ))
    }

    /// All anchors filed under a subject hash: `<hash>.0`, `<hash>.1`, …
    /// until the first missing suffix
    fn lookup(&self, subject_hash: u32) -> Vec<X509> {
        let mut anchors = Vec::new();
        for n in 0.. {
            let path = self.dir.join(format!("{subject_hash:08x}.{n}"));
            let pem = match std::fs::read(&path) {
                Ok(pem) => pem,
                Err(_) => break,
            };
            match X509::from_pem(&pem) {
                Ok(anchor) => anchors.push(anchor),
                Err(e) => warn!(path = %path.display(), "skipping unreadable anchor: {e}"),
            }
        }
        anchors
    }
}

fn is_self_signed(cert: &X509Ref) -> std::result::Result<bool, ErrorStack> {
    if cert.subject_name_hash() != cert.issuer_name_hash() {
        return Ok(false);
    }
    let pubkey = cert.public_key()?;
    cert.verify(&pubkey)
}

fn validity_problem(
    cert: &X509Ref,
    now: &Asn1TimeRef,
) -> std::result::Result<Option<String>, ErrorStack> {
    if cert.not_after().compare(now)? == Ordering::Less {
        return Ok(Some(format!("{} has expired", subject_of(cert))));
    }
    if cert.not_before().compare(now)? == Ordering::Greater {
        return Ok(Some(format!("{} is not yet valid", subject_of(cert))));
    }
    Ok(None)
}

fn subject_of(cert: &X509Ref) -> String {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
        .unwrap_or_else(|| "<unnamed certificate>".to_string())
}
