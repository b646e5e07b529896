//! Error types for speaks-for credential operations

use thiserror::Error;

/// Result type alias for credential operations
pub type Result<T> = std::result::Result<T, SpeaksForError>;

/// Main error type for issuing and verifying speaks-for credentials
///
/// Each verification stage converts its lower-level failure into exactly one
/// of these kinds with a human-readable reason; the pipeline surfaces the
/// first failure and stops.
#[derive(Error, Debug)]
pub enum SpeaksForError {
    /// Malformed PEM/PKCS#12/XML input
    #[error("Input parse error: {0}")]
    InputParse(String),

    /// Wrong or missing password for an encrypted private key
    #[error("{0}")]
    KeyDecryption(String),

    /// Multiple private keys in one PEM, or divergent key IDs in one PKCS#12
    #[error("{0}")]
    KeyAmbiguity(String),

    /// Credential XML rejected by the credential schema
    #[error("Schema validation failed: {0}")]
    SchemaInvalid(String),

    /// Canonicalization or XML signature check failed
    #[error("XML signature invalid: {0}")]
    SignatureInvalid(String),

    /// Untrusted, expired or malformed certificate chain
    #[error(transparent)]
    TrustChain(#[from] ChainError),

    /// Credential `expires` lies in the past
    #[error("Credential expired: {0}")]
    Expired(String),

    /// Head or tail keyid does not match the expected value
    #[error("Key binding mismatch: {0}")]
    KeyBindingMismatch(String),

    /// Caller provided mutually exclusive options
    #[error("Usage conflict: {0}")]
    UsageConflict(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// OpenSSL errors
    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

/// Trust-chain failure reasons, reported distinctly by the anchor store
#[derive(Error, Debug)]
pub enum ChainError {
    /// Chain does not terminate at a trusted anchor
    #[error("Certificate chain is not trusted: {0}")]
    NotTrusted(String),

    /// A certificate in the chain is outside its validity window
    #[error("Certificate chain is not acceptable: {0}")]
    CertExpired(String),

    /// A certificate in the chain could not be parsed
    #[error("Malformed certificate chain: {0}")]
    Malformed(String),
}
