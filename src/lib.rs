//! # speaks-for — Fed4FIRE Speaks-For Credentials
//!
//! This crate issues and verifies speaks-for credentials: signed XML/ABAC
//! assertions by which a user delegates, for a bounded period, the authority
//! to act on their behalf to a named software tool. A credential carries an
//! X.509 certificate chain, an enveloped XML-DSig signature, and an ABAC RT0
//! rule of the form *userKey speaks_for userKey → toolKey*.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//! - `bundle`: private key and certificate chain loading (PEM, PKCS#12)
//! - `fingerprint`: SHA-1 public-key fingerprints and XML-DSig encodings
//! - `xml`: document helpers and exclusive canonicalization with the
//!   `xml:id` fixup
//! - `credential`: the credential document, its schema check, the signing
//!   builder and the five-stage verification pipeline
//! - `trust`: the subject-hash-indexed trust anchor folder
//!
//! The binaries `speaks-for`, `validate-speaks-for` and
//! `base64-urlsafe-encoder` wrap this library one invocation at a time; the
//! core itself is a synchronous transform with no shared state.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bundle;
pub mod config;
pub mod credential;
pub mod error;
pub mod fingerprint;
pub mod trust;
pub mod xml;

// Re-export commonly used types
pub use bundle::{CredentialBundle, KeyFormat};
pub use error::{ChainError, Result, SpeaksForError};
pub use fingerprint::KeyId;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bundle::{load_certificate_pem, CredentialBundle, KeyFormat};
    pub use crate::credential::builder::{sign, DEFAULT_VALIDITY_DAYS};
    pub use crate::credential::schema::CredentialSchema;
    pub use crate::credential::verifier::{verify, ExpectedTail, Verification};
    pub use crate::error::{ChainError, Result, SpeaksForError};
    pub use crate::fingerprint::KeyId;
    pub use crate::trust::TrustStore;
}
