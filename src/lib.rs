//! All things MCP trust.
//!
//! The _Maritime Connectivity Platform_ (MCP) identifies vessels, services,
//! organizations and people through _Maritime Resource Names_ (MRNs) bound
//! to X.509 certificates issued by _MCP Identity Registries_ (MIRs). Parties
//! authenticate each other by presenting signed JSON Web Tokens whose
//! signing certificates chain up to a trusted registry and they vouch for
//! each other through signed attestations.
//!
//! This crate contains the types and functionality for relying on these
//! identities: decoding certificates, validating certificate chains and
//! their revocation status, validating tokens, authenticating entities,
//! and creating and verifying attestations.
//!
//! Validation is configured through [`ValidationOptions`][options], which
//! can also be created from a JSON [`ValidationConfig`][config].
//!
//! [options]: crate::options::ValidationOptions
//! [config]: crate::config::ValidationConfig

pub use self::certificate::{Certificate, Fingerprint};
pub use self::entity::Entity;
pub use self::error::{AttestationError, CertificateError, TokenError};
pub use self::mrn::Mrn;
pub use self::options::ValidationOptions;

pub mod attestation;
pub mod cache;
pub mod cert;
pub mod certificate;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod fetch;
pub mod jose;
pub mod mrn;
pub mod oid;
pub mod options;
pub mod status;
pub mod token;
pub mod util;
pub mod x509;
