//! The errors of certificate, token, and attestation validation.
//!
//! Leaf errors live next to their types. This module collects the errors
//! produced by the validation steps which tie everything together.

use std::{error, fmt};
use crate::certificate::Fingerprint;
use crate::crypto::SigningError;
use crate::mrn::Mrn;
use crate::x509::Time;


//------------ CertificateError ----------------------------------------------

/// A certificate or certificate chain was rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertificateError {
    /// The certificate could not be decoded.
    Parse(String),

    /// The subject of the certificate has no valid MRN as its UID.
    SubjectNotMrn(String),

    /// The UID of the certificate is not the expected one.
    UidMismatch { uid: Mrn, expected: Mrn },

    /// The certificate has expired.
    Expired { uid: Mrn, valid_to: Time },

    /// The certificate is not valid yet.
    NotYetValid { uid: Mrn, valid_from: Time },

    /// The subject’s MRN is not within the issuer’s name space.
    SubjectIssuerMismatch { uid: Mrn, ipid: Option<String> },

    /// The issuing certificate is not a CA certificate.
    IssuerNotCa(Mrn),

    /// The certificate was not signed by the issuing certificate.
    NotIssued { uid: Mrn, issuer: Mrn, fingerprint: Fingerprint },

    /// The certificate has been revoked.
    Revoked { uid: Mrn, fingerprint: Fingerprint },

    /// The status of the certificate could not be determined.
    UnknownStatus { uid: Mrn, fingerprint: Fingerprint },

    /// The root of a chain is not trusted.
    NotTrusted { uid: Mrn, fingerprint: Fingerprint },

    /// There was no certificate to validate.
    NoCertificate,

    /// The element at the given position of a chain isn’t a certificate.
    NotACertificate(usize),
}

impl CertificateError {
    /// Returns a short name for the kind of error.
    pub fn code(&self) -> &'static str {
        match *self {
            CertificateError::Parse(_) => "CouldNotParsePEM",
            CertificateError::SubjectNotMrn(_) => "SubjectNotMrn",
            CertificateError::UidMismatch { .. } => "UidMismatch",
            CertificateError::Expired { .. } => "Expired",
            CertificateError::NotYetValid { .. } => "NotYetValid",
            CertificateError::SubjectIssuerMismatch { .. } => {
                "SubjectIssuerMismatch"
            }
            CertificateError::IssuerNotCa(_) => "IssuerNotCA",
            CertificateError::NotIssued { .. } => "NotIssued",
            CertificateError::Revoked { .. } => "Revoked",
            CertificateError::UnknownStatus { .. } => "UnknownStatus",
            CertificateError::NotTrusted { .. } => "NotTrusted",
            CertificateError::NoCertificate => "NoCertificate",
            CertificateError::NotACertificate(_) => "NotACertificate",
        }
    }
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            CertificateError::Parse(ref err) => {
                write!(f, "certificate could not be parsed: {}", err)
            }
            CertificateError::SubjectNotMrn(ref dn) => {
                write!(f, "certificate UID is not a MRN: {}", dn)
            }
            CertificateError::UidMismatch { ref uid, ref expected } => {
                write!(
                    f, "certificate UID {} does not match: {}",
                    uid, expected
                )
            }
            CertificateError::Expired { ref valid_to, .. } => {
                write!(f, "certificate expired at {}", valid_to)
            }
            CertificateError::NotYetValid { ref valid_from, .. } => {
                write!(f, "certificate is valid only from {}", valid_from)
            }
            CertificateError::SubjectIssuerMismatch { ref uid, ref ipid } => {
                write!(
                    f, "subject {} cannot have been issued by {}",
                    uid, ipid.as_deref().unwrap_or("<none>")
                )
            }
            CertificateError::IssuerNotCa(ref uid) => {
                write!(
                    f, "certificate for {} is not intended to be used as \
                    CA certificate", uid
                )
            }
            CertificateError::NotIssued {
                ref uid, ref issuer, ref fingerprint
            } => {
                write!(
                    f, "certificate for {} was not issued by certificate \
                    for {} with fingerprint {}",
                    uid, issuer, fingerprint
                )
            }
            CertificateError::Revoked { ref uid, ref fingerprint } => {
                write!(
                    f, "certificate for {} has been revoked: {}",
                    uid, fingerprint
                )
            }
            CertificateError::UnknownStatus { ref uid, ref fingerprint } => {
                write!(
                    f, "status of certificate for {} is unknown: {}",
                    uid, fingerprint
                )
            }
            CertificateError::NotTrusted { ref uid, ref fingerprint } => {
                write!(
                    f, "certificate for {} is not trusted: {}",
                    uid, fingerprint
                )
            }
            CertificateError::NoCertificate => {
                f.write_str("certificate chain has no certificate")
            }
            CertificateError::NotACertificate(idx) => {
                write!(f, "chain element {} is not a certificate", idx)
            }
        }
    }
}

impl error::Error for CertificateError { }


//------------ TokenError ----------------------------------------------------

/// A token was rejected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TokenError {
    /// The token is malformed or its signature didn’t verify.
    ///
    /// The reasons are collapsed into this one variant. The value is the
    /// start of the token.
    Token(String),

    /// The nonce of the token isn’t the expected one.
    InvalidNonce(Option<String>),

    /// Some other expectation wasn’t met. The value is its name.
    UnmetExpectation(String),

    /// The certificate chain couldn’t be retrieved from the x5u URL.
    InvalidX5U(String),

    /// The token refers to a public key that cannot be used.
    InvalidPublicKey(String),

    /// The token has no `sub` claim.
    NoSubject(String),

    /// The `sub` claim isn’t an MRN.
    SubjectNotMrn(String),

    /// The token doesn’t refer to a certificate.
    NoCertificate(String),

    /// The subject of the token cannot have been issued by its issuer.
    SubjectIssuerMismatch { sub: String, iss: String },

    /// The certificate chain of the token was rejected.
    Certificate(CertificateError),
}

impl TokenError {
    /// Creates the generic token error for a token.
    pub fn token(token: &str) -> Self {
        TokenError::Token(Self::excerpt(token))
    }

    /// Returns the first 20 characters of a token for error messages.
    pub(crate) fn excerpt(token: &str) -> String {
        token.chars().take(20).collect()
    }

    /// Returns a short name for the kind of error.
    pub fn code(&self) -> &'static str {
        match *self {
            TokenError::Token(_) => "TokenError",
            TokenError::InvalidNonce(_) => "InvalidNonce",
            TokenError::UnmetExpectation(_) => "UnmetExpectation",
            TokenError::InvalidX5U(_) => "InvalidX5U",
            TokenError::InvalidPublicKey(_) => "InvalidPublicKey",
            TokenError::NoSubject(_) => "NoSubject",
            TokenError::SubjectNotMrn(_) => "SubjectNotMrn",
            TokenError::NoCertificate(_) => "NoCertificate",
            TokenError::SubjectIssuerMismatch { .. } => {
                "SubjectIssuerMismatch"
            }
            TokenError::Certificate(ref err) => err.code(),
        }
    }
}

impl From<CertificateError> for TokenError {
    fn from(err: CertificateError) -> Self {
        TokenError::Certificate(err)
    }
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            TokenError::Token(ref token) => {
                write!(f, "error with provided JSON Web Token: {}...", token)
            }
            TokenError::InvalidNonce(Some(ref nonce)) => {
                write!(f, "token has no matching nonce: {}", nonce)
            }
            TokenError::InvalidNonce(None) => {
                f.write_str("token has no nonce")
            }
            TokenError::UnmetExpectation(ref name) => {
                write!(f, "token does not meet expectation '{}'", name)
            }
            TokenError::InvalidX5U(ref x5u) => {
                write!(f, "token has an x5u that is not valid: {}", x5u)
            }
            TokenError::InvalidPublicKey(ref token) => {
                write!(
                    f, "token refers to a public key that cannot be \
                    read: {}...", token
                )
            }
            TokenError::NoSubject(ref token) => {
                write!(
                    f, "token does not have a 'sub' claim: {}...", token
                )
            }
            TokenError::SubjectNotMrn(ref sub) => {
                write!(f, "token 'sub' is not a MRN: {}", sub)
            }
            TokenError::NoCertificate(ref token) => {
                write!(
                    f, "token does not refer to an MCP certificate: {}...",
                    token
                )
            }
            TokenError::SubjectIssuerMismatch { ref sub, ref iss } => {
                write!(
                    f, "subject {} cannot have been issued by {}", sub, iss
                )
            }
            TokenError::Certificate(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for TokenError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            TokenError::Certificate(ref err) => Some(err),
            _ => None
        }
    }
}


//------------ AttestationError ----------------------------------------------

/// Creating or reading an attestation failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttestationError {
    /// The attestation token was rejected.
    Token(TokenError),

    /// The certificate chain of the attestation issuer was rejected.
    Certificate(CertificateError),

    /// The subject has no certificate thumbprint.
    NoX5t256,

    /// There is no private key to sign the attestation with.
    NoPrivateKey,

    /// The attestation token has no usable `iss` claim.
    NoIssuer,

    /// Signing the attestation failed.
    Signing(SigningError),
}

impl From<TokenError> for AttestationError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Certificate(err) => {
                AttestationError::Certificate(err)
            }
            err => AttestationError::Token(err)
        }
    }
}

impl From<CertificateError> for AttestationError {
    fn from(err: CertificateError) -> Self {
        AttestationError::Certificate(err)
    }
}

impl From<SigningError> for AttestationError {
    fn from(err: SigningError) -> Self {
        AttestationError::Signing(err)
    }
}

impl fmt::Display for AttestationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AttestationError::Token(ref err) => err.fmt(f),
            AttestationError::Certificate(ref err) => err.fmt(f),
            AttestationError::NoX5t256 => {
                f.write_str("attestation subject has no x5t#S256")
            }
            AttestationError::NoPrivateKey => {
                f.write_str("no private key to sign the attestation")
            }
            AttestationError::NoIssuer => {
                f.write_str("attestation has no valid issuer")
            }
            AttestationError::Signing(ref err) => {
                write!(f, "failed to sign attestation: {}", err)
            }
        }
    }
}

impl error::Error for AttestationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            AttestationError::Token(ref err) => Some(err),
            AttestationError::Certificate(ref err) => Some(err),
            AttestationError::Signing(ref err) => Some(err),
            _ => None
        }
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_excerpt() {
        let err = TokenError::token(
            "eyJhbGciOiJFUzM4NCIsIng1dSI6Imh0dHBzOi8v"
        );
        assert_eq!(err, TokenError::Token("eyJhbGciOiJFUzM4NCIs".into()));
        assert_eq!(err.code(), "TokenError");
    }

    #[test]
    fn certificate_errors_in_attestations() {
        let err = AttestationError::from(
            TokenError::Certificate(CertificateError::NoCertificate)
        );
        assert_eq!(
            err, AttestationError::Certificate(CertificateError::NoCertificate)
        );
        assert_eq!(
            TokenError::from(CertificateError::NoCertificate).code(),
            "NoCertificate"
        );
    }
}
