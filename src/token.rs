//! Validating signed tokens.
//!
//! MCP entities identify themselves with JSON Web Tokens signed with the
//! key of their certificate. The header of a token contains an `x5u` URL
//! from where the certificate chain of the signer can be retrieved. The
//! token is verified with the key of the first certificate in the chain.
//!
//! Validating a token does not validate the certificate chain. This is a
//! separate step done by the users of a validated token, such as
//! [`Entity`][crate::entity::Entity] and
//! [`Attestation`][crate::attestation::Attestation].

use std::collections::BTreeMap;
use log::{debug, info};
use serde_json::Value;
use crate::certificate::Certificate;
use crate::error::TokenError;
use crate::jose::{self, Claims, Header, JoseError, JwsAlgorithm};
use crate::mrn::Mrn;
use crate::options::ValidationOptions;
use crate::x509::Time;


//------------ Expectations --------------------------------------------------

/// Header values a token is expected to have.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Expectations {
    values: BTreeMap<String, String>,
}

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the token to have the given nonce.
    pub fn nonce(nonce: impl Into<String>) -> Self {
        Self::new().with("nonce", nonce)
    }

    pub fn with(
        mut self, name: impl Into<String>, value: impl Into<String>
    ) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Checks that the header meets all expectations.
    fn check(&self, header: &Header) -> Result<(), TokenError> {
        for (name, expected) in self.iter() {
            if header.get(name).as_deref() == Some(expected) {
                continue
            }
            if name == "nonce" {
                return Err(TokenError::InvalidNonce(header.nonce.clone()))
            }
            return Err(TokenError::UnmetExpectation(name.into()))
        }
        Ok(())
    }
}


//------------ ValidatedToken ------------------------------------------------

/// A token with a valid signature.
#[derive(Clone, Debug)]
pub struct ValidatedToken {
    raw: String,
    header: Header,
    claims: Claims,

    /// The chain retrieved from the `x5u` URL.
    chain: Vec<Certificate>,

    /// The `sub` claim.
    subject: Mrn,
}

impl ValidatedToken {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    /// Returns a claim if it is a string.
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(Value::as_str)
    }

    /// Returns the certificate chain of the signer.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Returns the certificate the token was signed with.
    pub fn signer(&self) -> &Certificate {
        // The chain is never empty.
        &self.chain[0]
    }

    pub fn subject(&self) -> &Mrn {
        &self.subject
    }

    /// Returns the `iss` claim if present.
    pub fn issuer(&self) -> Option<&str> {
        self.claim_str("iss")
    }
}


//------------ validate ------------------------------------------------------

/// Validates a token.
///
/// Retrieves the certificate chain from the `x5u` URL of the token,
/// verifies the token with the key of the first certificate, checks the
/// expectations, and requires a `sub` claim with an MRN.
pub async fn validate(
    token: &str,
    expectations: &Expectations,
    options: &ValidationOptions,
) -> Result<ValidatedToken, TokenError> {
    validate_at(token, expectations, options, Time::now()).await
}

/// Validates a token at the given time.
pub async fn validate_at(
    token: &str,
    expectations: &Expectations,
    options: &ValidationOptions,
    now: Time,
) -> Result<ValidatedToken, TokenError> {
    let header = jose::decode_header(token).map_err(|err| {
        collapse(token, err)
    })?;
    let x5u = match header.x5u {
        Some(ref x5u) => x5u,
        None => return Err(TokenError::NoCertificate(TokenError::excerpt(token)))
    };
    let chain = fetch_chain(x5u, options).await?;

    let key = chain[0].public_key();
    if JwsAlgorithm::for_key_format(key.algorithm()).is_none() {
        return Err(TokenError::InvalidPublicKey(TokenError::excerpt(token)))
    }
    let (header, claims) = jose::verify(
        token, key, options.jwt(), now
    ).map_err(|err| collapse(token, err))?;

    expectations.check(&header)?;

    let subject = match claims.get("sub") {
        Some(Value::String(sub)) => {
            Mrn::parse(sub).map_err(|_| {
                TokenError::SubjectNotMrn(sub.clone())
            })?
        }
        Some(other) => {
            return Err(TokenError::SubjectNotMrn(other.to_string()))
        }
        None => {
            return Err(TokenError::NoSubject(TokenError::excerpt(token)))
        }
    };

    Ok(ValidatedToken {
        raw: token.into(),
        header, claims, chain, subject
    })
}

/// Retrieves and parses the certificate chain at a URL.
async fn fetch_chain(
    x5u: &str, options: &ValidationOptions
) -> Result<Vec<Certificate>, TokenError> {
    let invalid = || TokenError::InvalidX5U(x5u.into());
    let content = match tokio::time::timeout(
        options.fetch_timeout(), options.fetcher().fetch(x5u)
    ).await {
        Ok(Ok(content)) => content,
        Ok(Err(err)) => {
            info!("Fetching {} failed: {}", x5u, err);
            return Err(invalid())
        }
        Err(_) => {
            info!("Fetching {} timed out.", x5u);
            return Err(invalid())
        }
    };
    let pem = std::str::from_utf8(&content).map_err(|_| invalid())?;
    let chain = Certificate::from_pem_bundle(pem);
    if chain.is_empty() {
        debug!("No certificates at {}.", x5u);
        return Err(invalid())
    }
    Ok(chain)
}

/// Turns a JOSE error into the generic token error.
fn collapse(token: &str, err: JoseError) -> TokenError {
    info!("Token {}... rejected: {}", TokenError::excerpt(token), err);
    TokenError::token(token)
}


//============ Testing =======================================================
