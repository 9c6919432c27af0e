//! Attestations by one entity about another.
//!
//! An attestation is a signed statement by an issuer about a subject. The
//! statement consists of a fixed set of claims, such as that the subject
//! is a MIR in good standing. Attestations are exchanged as tokens signed
//! with the key of the issuer’s certificate.

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::TimeDelta;
use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::cert::issuer::Issuer;
use crate::certificate::Certificate;
use crate::chain;
use crate::crypto::{KeyPair, SigningError};
pub use crate::error::AttestationError;
use crate::jose::{self, Header, JoseError, Jwk, JwsAlgorithm};
use crate::mrn::Mrn;
use crate::options::{AttestedTrust, ValidationOptions};
use crate::token::{self, Expectations};
use crate::x509::Time;


//------------ ClaimKind -----------------------------------------------------

/// The claims an attestation can make.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize
)]
pub enum ClaimKind {
    /// The subject is a MIR in good standing.
    #[serde(rename = "mirOk")]
    MirOk,

    /// The issuer endorses the subject as a MIR.
    #[serde(rename = "mirEndorsed")]
    MirEndorsed,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 2] = [ClaimKind::MirOk, ClaimKind::MirEndorsed];

    /// Returns the name of the claim in tokens.
    pub fn name(self) -> &'static str {
        match self {
            ClaimKind::MirOk => "mirOk",
            ClaimKind::MirEndorsed => "mirEndorsed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}


//------------ Claims --------------------------------------------------------

/// The claims of an attestation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Claims {
    pub mir_ok: bool,
    pub mir_endorsed: bool,
}

impl Claims {
    pub fn get(&self, kind: ClaimKind) -> bool {
        match kind {
            ClaimKind::MirOk => self.mir_ok,
            ClaimKind::MirEndorsed => self.mir_endorsed,
        }
    }

    pub fn set(&mut self, kind: ClaimKind, value: bool) {
        match kind {
            ClaimKind::MirOk => self.mir_ok = value,
            ClaimKind::MirEndorsed => self.mir_endorsed = value,
        }
    }

    pub fn with(mut self, kind: ClaimKind, value: bool) -> Self {
        self.set(kind, value);
        self
    }

    /// Reads the recognized claims from a token’s claims.
    ///
    /// Claims that are missing are false.
    fn from_token_claims(claims: &jose::Claims) -> Self {
        let mut res = Claims { mir_ok: false, mir_endorsed: false };
        for kind in ClaimKind::ALL {
            res.set(kind, claims.get(kind.name()).map(truthy).unwrap_or(false))
        }
        res
    }
}

impl Default for Claims {
    fn default() -> Self {
        Claims { mir_ok: true, mir_endorsed: false }
    }
}

fn truthy(value: &Value) -> bool {
    match *value {
        Value::Null => false,
        Value::Bool(value) => value,
        Value::Number(ref value) => value.as_f64() != Some(0.),
        Value::String(ref value) => !value.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}


//------------ SigningKey ----------------------------------------------------

/// The key to sign attestations with.
#[derive(Clone, Debug)]
pub enum SigningKey {
    /// A key pair ready for use.
    Pair(Arc<KeyPair>),

    /// A private key in JWK form.
    Jwk(Jwk),
}

impl SigningKey {
    /// Returns the algorithm the key wants to be used with.
    pub fn algorithm(&self) -> Option<JwsAlgorithm> {
        match *self {
            SigningKey::Pair(ref key) => {
                JwsAlgorithm::for_key_format(key.format())
            }
            SigningKey::Jwk(ref jwk) => jwk.algorithm(),
        }
    }

    pub fn to_key_pair(&self) -> Result<Arc<KeyPair>, SigningError> {
        match *self {
            SigningKey::Pair(ref key) => Ok(key.clone()),
            SigningKey::Jwk(ref jwk) => jwk.to_key_pair().map(Arc::new),
        }
    }
}

impl From<Arc<KeyPair>> for SigningKey {
    fn from(key: Arc<KeyPair>) -> Self {
        SigningKey::Pair(key)
    }
}

impl From<Jwk> for SigningKey {
    fn from(jwk: Jwk) -> Self {
        SigningKey::Jwk(jwk)
    }
}


//------------ Party ---------------------------------------------------------

/// The issuer or subject of an attestation.
#[derive(Clone, Debug)]
pub struct Party {
    uid: Mrn,

    /// The thumbprint of the party’s certificate.
    x5t256: Option<String>,

    /// Where to find the party’s certificate chain.
    x5u_url: Option<String>,

    key: Option<SigningKey>,
    algorithm: Option<JwsAlgorithm>,
}

impl Party {
    pub fn new(uid: Mrn) -> Self {
        Party {
            uid,
            x5t256: None,
            x5u_url: None,
            key: None,
            algorithm: None,
        }
    }

    /// Creates a party from its certificate.
    pub fn from_certificate(certificate: &Certificate) -> Self {
        let mut res = Self::new(certificate.uid().clone());
        res.x5t256 = Some(certificate.x5t256());
        res.x5u_url = certificate.x5u_url().map(Into::into);
        res
    }

    /// Creates a party that can sign with the issuer’s key.
    pub fn from_issuer(issuer: &Issuer) -> Self {
        Self::from_certificate(issuer.certificate()).with_key(
            issuer.key().clone()
        )
    }

    pub fn with_x5t256(mut self, x5t256: impl Into<String>) -> Self {
        self.x5t256 = Some(x5t256.into());
        self
    }

    pub fn with_x5u_url(mut self, url: impl Into<String>) -> Self {
        self.x5u_url = Some(url.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<SigningKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: JwsAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn uid(&self) -> &Mrn {
        &self.uid
    }

    pub fn x5t256(&self) -> Option<&str> {
        self.x5t256.as_deref()
    }

    pub fn x5u_url(&self) -> Option<&str> {
        self.x5u_url.as_deref()
    }

    pub fn key(&self) -> Option<&SigningKey> {
        self.key.as_ref()
    }

    pub fn algorithm(&self) -> Option<JwsAlgorithm> {
        self.algorithm
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}


//------------ TokenOptions --------------------------------------------------

/// Options for turning an attestation into a token.
#[derive(Clone, Debug)]
pub struct TokenOptions {
    /// The key to sign with instead of the issuer’s key.
    key: Option<SigningKey>,

    algorithm: Option<JwsAlgorithm>,

    /// How long the token is valid.
    expiration: TimeDelta,

    /// The issue time instead of now.
    issued_at: Option<Time>,
}

impl TokenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: impl Into<SigningKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: JwsAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn with_expiration(mut self, expiration: TimeDelta) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_issued_at(mut self, issued_at: Time) -> Self {
        self.issued_at = Some(issued_at);
        self
    }
}

impl Default for TokenOptions {
    fn default() -> Self {
        TokenOptions {
            key: None,
            algorithm: None,
            expiration: TimeDelta::days(30),
            issued_at: None,
        }
    }
}


//------------ Attestation ---------------------------------------------------

/// An attestation by an issuer about a subject.
#[derive(Clone, Debug)]
pub struct Attestation {
    issuer: Party,
    subject: Party,
    claims: Claims,
}

impl Attestation {
    pub fn new(issuer: Party, subject: Party, claims: Claims) -> Self {
        Attestation { issuer, subject, claims }
    }

    /// Creates an attestation that can be relied upon.
    ///
    /// The subject has to be bound to its certificate via its thumbprint.
    pub fn strict(
        issuer: Party, subject: Party, claims: Claims
    ) -> Result<Self, AttestationError> {
        if subject.x5t256.is_none() {
            return Err(AttestationError::NoX5t256)
        }
        Ok(Self::new(issuer, subject, claims))
    }

    pub fn issuer(&self) -> &Party {
        &self.issuer
    }

    pub fn subject(&self) -> &Party {
        &self.subject
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn claim(&self, kind: ClaimKind) -> bool {
        self.claims.get(kind)
    }

    /// Returns a claim by its name.
    ///
    /// Unknown claims are false.
    pub fn claim_named(&self, name: &str) -> bool {
        ClaimKind::from_name(name).map(|kind| self.claim(kind)).unwrap_or(false)
    }

    /// Returns whether the attestation makes a claim about a subject.
    pub fn asserts(&self, subject: &Mrn, claim: ClaimKind) -> bool {
        self.subject.uid == *subject && self.claim(claim)
    }
}

/// # Tokens
///
impl Attestation {
    /// Creates a signed token for the attestation.
    ///
    /// The key is taken from the options or else from the issuer. The
    /// algorithm is the one given in the options, else the one of the key,
    /// else the one of the issuer, else ES384.
    pub fn as_token(
        &self, options: &TokenOptions
    ) -> Result<String, AttestationError> {
        let key = options.key.as_ref().or(
            self.issuer.key.as_ref()
        ).ok_or(AttestationError::NoPrivateKey)?;
        let algorithm = options.algorithm
            .or_else(|| key.algorithm())
            .or(self.issuer.algorithm)
            .unwrap_or(JwsAlgorithm::Es384);
        let key = key.to_key_pair()?;

        let mut header = Header::new(algorithm);
        header.x5u = self.issuer.x5u_url.clone();

        let issued_at = options.issued_at.unwrap_or_else(Time::now);
        let mut claims = jose::Claims::new();
        claims.insert("iss".into(), self.issuer.uid.as_str().into());
        claims.insert("sub".into(), self.subject.uid.as_str().into());
        if let Some(ref x5t256) = self.subject.x5t256 {
            claims.insert("subX5t256".into(), x5t256.as_str().into());
        }
        for kind in ClaimKind::ALL {
            claims.insert(kind.name().into(), self.claim(kind).into());
        }
        claims.insert("iat".into(), issued_at.timestamp().into());
        claims.insert(
            "exp".into(), (issued_at + options.expiration).timestamp().into()
        );

        jose::sign(&header, &claims, &key).map_err(|err| match err {
            JoseError::Signing(err) => AttestationError::Signing(err),
            _ => AttestationError::Signing(SigningError::UnsupportedAlgorithm)
        })
    }

    /// Reads an attestation from a token.
    ///
    /// The token and the certificate chain of its issuer are validated
    /// using the options.
    pub async fn from_token(
        token: &str, options: &ValidationOptions
    ) -> Result<Self, AttestationError> {
        let validated = token::validate(
            token, &Expectations::new(), options
        ).await?;
        let iss = validated.issuer().ok_or(AttestationError::NoIssuer)?;
        let iss = Mrn::parse(iss).map_err(|_| AttestationError::NoIssuer)?;

        chain::validate_chain(validated.chain(), Some(&iss), options).await?;

        let mut subject = Party::new(validated.subject().clone());
        subject.x5t256 = validated.claim_str("subX5t256").map(Into::into);
        let issuer = Party::from_certificate(validated.signer());
        let claims = Claims::from_token_claims(validated.claims());
        if options.strict() {
            Self::strict(issuer, subject, claims)
        }
        else {
            Ok(Self::new(issuer, subject, claims))
        }
    }
}


//------------ AttestationStore ----------------------------------------------

/// Attestations about roots that aren’t trusted directly.
///
/// The store keeps attestation tokens by the MRN of their subject. Used as
/// the attested trust of validation options, it vouches for a root if one
/// of its attestations is valid, is bound to the root’s certificate if it
/// names a thumbprint, and makes one of the claims listed in the
/// options’ trusted attestations.
#[derive(Debug, Default)]
pub struct AttestationStore {
    tokens: DashMap<Mrn, Vec<String>>,
}

impl AttestationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attestation token about `subject`.
    pub fn add(&self, subject: &Mrn, token: impl Into<String>) {
        self.tokens.entry(subject.clone()).or_default().push(token.into());
    }

    /// Drops all attestations about `subject`.
    pub fn remove(&self, subject: &Mrn) {
        self.tokens.remove(subject);
    }

    pub fn len(&self) -> usize {
        self.tokens.iter().map(|item| item.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the attestations about `subject` that can be relied upon.
    pub async fn attestations_for(
        &self, subject: &Certificate, options: &ValidationOptions
    ) -> Vec<Attestation> {
        let tokens = match self.tokens.get(subject.uid()) {
            Some(item) => item.value().clone(),
            None => return Vec::new()
        };

        // Issuers of attestations have to be trusted on their own.
        let options = options.clone().with_trust_attested(false);
        let x5t256 = subject.x5t256();
        let mut res = Vec::new();
        for token in tokens {
            let attn = match Attestation::from_token(&token, &options).await {
                Ok(attn) => attn,
                Err(err) => {
                    debug!(
                        "Ignoring attestation about {}: {}", subject.uid(), err
                    );
                    continue
                }
            };
            if attn.subject().x5t256().is_some_and(|item| item != x5t256) {
                debug!(
                    "Ignoring attestation about {} for another certificate.",
                    subject.uid()
                );
                continue
            }
            res.push(attn)
        }
        res
    }
}

#[async_trait]
impl AttestedTrust for AttestationStore {
    async fn vouches_for(
        &self, root: &Certificate, options: &ValidationOptions
    ) -> bool {
        let attestations = self.attestations_for(root, options).await;
        let found = attestations.iter().find(|attn| {
            options.trusted_attestations().iter().any(|kind| {
                attn.asserts(root.uid(), *kind)
            })
        });
        match found {
            Some(attn) => {
                debug!(
                    "{} vouches for {}.", attn.issuer().uid(), root.uid()
                );
                true
            }
            None => false
        }
    }
}


//============ Testing =======================================================
