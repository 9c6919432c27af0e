//! JSON Web Signatures in compact serialization.
//!
//! This module implements the small subset of JOSE needed for MCP tokens:
//! ECDSA signatures with the P-256 and P-384 curves over a JSON header and
//! a JSON claims set. Certificates, not keys, are the source of trust for
//! these tokens, so there is no support for key sets or encryption.
//!
//! Signatures are checked by the `jsonwebtoken` crate. Headers are decoded
//! here since tokens carry parameters such as `nonce` that its header type
//! doesn’t know. Time claims are checked here, too, against an explicit
//! validation time.

use std::{error, fmt, str};
use bytes::Bytes;
use chrono::TimeDelta;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use jsonwebtoken::errors::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::crypto::{
    KeyPair, PublicKey, PublicKeyFormat, SigningError
};
use crate::util::base64;
use crate::x509::Time;


/// The claims set of a token.
pub type Claims = Map<String, Value>;


//------------ JwsAlgorithm --------------------------------------------------

/// The signature algorithms we support.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum JwsAlgorithm {
    #[serde(rename = "ES256")]
    Es256,

    #[serde(rename = "ES384")]
    Es384,
}

impl JwsAlgorithm {
    /// Returns the algorithm used with keys of the given format.
    pub fn for_key_format(format: PublicKeyFormat) -> Option<Self> {
        match format {
            PublicKeyFormat::EcdsaP256 => Some(JwsAlgorithm::Es256),
            PublicKeyFormat::EcdsaP384 => Some(JwsAlgorithm::Es384),
            PublicKeyFormat::Rsa => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JwsAlgorithm::Es256 => "ES256",
            JwsAlgorithm::Es384 => "ES384",
        }
    }

    /// Returns the algorithm as `jsonwebtoken` knows it.
    pub fn jwt_algorithm(self) -> Algorithm {
        match self {
            JwsAlgorithm::Es256 => Algorithm::ES256,
            JwsAlgorithm::Es384 => Algorithm::ES384,
        }
    }
}

impl str::FromStr for JwsAlgorithm {
    type Err = JoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ES256" => Ok(JwsAlgorithm::Es256),
            "ES384" => Ok(JwsAlgorithm::Es384),
            _ => Err(JoseError::UnsupportedAlgorithm(s.into()))
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ JwtPolicy -----------------------------------------------------

/// The rules a token has to follow.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JwtPolicy {
    /// The accepted signature algorithms.
    algorithms: Vec<JwsAlgorithm>,

    /// The leeway when comparing times.
    clock_tolerance: Option<TimeDelta>,

    /// The maximum age of a token based on its `iat` claim.
    max_token_age: Option<TimeDelta>,
}

impl JwtPolicy {
    pub fn new(
        algorithms: Vec<JwsAlgorithm>,
        clock_tolerance: Option<TimeDelta>,
        max_token_age: Option<TimeDelta>,
    ) -> Self {
        JwtPolicy { algorithms, clock_tolerance, max_token_age }
    }

    pub fn algorithms(&self) -> &[JwsAlgorithm] {
        &self.algorithms
    }

    pub fn clock_tolerance(&self) -> Option<TimeDelta> {
        self.clock_tolerance
    }

    pub fn max_token_age(&self) -> Option<TimeDelta> {
        self.max_token_age
    }

    pub fn with_algorithms(mut self, algorithms: Vec<JwsAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn with_clock_tolerance(mut self, value: Option<TimeDelta>) -> Self {
        self.clock_tolerance = value;
        self
    }

    pub fn with_max_token_age(mut self, value: Option<TimeDelta>) -> Self {
        self.max_token_age = value;
        self
    }

    /// Drops the clock tolerance and maximum token age.
    ///
    /// This allows validating tokens that were stored for a while, such as
    /// attestations.
    pub fn allow_old_tokens(mut self) -> Self {
        self.clock_tolerance = None;
        self.max_token_age = None;
        self
    }

    /// Checks the time claims of a token.
    ///
    /// Claims are arbitrary numbers, so all arithmetic saturates.
    fn check_times(&self, claims: &Claims, now: Time) -> Result<(), JoseError> {
        let now = now.timestamp();
        let tolerance = self.clock_tolerance.map(|delta| {
            delta.num_seconds()
        }).unwrap_or(0);
        let earliest = now.saturating_sub(tolerance);
        let latest = now.saturating_add(tolerance);

        if let Some(exp) = numeric_claim(claims, "exp")? {
            if exp <= earliest {
                return Err(JoseError::Expired)
            }
        }
        if let Some(nbf) = numeric_claim(claims, "nbf")? {
            if nbf > latest {
                return Err(JoseError::NotYetValid)
            }
        }
        let iat = numeric_claim(claims, "iat")?;
        if let Some(max_age) = self.max_token_age {
            let iat = iat.ok_or(JoseError::MissingIssuedAt)?;
            if iat > latest {
                return Err(JoseError::NotYetValid)
            }
            if iat < earliest.saturating_sub(max_age.num_seconds()) {
                return Err(JoseError::TooOld)
            }
        }
        Ok(())
    }
}

impl Default for JwtPolicy {
    fn default() -> Self {
        JwtPolicy {
            algorithms: vec![JwsAlgorithm::Es384, JwsAlgorithm::Es256],
            clock_tolerance: Some(TimeDelta::seconds(30)),
            max_token_age: Some(TimeDelta::minutes(5)),
        }
    }
}

fn numeric_claim(
    claims: &Claims, name: &'static str
) -> Result<Option<i64>, JoseError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => {
            value.as_i64().or_else(|| {
                value.as_f64().map(|value| value as i64)
            }).map(Some).ok_or(JoseError::InvalidClaim(name))
        }
    }
}


//------------ Header --------------------------------------------------------

/// The protected header of a token.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Header {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// All other header parameters.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Header {
    pub fn new(alg: JwsAlgorithm) -> Self {
        Header {
            alg: alg.as_str().into(),
            typ: None,
            kid: None,
            x5u: None,
            nonce: None,
            other: Map::new(),
        }
    }

    pub fn with_x5u(mut self, x5u: impl Into<String>) -> Self {
        self.x5u = Some(x5u.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Returns the algorithm if it is one we support.
    pub fn algorithm(&self) -> Result<JwsAlgorithm, JoseError> {
        self.alg.parse()
    }

    /// Returns a header parameter by name.
    ///
    /// String values are returned as is, all others in their JSON form.
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "alg" => Some(self.alg.clone()),
            "typ" => self.typ.clone(),
            "kid" => self.kid.clone(),
            "x5u" => self.x5u.clone(),
            "nonce" => self.nonce.clone(),
            _ => {
                self.other.get(name).map(|value| match value {
                    Value::String(s) => s.clone(),
                    value => value.to_string()
                })
            }
        }
    }
}


//------------ Jwk -----------------------------------------------------------

/// A JSON Web Key for an elliptic curve.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// The private scalar. Only present in private keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
}

impl Jwk {
    /// Creates the public key for a public key.
    pub fn from_public_key(key: &PublicKey) -> Option<Self> {
        let crv = key.algorithm().curve()?;
        let bits = key.bits();
        if bits.first() != Some(&0x04) || bits.len() % 2 != 1 {
            return None
        }
        let (x, y) = bits[1..].split_at(bits.len() / 2);
        Some(Jwk {
            kty: "EC".into(),
            crv: Some(crv.into()),
            x: Some(base64::Jose.encode(x)),
            y: Some(base64::Jose.encode(y)),
            d: None,
            alg: JwsAlgorithm::for_key_format(
                key.algorithm()
            ).map(|alg| alg.as_str().into()),
        })
    }

    pub fn format(&self) -> Option<PublicKeyFormat> {
        if self.kty != "EC" {
            return None
        }
        PublicKeyFormat::from_curve(self.crv.as_deref()?)
    }

    /// Returns the algorithm to sign with.
    ///
    /// This is the `alg` parameter if present or else derived from the
    /// curve.
    pub fn algorithm(&self) -> Option<JwsAlgorithm> {
        match self.alg {
            Some(ref alg) => alg.parse().ok(),
            None => JwsAlgorithm::for_key_format(self.format()?)
        }
    }

    /// Creates a key pair from a private key.
    pub fn to_key_pair(&self) -> Result<KeyPair, SigningError> {
        let format = self.format().ok_or(SigningError::UnsupportedAlgorithm)?;
        KeyPair::from_ec_components(
            format,
            &Self::component(self.d.as_deref())?,
            &Self::component(self.x.as_deref())?,
            &Self::component(self.y.as_deref())?,
        )
    }

    fn component(value: Option<&str>) -> Result<Vec<u8>, SigningError> {
        base64::Jose.decode(
            value.ok_or(SigningError::InvalidKey)?
        ).map_err(|_| SigningError::InvalidKey)
    }
}


//------------ Signing and verification --------------------------------------

/// Signs a claims set producing a token in compact serialization.
///
/// The `alg` parameter of the header must match the key.
pub fn sign(
    header: &Header, claims: &Claims, key: &KeyPair
) -> Result<String, JoseError> {
    let alg = header.algorithm()?;
    if JwsAlgorithm::for_key_format(key.format()) != Some(alg) {
        return Err(JoseError::KeyMismatch)
    }
    let mut res = encode_json(header)?;
    res.push('.');
    res.push_str(&encode_json(claims)?);
    let signature = key.sign_fixed(res.as_bytes())?;
    res.push('.');
    res.push_str(&base64::Jose.encode(signature.as_ref()));
    Ok(res)
}

fn encode_json<T: Serialize>(value: &T) -> Result<String, JoseError> {
    serde_json::to_vec(value).map(|json| {
        base64::Jose.encode(&json)
    }).map_err(|_| JoseError::Malformed)
}

/// Returns the header of a token without verifying anything.
pub fn decode_header(token: &str) -> Result<Header, JoseError> {
    Parts::split(token)?.header()
}

/// Verifies a token and returns its header and claims.
///
/// The signature is checked with `key`, the algorithm against the policy,
/// and the time claims against `now` and the policy.
pub fn verify(
    token: &str, key: &PublicKey, policy: &JwtPolicy, now: Time,
) -> Result<(Header, Claims), JoseError> {
    let header = decode_header(token)?;
    let alg = header.algorithm()?;
    if !policy.algorithms.contains(&alg) {
        return Err(JoseError::AlgorithmNotAllowed(alg))
    }
    if JwsAlgorithm::for_key_format(key.algorithm()).is_none() {
        return Err(JoseError::KeyMismatch)
    }

    // The time claims are left to us.
    let mut validation = Validation::new(alg.jwt_algorithm());
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let claims = jsonwebtoken::decode::<Claims>(
        token, &DecodingKey::from_ec_der(key.bits()), &validation
    ).map_err(|err| match *err.kind() {
        ErrorKind::InvalidSignature => JoseError::BadSignature,
        ErrorKind::InvalidAlgorithm => JoseError::AlgorithmNotAllowed(alg),
        _ => JoseError::Malformed,
    })?.claims;
    policy.check_times(&claims, now)?;
    Ok((header, claims))
}

/// The header and payload of a token.
struct Parts<'a> {
    header: &'a str,
}

impl<'a> Parts<'a> {
    fn split(token: &'a str) -> Result<Self, JoseError> {
        let (signing_input, _signature) = token.rsplit_once(
            '.'
        ).ok_or(JoseError::Malformed)?;
        let (header, payload) = signing_input.split_once(
            '.'
        ).ok_or(JoseError::Malformed)?;
        if payload.contains('.') {
            return Err(JoseError::Malformed)
        }
        Ok(Parts { header })
    }

    fn header(&self) -> Result<Header, JoseError> {
        Self::decode_json(self.header)
    }

    fn decode_json<T: serde::de::DeserializeOwned>(
        part: &str
    ) -> Result<T, JoseError> {
        let json = Bytes::from(
            base64::Jose.decode(part).map_err(|_| JoseError::Malformed)?
        );
        serde_json::from_slice(&json).map_err(|_| JoseError::Malformed)
    }
}


//------------ JoseError -----------------------------------------------------

/// A token could not be created or verified.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JoseError {
    /// The token is not a well-formed compact JWS.
    Malformed,

    /// The algorithm is not one we support.
    UnsupportedAlgorithm(String),

    /// The algorithm is not allowed by policy.
    AlgorithmNotAllowed(JwsAlgorithm),

    /// The algorithm does not fit the key.
    KeyMismatch,

    /// The signature did not verify.
    BadSignature,

    /// The `exp` claim has passed.
    Expired,

    /// The `nbf` or `iat` claim lies in the future.
    NotYetValid,

    /// The token was issued too long ago.
    TooOld,

    /// The token has no `iat` claim but its age has to be checked.
    MissingIssuedAt,

    /// A time claim isn’t a number.
    InvalidClaim(&'static str),

    /// Signing failed.
    Signing(SigningError),
}

impl From<SigningError> for JoseError {
    fn from(err: SigningError) -> Self {
        JoseError::Signing(err)
    }
}

impl fmt::Display for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            JoseError::Malformed => f.write_str("malformed token"),
            JoseError::UnsupportedAlgorithm(ref alg) => {
                write!(f, "unsupported algorithm '{}'", alg)
            }
            JoseError::AlgorithmNotAllowed(alg) => {
                write!(f, "algorithm {} not allowed", alg)
            }
            JoseError::KeyMismatch => {
                f.write_str("algorithm does not match key")
            }
            JoseError::BadSignature => {
                f.write_str("signature verification failed")
            }
            JoseError::Expired => f.write_str("token has expired"),
            JoseError::NotYetValid => f.write_str("token is not valid yet"),
            JoseError::TooOld => f.write_str("token is too old"),
            JoseError::MissingIssuedAt => {
                f.write_str("token has no 'iat' claim")
            }
            JoseError::InvalidClaim(name) => {
                write!(f, "claim '{}' is not a number", name)
            }
            JoseError::Signing(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for JoseError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Claims {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object")
        }
    }

    fn now() -> Time {
        Time::from_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn sign_and_verify() {
        let key = KeyPair::generate(PublicKeyFormat::EcdsaP384).unwrap();
        let header = Header::new(JwsAlgorithm::Es384)
            .with_x5u("https://mir.example/chain.pem");
        let token = sign(
            &header,
            &claims(json!({"sub": "urn:mrn:mcp:id:x", "iat": 1_700_000_000})),
            &key
        ).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = decode_header(&token).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(
            decoded.get("x5u").as_deref(), Some("https://mir.example/chain.pem")
        );

        let (_, res) = verify(
            &token, &key.public_key(), &JwtPolicy::default(), now()
        ).unwrap();
        assert_eq!(res["sub"], "urn:mrn:mcp:id:x");

        let other = KeyPair::generate(PublicKeyFormat::EcdsaP384).unwrap();
        assert_eq!(
            verify(&token, &other.public_key(), &JwtPolicy::default(), now()),
            Err(JoseError::BadSignature)
        );
    }

    #[test]
    fn algorithm_policy() {
        let key = KeyPair::generate(PublicKeyFormat::EcdsaP256).unwrap();
        let token = sign(
            &Header::new(JwsAlgorithm::Es256),
            &claims(json!({"iat": 1_700_000_000})),
            &key
        ).unwrap();
        let policy = JwtPolicy::default().with_algorithms(
            vec![JwsAlgorithm::Es384]
        );
        assert_eq!(
            verify(&token, &key.public_key(), &policy, now()),
            Err(JoseError::AlgorithmNotAllowed(JwsAlgorithm::Es256))
        );
        assert_eq!(
            sign(&Header::new(JwsAlgorithm::Es384), &Claims::new(), &key),
            Err(JoseError::KeyMismatch)
        );
    }

    #[test]
    fn time_claims() {
        let key = KeyPair::generate(PublicKeyFormat::EcdsaP256).unwrap();
        let policy = JwtPolicy::default();
        let check = |value: Value| {
            let token = sign(
                &Header::new(JwsAlgorithm::Es256), &claims(value), &key
            ).unwrap();
            verify(&token, &key.public_key(), &policy, now()).map(|_| ())
        };
        let now = 1_700_000_000i64;

        assert_eq!(check(json!({"iat": now - 320})), Ok(()));
        assert_eq!(check(json!({"iat": now - 400})), Err(JoseError::TooOld));
        assert_eq!(check(json!({})), Err(JoseError::MissingIssuedAt));
        assert_eq!(
            check(json!({"iat": now + 60})), Err(JoseError::NotYetValid)
        );
        assert_eq!(
            check(json!({"iat": now, "exp": now - 60})),
            Err(JoseError::Expired)
        );
        assert_eq!(check(json!({"iat": now, "exp": now - 10})), Ok(()));
        assert_eq!(
            check(json!({"iat": "yesterday"})),
            Err(JoseError::InvalidClaim("iat"))
        );

        let old = JwtPolicy::default().allow_old_tokens();
        let token = sign(
            &Header::new(JwsAlgorithm::Es256), &Claims::new(), &key
        ).unwrap();
        assert!(verify(&token, &key.public_key(), &old, self::now()).is_ok());
    }

    #[test]
    fn extreme_time_claims() {
        let key = KeyPair::generate(PublicKeyFormat::EcdsaP256).unwrap();
        let check = |policy: &JwtPolicy, value: Value| {
            let token = sign(
                &Header::new(JwsAlgorithm::Es256), &claims(value), &key
            ).unwrap();
            verify(&token, &key.public_key(), policy, now()).map(|_| ())
        };
        let policy = JwtPolicy::default();
        let now = 1_700_000_000i64;

        assert_eq!(
            check(&policy, json!({"iat": i64::MIN})), Err(JoseError::TooOld)
        );
        assert_eq!(
            check(&policy, json!({"iat": i64::MAX})),
            Err(JoseError::NotYetValid)
        );
        assert_eq!(
            check(&policy, json!({"iat": now, "exp": i64::MIN})),
            Err(JoseError::Expired)
        );
        assert_eq!(
            check(&policy, json!({"iat": now, "nbf": i64::MAX})),
            Err(JoseError::NotYetValid)
        );
        assert_eq!(
            check(&policy, json!({"iat": now, "exp": i64::MAX})), Ok(())
        );

        let ageless = JwtPolicy::default().with_max_token_age(None);
        assert_eq!(check(&ageless, json!({"iat": i64::MIN})), Ok(()));
    }

    #[test]
    fn malformed() {
        assert_eq!(decode_header("abc"), Err(JoseError::Malformed));
        assert_eq!(decode_header("a.b.c.d"), Err(JoseError::Malformed));
        assert_eq!(decode_header("!!.b.c"), Err(JoseError::Malformed));
    }

    #[test]
    fn jwk_import() {
        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "EC",
            "crv": "P-384",
            "x": "pZG7RuaFd48AsKxx7ZymmfFAqfFXONGSBNoM9CZY0tLSlT6lgKO-yxpZbY5gdrxg",
            "y": "jtF8sCg9p8cvnnXvs2R_dDLjkDQIt9E8q_ltESqJc4FjjDBDXdYM1gjh72eKKRNR",
            "d": "peoNK4PHZvvXecFSMpa0WU7sLHEA3z0xn7zxtTwuQD41faPVFkFibI83MWWUHEJ2"
        })).unwrap();
        assert_eq!(jwk.algorithm(), Some(JwsAlgorithm::Es384));
        let key = jwk.to_key_pair().unwrap();
        let public = Jwk::from_public_key(&key.public_key()).unwrap();
        assert_eq!(public.x, jwk.x);
        assert_eq!(public.y, jwk.y);
        assert_eq!(public.d, None);
        assert_eq!(public.to_key_pair().err(), Some(SigningError::InvalidKey));
    }
}
