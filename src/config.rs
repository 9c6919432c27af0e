//! Validation options in JSON.
//!
//! A [`ValidationConfig`] describes validation options in a form that can
//! be read from a JSON file. Durations are given in human readable form,
//! such as `"12 hours"`. All fields but `spid` are optional.
//!
//! ```json
//! {
//!     "spid": "urn:mrn:mcp:id:aboamare:test:sp",
//!     "trusted": {
//!         "3A:F2:...": "urn:mrn:mcp:id:aboamare"
//!     },
//!     "cache": {
//!         "certificate": "12 hours",
//!         "mir": "48 hours",
//!         "trusted": "48 hours"
//!     },
//!     "jwt": {
//!         "algorithms": ["ES384", "ES256"],
//!         "clockTolerance": "30 seconds",
//!         "maxTokenAge": "5 minutes"
//!     },
//!     "allowUnknownMir": false,
//!     "trustAttested": true
//! }
//! ```

use std::{error, fmt, io};
use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use crate::attestation::ClaimKind;
use crate::cache::Horizon;
use crate::certificate::{Fingerprint, FingerprintError};
use crate::fetch::RewriteRules;
use crate::jose::{JwsAlgorithm, JwtPolicy};
use crate::mrn::Mrn;
use crate::options::{StatusCache, TrustSet, ValidationOptions};
use crate::util::duration::{self, DurationError};
use crate::x509::Time;


//------------ ValidationConfig ----------------------------------------------

/// The configuration of validation options.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ValidationConfig {
    /// The MRN of the service doing the validation.
    pub spid: Mrn,

    /// Trusted certificates as a map from fingerprint to MRN.
    #[serde(default)]
    pub trusted: BTreeMap<String, Mrn>,

    /// The status cache. If `null`, there is no cache.
    #[serde(default = "CacheConfig::some")]
    pub cache: Option<CacheConfig>,

    #[serde(default)]
    pub jwt: JwtConfig,

    #[serde(default)]
    pub allow_unknown_mir: bool,

    #[serde(default = "default_true")]
    pub trust_attested: bool,

    #[serde(default = "default_trusted_attestations")]
    pub trusted_attestations: Vec<ClaimKind>,

    #[serde(default)]
    pub require_status: bool,

    #[serde(default = "default_true")]
    pub strict: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocsp_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_timeout: Option<String>,

    /// URL rewrite rules for fetching.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rewrite: Vec<RewriteConfig>,
}

impl ValidationConfig {
    /// Creates the default configuration for a service.
    pub fn new(spid: Mrn) -> Self {
        ValidationConfig {
            spid,
            trusted: BTreeMap::new(),
            cache: CacheConfig::some(),
            jwt: JwtConfig::default(),
            allow_unknown_mir: false,
            trust_attested: true,
            trusted_attestations: default_trusted_attestations(),
            require_status: false,
            strict: true,
            ocsp_timeout: None,
            fetch_timeout: None,
            rewrite: Vec::new(),
        }
    }

    pub fn from_reader(reader: impl io::Read) -> Result<Self, ConfigError> {
        serde_json::from_reader(reader).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Returns the rewrite rules.
    pub fn rewrite_rules(&self) -> Result<RewriteRules, ConfigError> {
        let mut rules = RewriteRules::new();
        for rule in &self.rewrite {
            rules.add_rule(
                &rule.pattern, rule.replacement.clone()
            ).map_err(|err| ConfigError::Regex(err.to_string()))?;
        }
        Ok(rules)
    }
}


//------------ CacheConfig ---------------------------------------------------

/// The configuration of the status cache.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_max_entries")]
    pub max_entries: usize,

    #[serde(default = "CacheConfig::default_certificate")]
    pub certificate: String,

    #[serde(default = "CacheConfig::default_mir")]
    pub mir: String,

    #[serde(default = "CacheConfig::default_trusted")]
    pub trusted: String,
}

impl CacheConfig {
    fn some() -> Option<Self> {
        Some(Self::default())
    }

    fn default_max_entries() -> usize {
        1000
    }

    fn default_certificate() -> String {
        "12 hours".into()
    }

    fn default_mir() -> String {
        "48 hours".into()
    }

    fn default_trusted() -> String {
        "48 hours".into()
    }

    /// Creates the cache.
    ///
    /// Horizons that reach beyond the latest representable time are
    /// rejected.
    pub fn to_cache(&self) -> Result<StatusCache, ConfigError> {
        Ok(StatusCache::with_horizons(
            self.max_entries,
            parse_horizon(&self.certificate)?,
            parse_horizon(&self.mir)?,
            parse_horizon(&self.trusted)?,
        ))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: Self::default_max_entries(),
            certificate: Self::default_certificate(),
            mir: Self::default_mir(),
            trusted: Self::default_trusted(),
        }
    }
}


//------------ JwtConfig -----------------------------------------------------

/// The configuration of the token policy.
///
/// If a duration is `null`, the corresponding check is disabled.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct JwtConfig {
    #[serde(default = "JwtConfig::default_algorithms")]
    pub algorithms: Vec<JwsAlgorithm>,

    #[serde(default = "JwtConfig::default_clock_tolerance")]
    pub clock_tolerance: Option<String>,

    #[serde(default = "JwtConfig::default_max_token_age")]
    pub max_token_age: Option<String>,
}

impl JwtConfig {
    fn default_algorithms() -> Vec<JwsAlgorithm> {
        vec![JwsAlgorithm::Es384, JwsAlgorithm::Es256]
    }

    fn default_clock_tolerance() -> Option<String> {
        Some("30 seconds".into())
    }

    fn default_max_token_age() -> Option<String> {
        Some("5 minutes".into())
    }

    pub fn to_policy(&self) -> Result<JwtPolicy, ConfigError> {
        Ok(JwtPolicy::new(
            self.algorithms.clone(),
            parse_opt_duration(self.clock_tolerance.as_deref())?,
            parse_opt_duration(self.max_token_age.as_deref())?,
        ))
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtConfig {
            algorithms: Self::default_algorithms(),
            clock_tolerance: Self::default_clock_tolerance(),
            max_token_age: Self::default_max_token_age(),
        }
    }
}


//------------ RewriteConfig -------------------------------------------------

/// A URL rewrite rule.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RewriteConfig {
    pub pattern: String,
    pub replacement: String,
}


//------------ ValidationOptions::from_config --------------------------------

impl ValidationOptions {
    /// Creates options from a configuration.
    ///
    /// Collaborators such as the fetcher and OCSP client stay at their
    /// defaults and can be changed afterwards.
    pub fn from_config(config: &ValidationConfig) -> Result<Self, ConfigError> {
        let trusted = TrustSet::new();
        for (fingerprint, uid) in &config.trusted {
            trusted.insert(fingerprint.parse::<Fingerprint>()?, uid.clone());
        }
        let mut res = ValidationOptions::new(config.spid.clone())
            .with_trusted(Arc::new(trusted))
            .with_jwt(config.jwt.to_policy()?)
            .with_allow_unknown_mir(config.allow_unknown_mir)
            .with_trust_attested(config.trust_attested)
            .with_trusted_attestations(config.trusted_attestations.clone())
            .with_require_status(config.require_status)
            .with_strict(config.strict);
        res = match config.cache {
            Some(ref cache) => res.with_cache(Arc::new(cache.to_cache()?)),
            None => res.without_cache(),
        };
        if let Some(timeout) = config.ocsp_timeout.as_deref() {
            res = res.with_ocsp_timeout(parse_std_duration(timeout)?);
        }
        if let Some(timeout) = config.fetch_timeout.as_deref() {
            res = res.with_fetch_timeout(parse_std_duration(timeout)?);
        }
        let rules = config.rewrite_rules()?;
        if !rules.is_empty() {
            res = res.with_rewrite_rules(rules);
        }
        Ok(res)
    }
}


//------------ Helpers -------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_trusted_attestations() -> Vec<ClaimKind> {
    vec![ClaimKind::MirEndorsed, ClaimKind::MirOk]
}

fn parse_opt_duration(
    value: Option<&str>
) -> Result<Option<TimeDelta>, ConfigError> {
    value.map(duration::parse).transpose().map_err(Into::into)
}

fn parse_horizon(value: &str) -> Result<Horizon, ConfigError> {
    let delta = duration::parse(value)?;
    if Time::now().checked_add(delta).is_none() {
        return Err(ConfigError::Duration(DurationError::new(value)))
    }
    Ok(Horizon::After(delta))
}

fn parse_std_duration(
    value: &str
) -> Result<std::time::Duration, ConfigError> {
    let delta = duration::parse(value)?;
    delta.to_std().map_err(|_| {
        ConfigError::Duration(DurationError::new(value))
    })
}


//------------ ConfigError ---------------------------------------------------

/// The configuration could not be used.
#[derive(Debug)]
pub enum ConfigError {
    /// The JSON was not valid.
    Json(serde_json::Error),

    /// A duration was not valid.
    Duration(DurationError),

    /// A fingerprint of a trusted certificate was not valid.
    Fingerprint(FingerprintError),

    /// A rewrite pattern was not a valid regular expression.
    Regex(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err)
    }
}

impl From<DurationError> for ConfigError {
    fn from(err: DurationError) -> Self {
        ConfigError::Duration(err)
    }
}

impl From<FingerprintError> for ConfigError {
    fn from(err: FingerprintError) -> Self {
        ConfigError::Fingerprint(err)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ConfigError::Json(ref err) => err.fmt(f),
            ConfigError::Duration(ref err) => err.fmt(f),
            ConfigError::Fingerprint(ref err) => err.fmt(f),
            ConfigError::Regex(ref err) => {
                write!(f, "invalid rewrite pattern: {}", err)
            }
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            ConfigError::Json(ref err) => Some(err),
            ConfigError::Duration(ref err) => Some(err),
            ConfigError::Fingerprint(ref err) => Some(err),
            ConfigError::Regex(_) => None,
        }
    }
}


//============ Testing =======================================================
