//! The policy applied when validating certificates and tokens.
//!
//! All validation functions take a [`ValidationOptions`] value. It carries
//! the identity of the relying party, the set of explicitly trusted
//! certificates, the status cache, the token policy, and the
//! collaborators used to fetch documents and ask OCSP responders.
//!
//! Options are cheap to clone. The trust set and cache are shared between
//! clones so that a service can keep one set of options around and hand
//! out copies.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use chrono::TimeDelta;
use dashmap::DashMap;
use crate::attestation::ClaimKind;
use crate::cache::{ExpiringCache, Horizon};
use crate::certificate::{Certificate, Fingerprint};
use crate::fetch::{Fetch, RewriteRules, Rewriting};
use crate::jose::JwtPolicy;
use crate::mrn::Mrn;
use crate::status::{NoOcsp, OcspClient, Status};


//------------ CacheKind -----------------------------------------------------

/// The kinds of cached statuses.
///
/// Each kind has its own horizon.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CacheKind {
    /// The status of an end entity certificate.
    Certificate,

    /// The status of a CA certificate.
    Mir,

    /// An explicitly trusted certificate.
    Trusted,
}

impl CacheKind {
    /// Returns the kind for caching a status of a certificate.
    pub fn for_status(certificate: &Certificate, status: Status) -> Self {
        if status == Status::Trusted {
            CacheKind::Trusted
        }
        else if certificate.is_ca() {
            CacheKind::Mir
        }
        else {
            CacheKind::Certificate
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheKind::Certificate => "certificate",
            CacheKind::Mir => "mir",
            CacheKind::Trusted => "trusted",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ StatusCache ---------------------------------------------------

/// A cache of certificate statuses keyed by fingerprint.
#[derive(Debug)]
pub struct StatusCache {
    cache: ExpiringCache<Fingerprint, Status>,
    certificate: Horizon,
    mir: Horizon,
    trusted: Horizon,
}

impl StatusCache {
    /// Creates a cache with the default horizons.
    ///
    /// These are 12 hours for end entity certificates and 48 hours for
    /// CA and trusted certificates.
    pub fn new() -> Self {
        Self::with_horizons(
            ExpiringCache::<Fingerprint, Status>::DEFAULT_MAX_ENTRIES,
            TimeDelta::hours(12).into(),
            TimeDelta::hours(48).into(),
            TimeDelta::hours(48).into(),
        )
    }

    pub fn with_horizons(
        max_entries: usize,
        certificate: Horizon,
        mir: Horizon,
        trusted: Horizon,
    ) -> Self {
        StatusCache {
            cache: ExpiringCache::with_options(max_entries, Horizon::default()),
            certificate, mir, trusted
        }
    }

    pub fn horizon(&self, kind: CacheKind) -> &Horizon {
        match kind {
            CacheKind::Certificate => &self.certificate,
            CacheKind::Mir => &self.mir,
            CacheKind::Trusted => &self.trusted,
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Status> {
        self.cache.get(fingerprint)
    }

    /// Caches a status using the horizon of the given kind.
    pub fn set(
        &self, fingerprint: Fingerprint, status: Status, kind: CacheKind
    ) -> Status {
        self.cache.insert(fingerprint, status, self.horizon(kind).expires())
    }

    pub fn remove(&self, fingerprint: &Fingerprint) {
        self.cache.remove(fingerprint);
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}


//------------ TrustSet ------------------------------------------------------

/// The set of explicitly trusted certificates.
///
/// Certificates are identified by their fingerprint. The set also keeps
/// the MRN of each certificate so it can be asked whether an entity is
/// trusted.
#[derive(Debug, Default)]
pub struct TrustSet {
    entries: DashMap<Fingerprint, Mrn>,
}

impl TrustSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust(&self, certificate: &Certificate) {
        self.insert(certificate.fingerprint(), certificate.uid().clone())
    }

    pub fn insert(&self, fingerprint: Fingerprint, uid: Mrn) {
        self.entries.insert(fingerprint, uid);
    }

    pub fn no_longer_trust(&self, certificate: &Certificate) {
        self.entries.remove(&certificate.fingerprint());
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.contains_key(fingerprint)
    }

    /// Returns whether a fingerprint or MRN is trusted.
    ///
    /// The value may be a fingerprint in colon-separated hex, an x5t#S256
    /// thumbprint, or the MRN of a trusted certificate.
    pub fn is_trusted(&self, fingerprint_or_uid: &str) -> bool {
        let fingerprint = fingerprint_or_uid.parse::<Fingerprint>().ok();
        let fingerprint = fingerprint.or_else(|| {
            Fingerprint::from_x5t256(fingerprint_or_uid)
        });
        if let Some(fingerprint) = fingerprint {
            if self.contains(&fingerprint) {
                return true
            }
        }
        self.entries.iter().any(|item| *item.value() == fingerprint_or_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}


//------------ AttestedTrust -------------------------------------------------

/// Something that decides whether third parties vouch for a root.
///
/// A chain may end in a certificate that isn’t trusted directly but for
/// which trusted entities have issued attestations. There is no standard
/// way yet to find these. Without a value of this trait in the options,
/// such roots are not trusted.
#[async_trait]
pub trait AttestedTrust: Send + Sync {
    async fn vouches_for(
        &self, root: &Certificate, options: &ValidationOptions
    ) -> bool;
}


//------------ ValidationOptions ---------------------------------------------

/// The options for validating certificates and tokens.
#[derive(Clone)]
pub struct ValidationOptions {
    /// The MRN of the service doing the validation.
    spid: Mrn,

    trusted: Arc<TrustSet>,
    cache: Option<Arc<StatusCache>>,
    jwt: JwtPolicy,

    /// Accept untrusted self-declared CA roots.
    allow_unknown_mir: bool,

    /// Ask the attested trust delegate about untrusted roots.
    trust_attested: bool,

    /// The claims that make an attestation count.
    trusted_attestations: Vec<ClaimKind>,

    /// Reject certificates whose status is unknown.
    require_status: bool,

    /// Attestations must bind their subject to a certificate.
    strict: bool,

    ocsp: Arc<dyn OcspClient>,
    ocsp_timeout: Duration,
    fetcher: Arc<dyn Fetch>,
    fetch_timeout: Duration,
    attested_trust: Option<Arc<dyn AttestedTrust>>,
}

impl ValidationOptions {
    pub const DEFAULT_OCSP_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates default options for the given service.
    pub fn new(spid: Mrn) -> Self {
        ValidationOptions {
            spid,
            trusted: Default::default(),
            cache: Some(Default::default()),
            jwt: JwtPolicy::default(),
            allow_unknown_mir: false,
            trust_attested: true,
            trusted_attestations: vec![
                ClaimKind::MirEndorsed, ClaimKind::MirOk
            ],
            require_status: false,
            strict: true,
            ocsp: Arc::new(NoOcsp),
            ocsp_timeout: Self::DEFAULT_OCSP_TIMEOUT,
            fetcher: default_fetcher(),
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
            attested_trust: None,
        }
    }

    pub fn spid(&self) -> &Mrn {
        &self.spid
    }

    pub fn trusted(&self) -> &TrustSet {
        &self.trusted
    }

    pub fn cache(&self) -> Option<&StatusCache> {
        self.cache.as_deref()
    }

    pub fn jwt(&self) -> &JwtPolicy {
        &self.jwt
    }

    pub fn allow_unknown_mir(&self) -> bool {
        self.allow_unknown_mir
    }

    pub fn trust_attested(&self) -> bool {
        self.trust_attested
    }

    pub fn trusted_attestations(&self) -> &[ClaimKind] {
        &self.trusted_attestations
    }

    pub fn require_status(&self) -> bool {
        self.require_status
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn ocsp(&self) -> &dyn OcspClient {
        self.ocsp.as_ref()
    }

    pub fn ocsp_timeout(&self) -> Duration {
        self.ocsp_timeout
    }

    pub fn fetcher(&self) -> &dyn Fetch {
        self.fetcher.as_ref()
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    pub fn attested_trust(&self) -> Option<&dyn AttestedTrust> {
        self.attested_trust.as_deref()
    }
}

/// # Trust
///
impl ValidationOptions {
    /// Adds a certificate to the trusted set.
    pub fn trust(&self, certificate: &Certificate) {
        self.trusted.trust(certificate)
    }

    /// Removes a certificate from the trusted set.
    ///
    /// A cached status of the certificate is dropped, too.
    pub fn no_longer_trust(&self, certificate: &Certificate) {
        self.trusted.no_longer_trust(certificate);
        if let Some(cache) = self.cache() {
            cache.remove(&certificate.fingerprint())
        }
    }

    /// Returns whether a fingerprint or MRN is explicitly trusted.
    pub fn is_trusted(&self, fingerprint_or_uid: &str) -> bool {
        self.trusted.is_trusted(fingerprint_or_uid)
    }
}

/// # Changing Options
///
impl ValidationOptions {
    pub fn with_spid(mut self, spid: Mrn) -> Self {
        self.spid = spid;
        self
    }

    pub fn with_trusted(mut self, trusted: Arc<TrustSet>) -> Self {
        self.trusted = trusted;
        self
    }

    pub fn with_cache(mut self, cache: Arc<StatusCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn with_jwt(mut self, jwt: JwtPolicy) -> Self {
        self.jwt = jwt;
        self
    }

    /// Drops the time limits for tokens.
    pub fn allow_old_tokens(mut self) -> Self {
        self.jwt = self.jwt.allow_old_tokens();
        self
    }

    pub fn with_allow_unknown_mir(mut self, value: bool) -> Self {
        self.allow_unknown_mir = value;
        self
    }

    pub fn with_trust_attested(mut self, value: bool) -> Self {
        self.trust_attested = value;
        self
    }

    pub fn with_trusted_attestations(mut self, claims: Vec<ClaimKind>) -> Self {
        self.trusted_attestations = claims;
        self
    }

    pub fn with_require_status(mut self, value: bool) -> Self {
        self.require_status = value;
        self
    }

    pub fn with_strict(mut self, value: bool) -> Self {
        self.strict = value;
        self
    }

    pub fn with_ocsp(mut self, ocsp: Arc<dyn OcspClient>) -> Self {
        self.ocsp = ocsp;
        self
    }

    pub fn with_ocsp_timeout(mut self, timeout: Duration) -> Self {
        self.ocsp_timeout = timeout;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Rewrites URLs with the given rules before passing them on to the
    /// current fetcher.
    pub fn with_rewrite_rules(mut self, rules: RewriteRules) -> Self {
        self.fetcher = Arc::new(Rewriting::new(self.fetcher, rules));
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_attested_trust(
        mut self, delegate: Arc<dyn AttestedTrust>
    ) -> Self {
        self.attested_trust = Some(delegate);
        self
    }
}

impl fmt::Debug for ValidationOptions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ValidationOptions")
            .field("spid", &self.spid)
            .field("trusted", &self.trusted.len())
            .field("cache", &self.cache)
            .field("jwt", &self.jwt)
            .field("allow_unknown_mir", &self.allow_unknown_mir)
            .field("trust_attested", &self.trust_attested)
            .field("trusted_attestations", &self.trusted_attestations)
            .field("require_status", &self.require_status)
            .field("strict", &self.strict)
            .field("ocsp_timeout", &self.ocsp_timeout)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("attested_trust", &self.attested_trust.is_some())
            .finish()
    }
}

#[cfg(feature = "http")]
fn default_fetcher() -> Arc<dyn Fetch> {
    Arc::new(crate::fetch::HttpFetcher::new())
}

#[cfg(not(feature = "http"))]
fn default_fetcher() -> Arc<dyn Fetch> {
    Arc::new(crate::fetch::MemoryFetcher::new())
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use chrono::TimeDelta;
    use crate::cert::issuer::Issuer;
    use crate::x509::Validity;
    use super::*;

    fn root() -> Issuer {
        Issuer::root(
            &Mrn::parse("urn:mrn:mcp:id:mir").unwrap(),
            Validity::from_duration(TimeDelta::days(1))
        ).unwrap()
    }

    #[test]
    fn defaults() {
        let options = ValidationOptions::new(
            Mrn::parse("urn:mrn:mcp:id:mir:sp").unwrap()
        );
        assert_eq!(options.jwt(), &JwtPolicy::default());
        assert!(options.trust_attested());
        assert!(!options.allow_unknown_mir());
        assert!(options.cache().is_some());

        let old = options.clone().allow_old_tokens();
        assert_eq!(old.jwt().clock_tolerance(), None);
        assert_eq!(old.jwt().max_token_age(), None);
        assert!(options.jwt().max_token_age().is_some());
    }

    #[test]
    fn trust_is_shared() {
        let root = root();
        let options = ValidationOptions::new(
            Mrn::parse("urn:mrn:mcp:id:mir:sp").unwrap()
        );
        let copy = options.clone();
        options.trust(root.certificate());
        assert!(copy.is_trusted("urn:mrn:mcp:id:mir"));
        assert!(copy.is_trusted(&root.certificate().fingerprint().to_string()));
        assert!(copy.is_trusted(&root.certificate().x5t256()));
        assert!(!copy.is_trusted("urn:mrn:mcp:id:other"));

        copy.cache().unwrap().set(
            root.certificate().fingerprint(), Status::Trusted,
            CacheKind::Trusted
        );
        copy.no_longer_trust(root.certificate());
        assert!(!options.is_trusted("urn:mrn:mcp:id:mir"));
        assert!(options.cache().unwrap().is_empty());
    }

    #[test]
    fn cache_kinds() {
        let root = root();
        let leaf = root.subordinate(
            &Mrn::parse("urn:mrn:mcp:id:mir:leaf").unwrap(), false,
            Validity::from_duration(TimeDelta::days(1)), |_| { }
        ).unwrap();
        assert_eq!(
            CacheKind::for_status(root.certificate(), Status::Trusted),
            CacheKind::Trusted
        );
        assert_eq!(
            CacheKind::for_status(root.certificate(), Status::Good),
            CacheKind::Mir
        );
        assert_eq!(
            CacheKind::for_status(leaf.certificate(), Status::Good),
            CacheKind::Certificate
        );

        let cache = StatusCache::new();
        let fingerprint = leaf.certificate().fingerprint();
        cache.set(fingerprint, Status::Good, CacheKind::Certificate);
        assert_eq!(cache.get(&fingerprint), Some(Status::Good));
        match *cache.horizon(CacheKind::Certificate) {
            Horizon::After(delta) => assert_eq!(delta, TimeDelta::hours(12)),
            _ => panic!("unexpected horizon")
        }
    }
}
