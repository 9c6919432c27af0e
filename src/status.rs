//! Determining the status of a certificate.
//!
//! The status of a certificate is resolved by asking, in order, the status
//! cache, the OCSP responder of the certificate, and the set of explicitly
//! trusted certificates. The first definite answer wins. If nobody knows
//! anything, the status is [`Status::Unknown`].
//!
//! Failures of the OCSP responder are not errors. They just mean that the
//! status stays unknown.

use std::{error, fmt};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, warn};
use crate::cache::Expires;
use crate::certificate::{Certificate, Fingerprint};
use crate::mrn::Mrn;
use crate::options::{CacheKind, ValidationOptions};
use crate::x509::Time;


//------------ Status --------------------------------------------------------

/// The status of a certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// The issuer of the certificate vouches for it.
    Good,

    /// The certificate has been revoked, possibly at the given time.
    Revoked(Option<Time>),

    /// The certificate is explicitly trusted.
    Trusted,

    /// Nothing is known about the certificate.
    Unknown,
}

impl Status {
    /// Returns whether this is an answer worth remembering.
    pub fn is_definite(self) -> bool {
        !matches!(self, Status::Unknown)
    }

    pub fn is_revoked(self) -> bool {
        matches!(self, Status::Revoked(_))
    }
}

impl Expires for Status { }

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Status::Good => f.write_str("good"),
            Status::Revoked(Some(when)) => write!(f, "revoked at {}", when),
            Status::Revoked(None) => f.write_str("revoked"),
            Status::Trusted => f.write_str("trusted"),
            Status::Unknown => f.write_str("unknown"),
        }
    }
}


//------------ Source --------------------------------------------------------

/// Where a status came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Source {
    Cache,
    Ocsp,
    TrustList,
    None,
}


//------------ Resolution ----------------------------------------------------

/// The outcome of resolving the status of a certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resolution {
    pub status: Status,
    pub source: Source,
}

impl Resolution {
    fn new(status: Status, source: Source) -> Self {
        Resolution { status, source }
    }
}


//------------ resolve and cache_as ------------------------------------------

/// Resolves the status of a certificate.
///
/// Statuses from OCSP are not cached here. The caller knows best whether
/// they should be.
pub async fn resolve(
    options: &ValidationOptions, certificate: &Certificate
) -> Resolution {
    let fingerprint = certificate.fingerprint();
    if let Some(cache) = options.cache() {
        if let Some(status) = cache.get(&fingerprint) {
            return Resolution::new(status, Source::Cache)
        }
    }

    let status = tokio::time::timeout(
        options.ocsp_timeout(),
        options.ocsp().get_status(options.spid(), certificate)
    ).await;
    match status {
        Ok(Ok(status @ (Status::Good | Status::Revoked(_)))) => {
            return Resolution::new(status, Source::Ocsp)
        }
        Ok(Ok(_)) => { }
        Ok(Err(err)) => {
            warn!(
                "OCSP status for {} ({}) failed: {}",
                certificate.uid(), fingerprint, err
            );
        }
        Err(_) => {
            warn!(
                "OCSP status for {} ({}) timed out.",
                certificate.uid(), fingerprint
            );
        }
    }

    if options.trusted().contains(&fingerprint) {
        cache_as(options, certificate, Status::Trusted);

        // Trust may have been withdrawn meanwhile.
        if !options.trusted().contains(&fingerprint) {
            if let Some(cache) = options.cache() {
                cache.remove(&fingerprint)
            }
        }
        return Resolution::new(Status::Trusted, Source::TrustList)
    }

    Resolution::new(Status::Unknown, Source::None)
}

/// Adds the status of a certificate to the cache, if there is one.
///
/// The horizon depends on the kind of certificate and status.
pub fn cache_as(
    options: &ValidationOptions, certificate: &Certificate, status: Status
) {
    if let Some(cache) = options.cache() {
        let kind = CacheKind::for_status(certificate, status);
        debug!(
            "Caching status {} of {} as {}.", status, certificate.uid(), kind
        );
        cache.set(certificate.fingerprint(), status, kind);
    }
}


//------------ OcspClient ----------------------------------------------------

/// Something that can ask an OCSP responder.
#[async_trait]
pub trait OcspClient: Send + Sync {
    /// Returns the status of a certificate.
    ///
    /// `spid` is the MRN of the service asking.
    async fn get_status(
        &self, spid: &Mrn, certificate: &Certificate
    ) -> Result<Status, OcspError>;
}


//------------ NoOcsp --------------------------------------------------------

/// An OCSP client that never knows anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOcsp;

#[async_trait]
impl OcspClient for NoOcsp {
    async fn get_status(
        &self, _spid: &Mrn, _certificate: &Certificate
    ) -> Result<Status, OcspError> {
        Ok(Status::Unknown)
    }
}


//------------ MemoryOcsp ----------------------------------------------------

/// An OCSP client answering from a table.
///
/// Certificates not in the table have unknown status.
#[derive(Debug, Default)]
pub struct MemoryOcsp {
    statuses: DashMap<Fingerprint, Result<Status, OcspError>>,
}

impl MemoryOcsp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, certificate: &Certificate, status: Status) {
        self.statuses.insert(certificate.fingerprint(), Ok(status));
    }

    /// Makes requests for the certificate fail.
    pub fn fail(&self, certificate: &Certificate, err: OcspError) {
        self.statuses.insert(certificate.fingerprint(), Err(err));
    }

    pub fn remove(&self, certificate: &Certificate) {
        self.statuses.remove(&certificate.fingerprint());
    }
}

#[async_trait]
impl OcspClient for MemoryOcsp {
    async fn get_status(
        &self, _spid: &Mrn, certificate: &Certificate
    ) -> Result<Status, OcspError> {
        match self.statuses.get(&certificate.fingerprint()) {
            Some(item) => item.value().clone(),
            None => Ok(Status::Unknown)
        }
    }
}


//------------ OcspError -----------------------------------------------------

/// Asking an OCSP responder failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OcspError(String);

impl OcspError {
    pub fn new(reason: impl Into<String>) -> Self {
        OcspError(reason.into())
    }
}

impl fmt::Display for OcspError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl error::Error for OcspError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;
    use chrono::TimeDelta;
    use crate::cert::issuer::Issuer;
    use crate::x509::Validity;
    use super::*;

    struct SlowOcsp;

    #[async_trait]
    impl OcspClient for SlowOcsp {
        async fn get_status(
            &self, _spid: &Mrn, _certificate: &Certificate
        ) -> Result<Status, OcspError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Status::Good)
        }
    }

    fn issuer() -> Issuer {
        Issuer::root(
            &Mrn::parse("urn:mrn:mcp:id:mir").unwrap(),
            Validity::from_duration(TimeDelta::days(1))
        ).unwrap()
    }

    fn options() -> ValidationOptions {
        ValidationOptions::new(Mrn::parse("urn:mrn:mcp:id:mir:sp").unwrap())
    }

    #[tokio::test]
    async fn resolution_order() {
        let root = issuer();
        let cert = root.certificate();
        let ocsp = Arc::new(MemoryOcsp::new());
        let options = options().with_ocsp(ocsp.clone());

        assert_eq!(
            resolve(&options, cert).await,
            Resolution::new(Status::Unknown, Source::None)
        );

        ocsp.set(cert, Status::Good);
        assert_eq!(
            resolve(&options, cert).await,
            Resolution::new(Status::Good, Source::Ocsp)
        );
        assert!(options.cache().unwrap().get(&cert.fingerprint()).is_none());

        ocsp.remove(cert);
        options.trust(cert);
        assert_eq!(
            resolve(&options, cert).await,
            Resolution::new(Status::Trusted, Source::TrustList)
        );
        assert_eq!(
            resolve(&options, cert).await,
            Resolution::new(Status::Trusted, Source::Cache)
        );
    }

    #[tokio::test]
    async fn ocsp_failures_are_unknown() {
        let root = issuer();
        let ocsp = Arc::new(MemoryOcsp::new());
        ocsp.fail(root.certificate(), OcspError::new("responder down"));
        let options = options().with_ocsp(ocsp);
        assert_eq!(
            resolve(&options, root.certificate()).await.status,
            Status::Unknown
        );

        let options = self::options()
            .with_ocsp(Arc::new(SlowOcsp))
            .with_ocsp_timeout(Duration::from_millis(10));
        assert_eq!(
            resolve(&options, root.certificate()).await.status,
            Status::Unknown
        );
    }

    #[tokio::test]
    async fn no_cache() {
        let root = issuer();
        let options = options().without_cache();
        options.trust(root.certificate());
        assert_eq!(
            resolve(&options, root.certificate()).await.source,
            Source::TrustList
        );
        assert_eq!(
            resolve(&options, root.certificate()).await.source,
            Source::TrustList
        );
    }
}
