//! Validating certificate chains.
//!
//! A chain is a slice of certificates starting with the end entity and
//! ending with the certificate of a Maritime Identity Registry (MIR). Each
//! certificate has to be issued by the one following it. The last
//! certificate, the root, has to be trusted. This is the case if it is in
//! the trust set of the options or, if allowed, if it is a CA certificate
//! or third parties vouch for it.
//!
//! Each certificate passes through a number of checks in order. These are
//! traced at debug level as [`ValidationState`]s. Validation of a chain
//! stops at the first rejected certificate.

use std::fmt;
use bytes::Bytes;
use log::debug;
use crate::certificate::Certificate;
use crate::error::CertificateError;
use crate::mrn::Mrn;
use crate::options::ValidationOptions;
use crate::status::{self, Source, Status};
use crate::x509::Time;


//------------ ValidationState -----------------------------------------------

/// The steps of validating a certificate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationState {
    /// Nothing has been checked yet.
    Unchecked,

    /// The certificate has the expected MRN.
    UidMatched,

    /// The certificate is valid at the validation time.
    TimeValid,

    /// The MRN of the certificate fits its issuer.
    IssuerLinked,

    /// The status of the certificate is known.
    StatusResolved(Status),

    /// The certificate is valid.
    Accepted,

    /// The certificate is not valid.
    Rejected(CertificateError),
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ValidationState::Unchecked => f.write_str("unchecked"),
            ValidationState::UidMatched => f.write_str("uid matched"),
            ValidationState::TimeValid => f.write_str("time valid"),
            ValidationState::IssuerLinked => f.write_str("issuer linked"),
            ValidationState::StatusResolved(status) => {
                write!(f, "status {}", status)
            }
            ValidationState::Accepted => f.write_str("accepted"),
            ValidationState::Rejected(ref err) => {
                write!(f, "rejected: {}", err)
            }
        }
    }
}


//------------ Validation ----------------------------------------------------

/// The validation of a single certificate.
struct Validation<'a> {
    cert: &'a Certificate,
    state: ValidationState,
}

impl<'a> Validation<'a> {
    fn new(cert: &'a Certificate) -> Self {
        let res = Validation { cert, state: ValidationState::Unchecked };
        res.trace();
        res
    }

    fn advance(&mut self, state: ValidationState) {
        self.state = state;
        self.trace();
    }

    fn accept(mut self) -> Result<(), CertificateError> {
        self.advance(ValidationState::Accepted);
        Ok(())
    }

    fn reject(mut self, err: CertificateError) -> Result<(), CertificateError> {
        self.advance(ValidationState::Rejected(err.clone()));
        Err(err)
    }

    fn trace(&self) {
        debug!(
            "Certificate {} ({}): {}",
            self.cert.uid(), self.cert.fingerprint(), self.state
        );
    }
}


//------------ validate_certificate ------------------------------------------

/// Validates a single certificate.
///
/// If `expected_uid` is given, the certificate must have this MRN. If
/// `issuer` is given, the certificate must have been issued by it.
/// Otherwise, the certificate is the root of a chain and must be trusted.
pub async fn validate_certificate(
    cert: &Certificate,
    expected_uid: Option<&Mrn>,
    issuer: Option<&Certificate>,
    options: &ValidationOptions,
) -> Result<(), CertificateError> {
    validate_certificate_at(cert, expected_uid, issuer, options, Time::now())
        .await
}

/// Validates a single certificate at the given time.
pub async fn validate_certificate_at(
    cert: &Certificate,
    expected_uid: Option<&Mrn>,
    issuer: Option<&Certificate>,
    options: &ValidationOptions,
    now: Time,
) -> Result<(), CertificateError> {
    let mut validation = Validation::new(cert);

    if let Some(expected) = expected_uid {
        if cert.uid() != expected {
            return validation.reject(CertificateError::UidMismatch {
                uid: cert.uid().clone(), expected: expected.clone()
            })
        }
    }
    validation.advance(ValidationState::UidMatched);

    if let Err(err) = cert.validity().verify_at(now) {
        return validation.reject(
            if err.is_too_new() {
                CertificateError::NotYetValid {
                    uid: cert.uid().clone(), valid_from: cert.valid_from()
                }
            }
            else {
                CertificateError::Expired {
                    uid: cert.uid().clone(), valid_to: cert.valid_to()
                }
            }
        )
    }
    validation.advance(ValidationState::TimeValid);

    if issuer.is_some() {
        let linked = cert.ipid().map(|ipid| {
            cert.uid().issued_by(ipid)
        }).unwrap_or(false);
        if !linked {
            return validation.reject(
                CertificateError::SubjectIssuerMismatch {
                    uid: cert.uid().clone(),
                    ipid: cert.ipid().map(Into::into),
                }
            )
        }
        validation.advance(ValidationState::IssuerLinked);
    }

    let resolution = status::resolve(options, cert).await;
    if resolution.source == Source::Ocsp {
        status::cache_as(options, cert, resolution.status);
    }
    validation.advance(ValidationState::StatusResolved(resolution.status));
    match resolution.status {
        Status::Revoked(_) => {
            return validation.reject(CertificateError::Revoked {
                uid: cert.uid().clone(), fingerprint: cert.fingerprint()
            })
        }
        Status::Trusted => return validation.accept(),
        _ => { }
    }

    let issuer = match issuer {
        Some(issuer) => issuer,
        None => {
            if options.allow_unknown_mir() && cert.is_ca() {
                debug!("Accepting unknown MIR {}.", cert.uid());
                return validation.accept()
            }
            if options.trust_attested() {
                if let Some(delegate) = options.attested_trust() {
                    if delegate.vouches_for(cert, options).await {
                        debug!("Accepting attested MIR {}.", cert.uid());
                        return validation.accept()
                    }
                }
            }
            return validation.reject(CertificateError::NotTrusted {
                uid: cert.uid().clone(), fingerprint: cert.fingerprint()
            })
        }
    };

    if resolution.status == Status::Unknown && options.require_status() {
        return validation.reject(CertificateError::UnknownStatus {
            uid: cert.uid().clone(), fingerprint: cert.fingerprint()
        })
    }

    if !issuer.is_ca() {
        return validation.reject(
            CertificateError::IssuerNotCa(issuer.uid().clone())
        )
    }

    if !cert.is_signed_by(issuer) {
        return validation.reject(CertificateError::NotIssued {
            uid: cert.uid().clone(),
            issuer: issuer.uid().clone(),
            fingerprint: issuer.fingerprint(),
        })
    }

    validation.accept()
}


//------------ validate_chain ------------------------------------------------

/// Validates a certificate chain.
///
/// The chain starts with the end entity certificate. If `expected_uid` is
/// given, this certificate must have this MRN.
pub async fn validate_chain(
    chain: &[Certificate],
    expected_uid: Option<&Mrn>,
    options: &ValidationOptions,
) -> Result<(), CertificateError> {
    validate_chain_at(chain, expected_uid, options, Time::now()).await
}

/// Validates a certificate chain at the given time.
pub async fn validate_chain_at(
    chain: &[Certificate],
    expected_uid: Option<&Mrn>,
    options: &ValidationOptions,
    now: Time,
) -> Result<(), CertificateError> {
    let (root, rest) = match chain.split_last() {
        Some(some) => some,
        None => return Err(CertificateError::NoCertificate)
    };
    let mut expected = expected_uid;
    for (cert, issuer) in rest.iter().zip(chain.iter().skip(1)) {
        validate_certificate_at(
            cert, expected, Some(issuer), options, now
        ).await?;
        expected = Some(issuer.uid());
    }
    validate_certificate_at(root, expected, None, options, now).await
}

/// Decodes and validates a chain of DER encoded certificates.
///
/// Returns the decoded chain if it is valid.
pub async fn validate_der_chain(
    chain: impl IntoIterator<Item = Bytes>,
    expected_uid: Option<&Mrn>,
    options: &ValidationOptions,
) -> Result<Vec<Certificate>, CertificateError> {
    validate_der_chain_at(chain, expected_uid, options, Time::now()).await
}

/// Decodes and validates a chain of DER encoded certificates at a time.
pub async fn validate_der_chain_at(
    chain: impl IntoIterator<Item = Bytes>,
    expected_uid: Option<&Mrn>,
    options: &ValidationOptions,
    now: Time,
) -> Result<Vec<Certificate>, CertificateError> {
    let chain = chain.into_iter().enumerate().map(|(idx, der)| {
        Certificate::decode(der).map_err(|_| {
            CertificateError::NotACertificate(idx)
        })
    }).collect::<Result<Vec<_>, _>>()?;
    validate_chain_at(&chain, expected_uid, options, now).await?;
    Ok(chain)
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use crate::cert::issuer::Issuer;
    use crate::options::AttestedTrust;
    use crate::status::MemoryOcsp;
    use crate::x509::Validity;
    use super::*;

    fn mrn(s: &str) -> Mrn {
        Mrn::parse(s).unwrap()
    }

    fn validity() -> Validity {
        Validity::from_duration(TimeDelta::days(10))
    }

    struct Fixture {
        root: Issuer,
        mir: Issuer,
        leaf: Issuer,
    }

    impl Fixture {
        fn new() -> Self {
            let root = Issuer::root(&mrn("urn:mrn:mcp:id:root"), validity())
                .unwrap();
            let mir = root.subordinate(
                &mrn("urn:mrn:mcp:id:root:mir"), true, validity(), |_| { }
            ).unwrap();
            let leaf = mir.subordinate(
                &mrn("urn:mrn:mcp:id:root:mir:vessel"), false, validity(),
                |_| { }
            ).unwrap();
            Fixture { root, mir, leaf }
        }

        fn chain(&self) -> &[Certificate] {
            self.leaf.chain()
        }
    }

    fn options() -> ValidationOptions {
        ValidationOptions::new(mrn("urn:mrn:mcp:id:root:sp"))
    }

    #[tokio::test]
    async fn trusted_root() {
        let fixture = Fixture::new();
        let options = options();
        assert_eq!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::NotTrusted {
                uid: mrn("urn:mrn:mcp:id:root"),
                fingerprint: fixture.root.certificate().fingerprint(),
            })
        );

        options.trust(fixture.root.certificate());
        validate_chain(
            fixture.chain(), Some(&mrn("urn:mrn:mcp:id:root:mir:vessel")),
            &options
        ).await.unwrap();

        options.no_longer_trust(fixture.root.certificate());
        assert!(matches!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::NotTrusted { .. })
        ));
    }

    #[tokio::test]
    async fn uid_mismatch() {
        let fixture = Fixture::new();
        let options = options();
        options.trust(fixture.root.certificate());
        assert_eq!(
            validate_chain(
                fixture.chain(), Some(&mrn("urn:mrn:mcp:id:root:mir:other")),
                &options
            ).await,
            Err(CertificateError::UidMismatch {
                uid: mrn("urn:mrn:mcp:id:root:mir:vessel"),
                expected: mrn("urn:mrn:mcp:id:root:mir:other"),
            })
        );
        assert_eq!(
            validate_chain(&[], None, &options).await,
            Err(CertificateError::NoCertificate)
        );
    }

    #[tokio::test]
    async fn validity_period() {
        let fixture = Fixture::new();
        let options = options();
        options.trust(fixture.root.certificate());
        assert!(matches!(
            validate_chain_at(
                fixture.chain(), None, &options,
                Time::now() + TimeDelta::days(20)
            ).await,
            Err(CertificateError::Expired { .. })
        ));
        assert!(matches!(
            validate_chain_at(
                fixture.chain(), None, &options,
                Time::now() - TimeDelta::days(20)
            ).await,
            Err(CertificateError::NotYetValid { .. })
        ));
    }

    #[tokio::test]
    async fn issuer_checks() {
        let fixture = Fixture::new();
        let options = options();
        options.trust(fixture.root.certificate());

        // Subject outside the issuer’s name space.
        let stray = fixture.mir.subordinate(
            &mrn("urn:mrn:mcp:id:elsewhere:vessel"), false, validity(),
            |_| { }
        ).unwrap();
        assert!(matches!(
            validate_chain(stray.chain(), None, &options).await,
            Err(CertificateError::SubjectIssuerMismatch { .. })
        ));

        // Issued by an end entity.
        let sub = fixture.leaf.subordinate(
            &mrn("urn:mrn:mcp:id:root:mir:vessel:crew"), false, validity(),
            |_| { }
        ).unwrap();
        assert_eq!(
            validate_chain(sub.chain(), None, &options).await,
            Err(CertificateError::IssuerNotCa(
                mrn("urn:mrn:mcp:id:root:mir:vessel")
            ))
        );

        // Signed by an impostor with the same name.
        let impostor = Issuer::root(&mrn("urn:mrn:mcp:id:root"), validity())
            .unwrap();
        options.trust(impostor.certificate());
        let chain = [
            fixture.mir.certificate().clone(),
            impostor.certificate().clone(),
        ];
        assert!(matches!(
            validate_chain(&chain, None, &options).await,
            Err(CertificateError::NotIssued { .. })
        ));
    }

    #[tokio::test]
    async fn revoked() {
        let fixture = Fixture::new();
        let ocsp = Arc::new(MemoryOcsp::new());
        let options = options().with_ocsp(ocsp.clone());
        options.trust(fixture.root.certificate());
        ocsp.set(fixture.leaf.certificate(), Status::Revoked(None));
        assert!(matches!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::Revoked { .. })
        ));

        // The OCSP answer has been cached.
        ocsp.remove(fixture.leaf.certificate());
        assert_eq!(
            options.cache().unwrap().get(
                &fixture.leaf.certificate().fingerprint()
            ),
            Some(Status::Revoked(None))
        );
        assert!(matches!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::Revoked { .. })
        ));
    }

    #[tokio::test]
    async fn require_status() {
        let fixture = Fixture::new();
        let ocsp = Arc::new(MemoryOcsp::new());
        let options = options()
            .with_ocsp(ocsp.clone())
            .with_require_status(true);
        options.trust(fixture.root.certificate());
        assert!(matches!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::UnknownStatus { .. })
        ));
        ocsp.set(fixture.leaf.certificate(), Status::Good);
        ocsp.set(fixture.mir.certificate(), Status::Good);
        validate_chain(fixture.chain(), None, &options).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_mir() {
        let fixture = Fixture::new();
        let options = options().with_allow_unknown_mir(true);
        validate_chain(fixture.chain(), None, &options).await.unwrap();

        // A root that isn’t a CA is never accepted this way.
        assert!(matches!(
            validate_chain(
                &fixture.chain()[..1], None, &options
            ).await,
            Err(CertificateError::NotTrusted { .. })
        ));
    }

    struct VouchFor(Mrn);

    #[async_trait]
    impl AttestedTrust for VouchFor {
        async fn vouches_for(
            &self, root: &Certificate, _options: &ValidationOptions
        ) -> bool {
            *root.uid() == self.0
        }
    }

    #[tokio::test]
    async fn attested_root() {
        let fixture = Fixture::new();
        let options = options().with_attested_trust(
            Arc::new(VouchFor(mrn("urn:mrn:mcp:id:root")))
        );
        validate_chain(fixture.chain(), None, &options).await.unwrap();

        let options = options.with_trust_attested(false);
        assert!(matches!(
            validate_chain(fixture.chain(), None, &options).await,
            Err(CertificateError::NotTrusted { .. })
        ));
    }

    #[tokio::test]
    async fn der_chain() {
        let fixture = Fixture::new();
        let options = options();
        options.trust(fixture.root.certificate());
        let ders: Vec<_> = fixture.chain().iter().map(|cert| {
            cert.cert().to_bytes()
        }).collect();
        assert_eq!(
            validate_der_chain(ders.clone(), None, &options).await.unwrap(),
            fixture.chain()
        );

        let mut broken = ders;
        broken.insert(1, Bytes::from_static(b"garbage"));
        assert_eq!(
            validate_der_chain(broken, None, &options).await,
            Err(CertificateError::NotACertificate(1))
        );
    }
}
