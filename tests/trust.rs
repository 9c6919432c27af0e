//! Validating identities end to end.

use std::sync::Arc;
use chrono::TimeDelta;
use serde_json::{json, Value};
use mcp_trust::{
    CertificateError, Entity, Mrn, TokenError, ValidationOptions
};
use mcp_trust::attestation::{
    Attestation, AttestationError, ClaimKind, Claims, Party, TokenOptions
};
use mcp_trust::cert::issuer::Issuer;
use mcp_trust::chain;
use mcp_trust::config::ValidationConfig;
use mcp_trust::fetch::{MemoryFetcher, RewriteRules};
use mcp_trust::jose::{self, Header, JwsAlgorithm};
use mcp_trust::status::{MemoryOcsp, Status};
use mcp_trust::token::{self, Expectations};
use mcp_trust::x509::{Time, Validity};

const MIR_X5U: &str = "https://mir.example.org/certs/mir.pem";
const VESSEL_X5U: &str = "https://mir.example.org/certs/vessel.pem";


//------------ Fixture -------------------------------------------------------

struct Registry {
    mir: Issuer,
    org: Issuer,
    vessel: Issuer,
    fetcher: Arc<MemoryFetcher>,
}

impl Registry {
    fn new() -> Self {
        let validity = Validity::from_duration(TimeDelta::days(30));
        let mir = Issuer::root(&mrn("urn:mrn:mcp:id:mir"), validity).unwrap();
        let org = mir.subordinate(
            &mrn("urn:mrn:mcp:id:mir:aboamare"), true, validity, |builder| {
                builder.x5u(MIR_X5U);
            }
        ).unwrap();
        let vessel = org.subordinate(
            &mrn("urn:mrn:mcp:id:mir:aboamare:vessel:spirit"), false,
            validity, |builder| {
                builder.x5u(VESSEL_X5U);
            }
        ).unwrap();
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert(MIR_X5U, org.pem_bundle());
        fetcher.insert(VESSEL_X5U, vessel.pem_bundle());
        Registry { mir, org, vessel, fetcher }
    }

    fn options(&self) -> ValidationOptions {
        ValidationOptions::new(mrn("urn:mrn:mcp:id:mir:aboamare:sp"))
            .with_fetcher(self.fetcher.clone())
    }

    fn trusting_options(&self) -> ValidationOptions {
        let options = self.options();
        options.trust(self.mir.certificate());
        options
    }

    fn vessel_token(&self, key: &Issuer, claims: Value) -> String {
        let claims = match claims {
            Value::Object(map) => map,
            _ => unreachable!()
        };
        jose::sign(
            &Header::new(JwsAlgorithm::Es384)
                .with_x5u(VESSEL_X5U).with_nonce("c0ffee"),
            &claims, key.key()
        ).unwrap()
    }

    fn vessel_claims(&self) -> Value {
        json!({
            "sub": self.vessel.uid().as_str(),
            "iat": Time::now().timestamp(),
            "exp": (Time::now() + TimeDelta::minutes(5)).timestamp(),
        })
    }
}

fn mrn(s: &str) -> Mrn {
    Mrn::parse(s).unwrap()
}


//------------ Chains --------------------------------------------------------

#[tokio::test]
async fn chain_needs_trusted_root() {
    let registry = Registry::new();
    let chain = registry.vessel.chain();

    assert!(matches!(
        chain::validate_chain(chain, None, &registry.options()).await,
        Err(CertificateError::NotTrusted { .. })
    ));
    chain::validate_chain(
        chain, None, &registry.trusting_options()
    ).await.unwrap();
}

#[tokio::test]
async fn chain_with_expected_uid() {
    let registry = Registry::new();
    let options = registry.trusting_options();
    let chain = registry.vessel.chain();

    chain::validate_chain(chain, Some(registry.vessel.uid()), &options)
        .await.unwrap();
    assert_eq!(
        chain::validate_chain(chain, Some(registry.org.uid()), &options)
            .await,
        Err(CertificateError::UidMismatch {
            uid: registry.vessel.uid().clone(),
            expected: registry.org.uid().clone(),
        })
    );
}

#[tokio::test]
async fn revoked_certificate() {
    let registry = Registry::new();
    let ocsp = Arc::new(MemoryOcsp::new());
    ocsp.set(registry.org.certificate(), Status::Revoked(None));
    let options = registry.trusting_options().with_ocsp(ocsp);

    assert!(matches!(
        chain::validate_chain(registry.vessel.chain(), None, &options).await,
        Err(CertificateError::Revoked { .. })
    ));
}

#[tokio::test]
async fn no_longer_trusted() {
    let registry = Registry::new();
    let options = registry.trusting_options();
    let chain = registry.vessel.chain();

    chain::validate_chain(chain, None, &options).await.unwrap();
    assert_eq!(
        options.cache().and_then(|cache| {
            cache.get(&registry.mir.certificate().fingerprint())
        }),
        Some(Status::Trusted)
    );

    options.no_longer_trust(registry.mir.certificate());
    assert!(matches!(
        chain::validate_chain(chain, None, &options).await,
        Err(CertificateError::NotTrusted { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_validations() {
    let registry = Registry::new();
    let other = Registry::new();
    let options = registry.trusting_options();

    let mut tasks = Vec::new();
    for idx in 0..64 {
        let options = options.clone();
        let (chain, stable) = if idx % 2 == 0 {
            (registry.vessel.chain().to_vec(), true)
        }
        else {
            (other.vessel.chain().to_vec(), false)
        };
        tasks.push(tokio::spawn(async move {
            let res = chain::validate_chain(&chain, None, &options).await;
            (stable, res)
        }));
    }
    let toggle = {
        let options = options.clone();
        let root = other.mir.certificate().clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                options.trust(&root);
                tokio::task::yield_now().await;
                options.no_longer_trust(&root);
            }
        })
    };

    for task in tasks {
        let (stable, res) = task.await.unwrap();
        if stable {
            res.unwrap();
        }
        else {
            assert!(matches!(
                res, Ok(()) | Err(CertificateError::NotTrusted { .. })
            ));
        }
    }
    toggle.await.unwrap();

    assert!(!options.is_trusted(other.mir.uid().as_str()));
    assert!(matches!(
        chain::validate_chain(other.vessel.chain(), None, &options).await,
        Err(CertificateError::NotTrusted { .. })
    ));
    assert_eq!(
        options.cache().and_then(|cache| {
            cache.get(&registry.mir.certificate().fingerprint())
        }),
        Some(Status::Trusted)
    );
}



//------------ Tokens and Entities -------------------------------------------

#[tokio::test]
async fn token_signed_by_certificate_key() {
    let registry = Registry::new();
    let options = registry.trusting_options();

    let token = registry.vessel_token(
        &registry.vessel, registry.vessel_claims()
    );
    let validated = token::validate(
        &token, &Expectations::nonce("c0ffee"), &options
    ).await.unwrap();
    assert_eq!(validated.subject(), registry.vessel.uid());
    assert_eq!(validated.signer(), registry.vessel.certificate());

    // Signed with the organization’s key but pointing to the vessel.
    let token = registry.vessel_token(
        &registry.org, registry.vessel_claims()
    );
    assert!(matches!(
        token::validate(&token, &Expectations::new(), &options).await,
        Err(TokenError::Token(_))
    ));
}

#[tokio::test]
async fn entity_with_nonce() {
    let registry = Registry::new();
    let options = registry.trusting_options();
    let token = registry.vessel_token(
        &registry.vessel, registry.vessel_claims()
    );

    let entity = Entity::from_token(
        &token, Some("c0ffee"), &options
    ).await.unwrap();
    assert_eq!(entity.uid(), registry.vessel.uid());
    assert_eq!(entity.chain().len(), 3);
    assert_eq!(entity.certificate().x5u_url(), Some(VESSEL_X5U));

    assert_eq!(
        Entity::from_token(&token, Some("decaf"), &options).await.err(),
        Some(TokenError::InvalidNonce(Some("c0ffee".into())))
    );

    assert!(matches!(
        Entity::from_token(&token, None, &registry.options()).await,
        Err(TokenError::Certificate(CertificateError::NotTrusted { .. }))
    ));
}

#[tokio::test]
async fn rewritten_x5u() {
    let registry = Registry::new();
    let fetcher = Arc::new(MemoryFetcher::new());
    fetcher.insert(
        "https://mirror.example.net/vessel.pem",
        registry.vessel.pem_bundle()
    );
    let mut rules = RewriteRules::new();
    rules.add_rule(
        r"https://mir\.example\.org/certs/", "https://mirror.example.net/"
    ).unwrap();
    let options = registry.trusting_options()
        .with_fetcher(fetcher)
        .with_rewrite_rules(rules);

    let token = registry.vessel_token(
        &registry.vessel, registry.vessel_claims()
    );
    Entity::from_token(&token, None, &options).await.unwrap();
}


//------------ Attestations --------------------------------------------------

#[tokio::test]
async fn attestation_round_trip() {
    let registry = Registry::new();
    let options = registry.trusting_options();

    let attn = Attestation::strict(
        Party::from_issuer(&registry.org),
        Party::from_certificate(registry.vessel.certificate()),
        Claims::default().with(ClaimKind::MirEndorsed, true),
    ).unwrap();
    let token = attn.as_token(&TokenOptions::new()).unwrap();

    let read = Attestation::from_token(&token, &options).await.unwrap();
    assert_eq!(read.issuer().uid(), registry.org.uid());
    assert!(read.asserts(registry.vessel.uid(), ClaimKind::MirOk));
    assert!(read.asserts(registry.vessel.uid(), ClaimKind::MirEndorsed));
    assert!(!read.asserts(registry.org.uid(), ClaimKind::MirOk));

    assert!(matches!(
        Attestation::from_token(&token, &registry.options()).await,
        Err(AttestationError::Certificate(
            CertificateError::NotTrusted { .. }
        ))
    ));
}


//------------ Configuration -------------------------------------------------

#[tokio::test]
async fn options_from_config() {
    let registry = Registry::new();
    let config = ValidationConfig::from_json(&json!({
        "spid": "urn:mrn:mcp:id:mir:aboamare:sp",
        "trusted": {
            (registry.mir.certificate().fingerprint().to_string()):
                registry.mir.uid().as_str()
        },
        "cache": null,
        "ocspTimeout": "2s",
    }).to_string()).unwrap();
    let options = ValidationOptions::from_config(&config).unwrap()
        .with_fetcher(registry.fetcher.clone());
    assert!(options.cache().is_none());
    assert!(options.is_trusted(registry.mir.uid().as_str()));

    chain::validate_chain(registry.vessel.chain(), None, &options)
        .await.unwrap();
}
