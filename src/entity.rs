//! Authenticating MCP entities.
//!
//! An entity, such as a vessel or a service, authenticates itself by
//! presenting a token signed with the key of its certificate. The token
//! must carry a nonce chosen by the relying party, and the certificate
//! chain of the entity must be valid.

use crate::certificate::{AltNames, Certificate};
use crate::chain;
use crate::error::TokenError;
use crate::mrn::Mrn;
use crate::options::ValidationOptions;
use crate::token::{self, Expectations, ValidatedToken};


//------------ Entity --------------------------------------------------------

/// An authenticated entity.
#[derive(Clone, Debug)]
pub struct Entity {
    uid: Mrn,
    token: ValidatedToken,
}

impl Entity {
    /// Authenticates an entity from a token.
    ///
    /// If `nonce` is given, the token must have this nonce. If the token
    /// has an `iss` claim, its subject must have been issued by it and the
    /// chain must be that of the issuer. Otherwise the chain must be that
    /// of the subject.
    pub async fn from_token(
        token: &str,
        nonce: Option<&str>,
        options: &ValidationOptions,
    ) -> Result<Self, TokenError> {
        let expectations = match nonce {
            Some(nonce) => Expectations::nonce(nonce),
            None => Expectations::new(),
        };
        let token = token::validate(token, &expectations, options).await?;

        let expected = match token.issuer() {
            Some(iss) => {
                let mismatch = || TokenError::SubjectIssuerMismatch {
                    sub: token.subject().to_string(), iss: iss.into()
                };
                if !token.subject().issued_by(iss) {
                    return Err(mismatch())
                }
                Mrn::parse(iss).map_err(|_| mismatch())?
            }
            None => token.subject().clone(),
        };

        chain::validate_chain(token.chain(), Some(&expected), options).await?;

        Ok(Entity { uid: token.subject().clone(), token })
    }

    /// Returns the MRN of the entity.
    pub fn uid(&self) -> &Mrn {
        &self.uid
    }

    /// Returns the validated certificate chain.
    pub fn chain(&self) -> &[Certificate] {
        self.token.chain()
    }

    /// Returns the certificate the token was signed with.
    pub fn certificate(&self) -> &Certificate {
        self.token.signer()
    }

    pub fn alt_names(&self) -> &AltNames {
        self.certificate().alt_names()
    }

    pub fn token(&self) -> &ValidatedToken {
        &self.token
    }
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use chrono::TimeDelta;
    use serde_json::{json, Value};
    use crate::cert::issuer::Issuer;
    use crate::error::CertificateError;
    use crate::fetch::MemoryFetcher;
    use crate::jose::{self, Header, JwsAlgorithm};
    use crate::oid;
    use crate::x509::{Time, Validity};
    use super::*;

    const X5U: &str = "https://mir.example.org/vessel.pem";

    fn mrn(s: &str) -> Mrn {
        Mrn::parse(s).unwrap()
    }

    fn setup() -> (Issuer, Issuer, ValidationOptions) {
        let validity = Validity::from_duration(TimeDelta::days(10));
        let mir = Issuer::root(&mrn("urn:mrn:mcp:id:mir"), validity).unwrap();
        let vessel = mir.subordinate(
            &mrn("urn:mrn:mcp:id:mir:vessel"), false, validity,
            |builder| {
                builder.alt_name(
                    oid::by_name("MMSI").unwrap(), "230123450"
                );
            }
        ).unwrap();
        let fetcher = MemoryFetcher::new();
        fetcher.insert(X5U, vessel.pem_bundle());
        let options = ValidationOptions::new(mrn("urn:mrn:mcp:id:mir:sp"))
            .with_fetcher(Arc::new(fetcher));
        options.trust(mir.certificate());
        (mir, vessel, options)
    }

    fn token(vessel: &Issuer, claims: Value) -> String {
        let claims = match claims {
            Value::Object(map) => map,
            _ => unreachable!()
        };
        jose::sign(
            &Header::new(JwsAlgorithm::Es384).with_x5u(X5U).with_nonce("n1"),
            &claims, vessel.key()
        ).unwrap()
    }

    #[tokio::test]
    async fn authenticate() {
        let (_, vessel, options) = setup();
        let token = token(&vessel, json!({
            "sub": "urn:mrn:mcp:id:mir:vessel",
            "iat": Time::now().timestamp(),
        }));
        let entity = Entity::from_token(&token, Some("n1"), &options).await
            .unwrap();
        assert_eq!(entity.uid(), &mrn("urn:mrn:mcp:id:mir:vessel"));
        assert_eq!(entity.alt_names().mmsi.as_deref(), Some("230123450"));
        assert_eq!(entity.chain().len(), 2);

        assert_eq!(
            Entity::from_token(&token, Some("n2"), &options).await.err(),
            Some(TokenError::InvalidNonce(Some("n1".into())))
        );
    }

    #[tokio::test]
    async fn issuer_claim() {
        let (mir, vessel, options) = setup();
        let token = self::token(&vessel, json!({
            "sub": "urn:mrn:mcp:id:mir:vessel",
            "iss": "urn:mrn:mcp:id:other",
            "iat": Time::now().timestamp(),
        }));
        assert_eq!(
            Entity::from_token(&token, None, &options).await.err(),
            Some(TokenError::SubjectIssuerMismatch {
                sub: "urn:mrn:mcp:id:mir:vessel".into(),
                iss: "urn:mrn:mcp:id:other".into(),
            })
        );

        // With an issuer, the chain has to start with the issuer.
        let token = self::token(&vessel, json!({
            "sub": "urn:mrn:mcp:id:mir:vessel",
            "iss": "urn:mrn:mcp:id:mir",
            "iat": Time::now().timestamp(),
        }));
        assert_eq!(
            Entity::from_token(&token, None, &options).await.err(),
            Some(TokenError::Certificate(CertificateError::UidMismatch {
                uid: mrn("urn:mrn:mcp:id:mir:vessel"),
                expected: mir.uid().clone(),
            }))
        );
    }

    #[tokio::test]
    async fn untrusted() {
        let (mir, vessel, options) = setup();
        options.no_longer_trust(mir.certificate());
        let token = token(&vessel, json!({
            "sub": "urn:mrn:mcp:id:mir:vessel",
            "iat": Time::now().timestamp(),
        }));
        assert!(matches!(
            Entity::from_token(&token, None, &options).await,
            Err(TokenError::Certificate(CertificateError::NotTrusted { .. }))
        ));
    }
}
