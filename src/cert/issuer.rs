//! A certificate authority in a box.
//!
//! An [`Issuer`] holds a key pair and the certificate chain for it. It can
//! issue certificates for subordinate entities. This is enough to run a
//! small identity registry for testing and to sign attestations.

use std::sync::Arc;
use crate::certificate::Certificate;
use crate::crypto::{KeyPair, PublicKeyFormat, SigningError};
use crate::mrn::Mrn;
use crate::oid;
use crate::x509::{Name, Serial, Validity};
use super::builder::CertBuilder;


//------------ Issuer --------------------------------------------------------

/// A key pair together with its certificate chain.
#[derive(Clone, Debug)]
pub struct Issuer {
    key: Arc<KeyPair>,

    /// The chain starting with our own certificate.
    chain: Vec<Certificate>,
}

impl Issuer {
    /// Creates a self-signed root with a new P-384 key.
    pub fn root(uid: &Mrn, validity: Validity) -> Result<Self, SigningError> {
        let key = Arc::new(KeyPair::generate(PublicKeyFormat::EcdsaP384)?);
        let name = Self::name_for(uid);
        let mut builder = CertBuilder::new(
            Self::serial()?, name.clone(), name, validity
        );
        builder.ca(None);
        let cert = builder.into_cert(&key.public_key(), &key)?;
        Ok(Issuer {
            chain: vec![Self::certificate_from(cert)?],
            key,
        })
    }

    /// Issues a certificate with a new P-384 key.
    ///
    /// The closure can add further content to the certificate.
    pub fn subordinate(
        &self,
        uid: &Mrn,
        ca: bool,
        validity: Validity,
        op: impl FnOnce(&mut CertBuilder),
    ) -> Result<Self, SigningError> {
        let key = Arc::new(KeyPair::generate(PublicKeyFormat::EcdsaP384)?);
        self.issue(key, uid, ca, validity, op)
    }

    /// Issues a certificate for the given key.
    pub fn issue(
        &self,
        key: Arc<KeyPair>,
        uid: &Mrn,
        ca: bool,
        validity: Validity,
        op: impl FnOnce(&mut CertBuilder),
    ) -> Result<Self, SigningError> {
        let mut builder = CertBuilder::new(
            Self::serial()?,
            self.certificate().cert().subject().clone(),
            Self::name_for(uid),
            validity,
        );
        if ca {
            builder.ca(None);
        }
        builder.authority_key_identifier(self.key.public_key().key_identifier());
        op(&mut builder);
        let cert = builder.into_cert(&key.public_key(), &self.key)?;
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(Self::certificate_from(cert)?);
        chain.extend(self.chain.iter().cloned());
        Ok(Issuer { key, chain })
    }

    /// Returns the key pair.
    pub fn key(&self) -> &Arc<KeyPair> {
        &self.key
    }

    /// Returns our own certificate.
    pub fn certificate(&self) -> &Certificate {
        // The chain is never empty.
        &self.chain[0]
    }

    /// Returns the chain starting with our own certificate.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Returns the MRN of the issuer.
    pub fn uid(&self) -> &Mrn {
        self.certificate().uid()
    }

    /// Returns the chain as a PEM bundle.
    pub fn pem_bundle(&self) -> String {
        Certificate::pem_bundle(&self.chain)
    }

    fn name_for(uid: &Mrn) -> Name {
        Name::from_attributes(&[(&oid::AT_UID, uid.as_str())])
    }

    fn serial() -> Result<Serial, SigningError> {
        Serial::random().map_err(|_| SigningError::Sign)
    }

    fn certificate_from(
        cert: super::Cert
    ) -> Result<Certificate, SigningError> {
        Certificate::from_cert(cert).map_err(|_| SigningError::Encode)
    }
}


//============ Testing =======================================================
