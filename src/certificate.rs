//! MCP identity certificates.
//!
//! A [`Certificate`] is the domain view of a decoded X.509 certificate. It
//! is created from a [`Cert`] by extracting the MCP specific information:
//! the MRN of the subject and issuer, the alternative names describing a
//! vessel, and the URLs of the related services.

use std::{error, fmt, str};
use std::sync::{Arc, OnceLock};
use bytes::Bytes;
use log::warn;
use pem::{EncodeConfig, LineEnding, Pem};
use ring::digest;
use crate::cert::Cert;
use crate::crypto::{KeyIdentifier, PublicKey};
use crate::error::CertificateError;
use crate::mrn::Mrn;
use crate::oid;
use crate::util::base64;
use crate::util::hex;
use crate::x509::{Serial, Time, Validity};


//------------ Certificate ---------------------------------------------------

/// An MCP identity certificate.
///
/// The certificate is cheap to clone. It always has a valid MRN as the UID
/// of its subject.
#[derive(Clone)]
pub struct Certificate(Arc<Inner>);

struct Inner {
    cert: Cert,
    uid: Mrn,
    ipid: Option<String>,
    dn: Vec<(String, String)>,
    alt_names: AltNames,
    x5u_url: Option<String>,
    matp_url: Option<String>,
    ocsp_url: Option<String>,
    fingerprint: OnceLock<Fingerprint>,
}

/// # Creation
///
impl Certificate {
    /// Creates a certificate from a decoded X.509 certificate.
    pub fn from_cert(cert: Cert) -> Result<Self, CertificateError> {
        let dn = cert.subject().attributes().map_err(|err| {
            CertificateError::Parse(err.to_string())
        })?.into_iter().map(|(id, value)| {
            (Self::attribute_name(&id), value)
        }).collect::<Vec<_>>();

        let uid = dn.iter().find_map(|(name, value)| {
            if name == "uid" { Some(value.as_str()) } else { None }
        }).and_then(|uid| Mrn::parse(uid).ok()).ok_or_else(|| {
            CertificateError::SubjectNotMrn(Self::dn_string(&dn))
        })?;

        let ipid = cert.issuer().attribute(&oid::AT_UID);

        let mut alt_names = AltNames::default();
        for name in cert.alt_names() {
            let field = match oid::oid_to_dotted(&name.id).as_deref()
                .and_then(oid::name_of)
            {
                Some(field) => field,
                None => continue
            };
            alt_names.set(field, &name.value);
        }

        let x5u_url = Self::access_location(&cert, "x5u");
        let matp_url = Self::access_location(&cert, "matp");
        let ocsp_url = Self::access_location(&cert, "ocsp");

        Ok(Certificate(Arc::new(Inner {
            cert, uid, ipid, dn, alt_names, x5u_url, matp_url, ocsp_url,
            fingerprint: OnceLock::new(),
        })))
    }

    /// Decodes a certificate from its DER encoding.
    pub fn decode(der: Bytes) -> Result<Self, CertificateError> {
        Self::from_cert(Cert::decode(der).map_err(|err| {
            CertificateError::Parse(err.to_string())
        })?)
    }

    /// Parses the first certificate of a PEM encoded string.
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        match pem_blocks(pem).next() {
            Some(block) => Self::from_pem_block(block),
            None => Err(CertificateError::Parse("no PEM block".into()))
        }
    }

    /// Parses all certificates in a PEM bundle.
    ///
    /// Blocks that do not contain a valid MCP certificate are skipped with
    /// a warning. The order of the certificates is preserved.
    pub fn from_pem_bundle(pem: &str) -> Vec<Self> {
        pem_blocks(pem).filter_map(|block| {
            match Self::from_pem_block(block) {
                Ok(cert) => Some(cert),
                Err(err) => {
                    warn!("Skipping certificate in PEM bundle: {}", err);
                    None
                }
            }
        }).collect()
    }

    fn from_pem_block(block: &str) -> Result<Self, CertificateError> {
        let block = pem::parse(block).map_err(|err| {
            CertificateError::Parse(err.to_string())
        })?;
        if block.tag() != PEM_TAG {
            return Err(CertificateError::Parse(
                format!("unexpected PEM block '{}'", block.tag())
            ))
        }
        Self::decode(block.into_contents().into())
    }

    fn attribute_name(id: &bcder::Oid<Bytes>) -> String {
        match oid::oid_to_dotted(id) {
            Some(dotted) => match oid::name_of(&dotted) {
                Some(name) => name.into(),
                None => dotted
            }
            None => "?".into()
        }
    }

    fn dn_string(dn: &[(String, String)]) -> String {
        let mut res = String::new();
        for (name, value) in dn {
            if !res.is_empty() {
                res.push(',');
            }
            res.push_str(name);
            res.push('=');
            res.push_str(value);
        }
        res
    }

    fn access_location(cert: &Cert, method: &str) -> Option<String> {
        let method = oid::by_name(method)?;
        cert.access_location(&method).map(Into::into)
    }
}

/// # Encoding
///
impl Certificate {
    /// Returns the PEM encoding of the certificate.
    pub fn to_pem(&self) -> String {
        pem::encode_config(
            &Pem::new(PEM_TAG, self.0.cert.as_slice()),
            EncodeConfig::new().set_line_ending(LineEnding::LF),
        )
    }

    /// Returns the PEM bundle for a sequence of certificates.
    pub fn pem_bundle<'a>(
        certs: impl IntoIterator<Item = &'a Certificate>
    ) -> String {
        certs.into_iter().map(Certificate::to_pem).collect()
    }
}

/// # Data Access
///
impl Certificate {
    /// Returns the underlying X.509 certificate.
    pub fn cert(&self) -> &Cert {
        &self.0.cert
    }

    /// Returns the MRN of the subject.
    pub fn uid(&self) -> &Mrn {
        &self.0.uid
    }

    /// Returns the UID of the issuer if present.
    pub fn ipid(&self) -> Option<&str> {
        self.0.ipid.as_deref()
    }

    /// Returns the SHA-256 fingerprint of the certificate.
    ///
    /// The fingerprint is calculated on first use.
    pub fn fingerprint(&self) -> Fingerprint {
        *self.0.fingerprint.get_or_init(|| {
            Fingerprint::digest(self.0.cert.as_slice())
        })
    }

    /// Returns the `x5t#S256` thumbprint of the certificate.
    pub fn x5t256(&self) -> String {
        self.fingerprint().x5t256()
    }

    pub fn serial(&self) -> &Serial {
        self.0.cert.serial_number()
    }

    pub fn validity(&self) -> Validity {
        self.0.cert.validity()
    }

    pub fn valid_from(&self) -> Time {
        self.validity().not_before()
    }

    pub fn valid_to(&self) -> Time {
        self.validity().not_after()
    }

    /// Returns whether this is a CA certificate.
    pub fn is_ca(&self) -> bool {
        self.0.cert.is_ca()
    }

    pub fn path_len_constraint(&self) -> Option<u64> {
        self.0.cert.path_len_constraint()
    }

    pub fn authority_key_identifier(&self) -> Option<&KeyIdentifier> {
        self.0.cert.authority_key_identifier()
    }

    pub fn subject_key_identifier(&self) -> Option<&KeyIdentifier> {
        self.0.cert.subject_key_identifier()
    }

    pub fn public_key(&self) -> &PublicKey {
        self.0.cert.subject_public_key_info()
    }

    /// Returns the attributes of the subject’s distinguished name.
    ///
    /// Registered attribute types are given by their name, all others
    /// in dotted-decimal form.
    pub fn dn(&self) -> &[(String, String)] {
        &self.0.dn
    }

    /// Returns the value of a subject attribute by its name.
    pub fn dn_attribute(&self, name: &str) -> Option<&str> {
        self.0.dn.iter().find_map(|(key, value)| {
            if key == name { Some(value.as_str()) } else { None }
        })
    }

    pub fn country(&self) -> Option<&str> {
        self.dn_attribute("country")
    }

    pub fn name(&self) -> Option<&str> {
        self.dn_attribute("name")
    }

    pub fn email(&self) -> Option<&str> {
        self.dn_attribute("email")
    }

    pub fn organization(&self) -> Option<&str> {
        self.dn_attribute("organization")
    }

    pub fn unit(&self) -> Option<&str> {
        self.dn_attribute("unit")
    }

    /// Returns the MCP subject alternative names.
    pub fn alt_names(&self) -> &AltNames {
        &self.0.alt_names
    }

    /// Returns the URL of the subject’s certificate chain.
    pub fn x5u_url(&self) -> Option<&str> {
        self.0.x5u_url.as_deref()
    }

    /// Returns the URL of the subject’s MATP endpoint.
    pub fn matp_url(&self) -> Option<&str> {
        self.0.matp_url.as_deref()
    }

    /// Returns the URL of the OCSP responder for this certificate.
    pub fn ocsp_url(&self) -> Option<&str> {
        self.0.ocsp_url.as_deref()
    }

    /// Returns whether the certificate was signed with the key of `issuer`.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        self.0.cert.verify_signature(issuer.public_key()).is_ok()
    }
}


//--- PartialEq and Eq

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.0.cert.as_slice() == other.0.cert.as_slice()
    }
}

impl Eq for Certificate { }


//--- Debug

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("uid", &self.0.uid)
            .field("ipid", &self.0.ipid)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}


//------------ AltNames ------------------------------------------------------

/// The MCP specific subject alternative names.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AltNames {
    pub flag_state: Option<String>,
    pub call_sign: Option<String>,
    pub imo_number: Option<String>,
    pub mmsi: Option<String>,
    pub ship_type: Option<String>,
    pub home_port: Option<String>,
    pub secondary_mrn: Option<String>,
    pub url: Option<String>,
}

impl AltNames {
    fn set(&mut self, field: &str, value: &str) {
        let target = match field {
            "flagState" => &mut self.flag_state,
            "callSign" => &mut self.call_sign,
            "IMONumber" => &mut self.imo_number,
            "MMSI" => &mut self.mmsi,
            "shipType" => &mut self.ship_type,
            "homePort" => &mut self.home_port,
            "secondaryMRN" => &mut self.secondary_mrn,
            "URL" => &mut self.url,
            _ => return
        };
        *target = Some(value.into())
    }
}


//------------ Fingerprint ---------------------------------------------------

/// The SHA-256 digest of the DER encoding of a certificate.
///
/// Fingerprints are displayed as colon separated upper case hex and can be
/// parsed from that form or plain hex.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Calculates the fingerprint of some data.
    pub fn digest(data: &[u8]) -> Self {
        let mut res = [0u8; 32];
        res.copy_from_slice(
            digest::digest(&digest::SHA256, data).as_ref()
        );
        Fingerprint(res)
    }

    /// Returns the base64url encoded fingerprint as used in JOSE.
    pub fn x5t256(&self) -> String {
        base64::Jose.encode(&self.0)
    }

    /// Creates a fingerprint from an `x5t#S256` value.
    pub fn from_x5t256(s: &str) -> Option<Self> {
        base64::Jose.decode(s).ok()?.try_into().ok().map(Fingerprint)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl str::FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        hex::decode(s.trim()).ok_or(FingerprintError)?.try_into().map(
            Fingerprint
        ).map_err(|_| FingerprintError)
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&hex::Colons(&self.0), f)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}


//------------ FingerprintError ----------------------------------------------

/// A string was not a SHA-256 fingerprint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FingerprintError;

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("invalid certificate fingerprint")
    }
}

impl error::Error for FingerprintError { }


//------------ PEM Blocks ----------------------------------------------------

const PEM_TAG: &str = "CERTIFICATE";

/// Splits a PEM string into its blocks.
///
/// Each block is returned including its boundary lines so it can be
/// parsed on its own. `pem::parse_many` would give up on the first
/// broken block.
fn pem_blocks(pem: &str) -> impl Iterator<Item = &str> {
    const BEGIN: &str = "-----BEGIN ";
    const END: &str = "-----END ";
    const DASHES: &str = "-----";

    let mut rest = pem;
    std::iter::from_fn(move || {
        let start = rest.find(BEGIN)?;
        let tail = &rest[start..];
        let end = tail.find(END)?;
        let close = tail[end + END.len()..].find(DASHES)?;
        let len = end + END.len() + close + DASHES.len();
        rest = &tail[len..];
        Some(&tail[..len])
    })
}


//============ Testing =======================================================
