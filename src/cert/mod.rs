//! X.509 certificates as issued by MCP identity registries.
//!
//! This module decodes the certificate profile used by the Maritime
//! Connectivity Platform. It doesn’t interpret the data beyond decoding it:
//! turning a decoded [`Cert`] into the domain view happens in
//! [`certificate`][crate::certificate].
//!
//! Certificates are defined in [RFC 5280]. MCP adds a number of
//! `otherName` entries to the subject alternative names carrying things
//! like the MMSI or call sign of a vessel as well as access methods for
//! the authority information access extension pointing to the x5u and
//! MATP endpoints of an entity.
//!
//! [RFC 5280]: https://tools.ietf.org/html/rfc5280

use std::ops;
use std::convert::Infallible;
use bcder::{decode, encode};
use bcder::{BitString, Captured, Ia5String, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bytes::Bytes;
use crate::crypto::{
    KeyIdentifier, PublicKey, SignatureAlgorithm, VerificationError
};
use crate::oid;
use crate::x509::{Name, Serial, SignedData, Validity};

pub mod builder;
pub mod issuer;


//------------ Cert ----------------------------------------------------------

/// A decoded X.509 certificate.
///
/// Besides the decoded content, the certificate keeps its complete DER
/// encoding. Fingerprints are calculated over those octets.
#[derive(Clone, Debug)]
pub struct Cert {
    /// The DER encoding of the whole certificate.
    raw: Bytes,

    /// The outer structure of the certificate.
    signed_data: SignedData,

    /// The content of the certificate.
    tbs: TbsCert,
}

/// # Decoding and Encoding
///
impl Cert {
    /// Decodes a source as a certificate.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Takes an encoded certificate from the beginning of a value.
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let raw = cons.capture_one()?;
        Self::from_captured(raw).map_err(DecodeError::convert)
    }

    /// Decodes a certificate from its captured encoding.
    fn from_captured(raw: Captured) -> Result<Self, DecodeError<Infallible>> {
        let signed_data = raw.clone().decode(SignedData::take_from)?;
        let tbs = signed_data.data().clone().decode(
            TbsCert::from_constructed
        )?;
        Ok(Cert { raw: raw.into_bytes(), signed_data, tbs })
    }

    /// Returns a value encoder for a reference to the certificate.
    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        self.signed_data.encode_ref()
    }

    /// Returns the DER encoding of the certificate.
    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// Returns a reference to the DER encoding of the certificate.
    pub fn as_slice(&self) -> &[u8] {
        self.raw.as_ref()
    }
}

/// # Data Access
///
impl Cert {
    /// Returns a reference to the signed data wrapper of the certificate.
    pub fn signed_data(&self) -> &SignedData {
        &self.signed_data
    }

    /// Returns a reference to the content of the certificate.
    pub fn tbs(&self) -> &TbsCert {
        &self.tbs
    }

    /// Verifies that the certificate was signed by the given key.
    pub fn verify_signature(
        &self, issuer_key: &PublicKey
    ) -> Result<(), VerificationError> {
        self.signed_data.verify_signature(issuer_key)
    }
}


//--- Deref and AsRef

impl ops::Deref for Cert {
    type Target = TbsCert;

    fn deref(&self) -> &Self::Target {
        &self.tbs
    }
}

impl AsRef<[u8]> for Cert {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}


//------------ TbsCert -------------------------------------------------------

/// The data of a certificate.
///
/// Only the extensions MCP relies upon are decoded. All extensions,
/// including those, are also kept in their raw form.
#[derive(Clone, Debug)]
pub struct TbsCert {
    /// The serial number.
    serial_number: Serial,

    /// The algorithm used when signing the certificate.
    signature: SignatureAlgorithm,

    /// The name of the issuer.
    issuer: Name,

    /// The validity of the certificate.
    validity: Validity,

    /// The name of the subject of this certificate.
    subject: Name,

    /// Information about the public key of this certificate.
    subject_public_key_info: PublicKey,

    /// Basic Constraints.
    ///
    /// The field indicates whether the extension is present and, if so,
    /// whether the "cA" boolean is set.
    basic_ca: Option<bool>,

    /// The path length constraint of the Basic Constraints extension.
    path_len: Option<u64>,

    /// Subject Key Identifier.
    subject_key_identifier: Option<KeyIdentifier>,

    /// Authority Key Identifier.
    authority_key_identifier: Option<KeyIdentifier>,

    /// The `otherName` entries of the Subject Alternative Name extension.
    alt_names: Vec<OtherName>,

    /// Authority Information Access.
    authority_info_access: Vec<AccessDescription>,

    /// Subject Information Access.
    subject_info_access: Vec<AccessDescription>,

    /// All extensions in their raw form.
    extensions: Vec<Extension>,
}

/// # Data Access
///
impl TbsCert {
    /// Returns a reference to the certificate’s serial number.
    pub fn serial_number(&self) -> &Serial {
        &self.serial_number
    }

    /// Returns the signature algorithm stated in the certificate.
    pub fn signature(&self) -> SignatureAlgorithm {
        self.signature
    }

    /// Returns a reference to the issuer.
    pub fn issuer(&self) -> &Name {
        &self.issuer
    }

    /// Returns the validity of the certificate.
    pub fn validity(&self) -> Validity {
        self.validity
    }

    /// Returns a reference to the subject.
    pub fn subject(&self) -> &Name {
        &self.subject
    }

    /// Returns a reference to the public key.
    pub fn subject_public_key_info(&self) -> &PublicKey {
        &self.subject_public_key_info
    }

    /// Returns the cA field of the basic constraints extension if present.
    pub fn basic_ca(&self) -> Option<bool> {
        self.basic_ca
    }

    /// Returns whether the certificate is a CA certificate.
    pub fn is_ca(&self) -> bool {
        self.basic_ca == Some(true)
    }

    /// Returns the path length constraint if present.
    pub fn path_len_constraint(&self) -> Option<u64> {
        self.path_len
    }

    pub fn subject_key_identifier(&self) -> Option<&KeyIdentifier> {
        self.subject_key_identifier.as_ref()
    }

    pub fn authority_key_identifier(&self) -> Option<&KeyIdentifier> {
        self.authority_key_identifier.as_ref()
    }

    /// Returns the `otherName` alternative names.
    pub fn alt_names(&self) -> &[OtherName] {
        &self.alt_names
    }

    pub fn authority_info_access(&self) -> &[AccessDescription] {
        &self.authority_info_access
    }

    pub fn subject_info_access(&self) -> &[AccessDescription] {
        &self.subject_info_access
    }

    /// Returns all extensions of the certificate.
    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }

    /// Returns the first access location for the given method.
    ///
    /// Both the authority and subject information access extensions are
    /// searched, in this order.
    pub fn access_location(&self, method: &Oid<Bytes>) -> Option<&str> {
        self.authority_info_access.iter().chain(
            self.subject_info_access.iter()
        ).find_map(|item| {
            if item.method == *method {
                Some(item.location.as_str())
            }
            else {
                None
            }
        })
    }
}

/// # Decoding
///
impl TbsCert {
    /// Parses the content of a TBSCertificate sequence.
    ///
    /// ```text
    /// TBSCertificate  ::=  SEQUENCE  {
    ///      version         [0]  EXPLICIT Version DEFAULT v1,
    ///      serialNumber         CertificateSerialNumber,
    ///      signature            AlgorithmIdentifier,
    ///      issuer               Name,
    ///      validity             Validity,
    ///      subject              Name,
    ///      subjectPublicKeyInfo SubjectPublicKeyInfo,
    ///      issuerUniqueID  [1]  IMPLICIT UniqueIdentifier OPTIONAL,
    ///      subjectUniqueID [2]  IMPLICIT UniqueIdentifier OPTIONAL,
    ///      extensions      [3]  EXPLICIT Extensions OPTIONAL
    /// }
    /// ```
    pub fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            // version [0] EXPLICIT Version DEFAULT v1. We only want v3
            // which is 2.
            cons.take_constructed_if(Tag::CTX_0, |c| c.skip_u8_if(2))?;

            let serial_number = Serial::take_from(cons)?;
            let signature = SignatureAlgorithm::x509_take_from(cons)?;
            let issuer = Name::take_from(cons)?;
            let validity = Validity::take_from(cons)?;
            let subject = Name::take_from(cons)?;
            let subject_public_key_info = PublicKey::take_from(cons)?;

            // Unique identifiers are obsolete. We skip them if present.
            cons.take_opt_value_if(Tag::CTX_1, BitString::from_content)?;
            cons.take_opt_value_if(Tag::CTX_2, BitString::from_content)?;

            let mut basic_ca = None;
            let mut path_len = None;
            let mut subject_key_id = None;
            let mut authority_key_id = None;
            let mut alt_names = None;
            let mut aia = None;
            let mut sia = None;
            let mut extensions = Vec::new();

            cons.take_opt_constructed_if(Tag::CTX_3, |c| c.take_sequence(
                |cons| {
                    while let Some(()) = cons.take_opt_sequence(|cons| {
                        let id = Oid::take_from(cons)?;
                        let critical = cons.take_opt_bool()?.unwrap_or(false);
                        let value = OctetString::take_from(cons)?.to_bytes();
                        if Self::is_decoded_extension(&id) {
                            Mode::Der.decode(value.clone(), |content| {
                                if id == oid::CE_BASIC_CONSTRAINTS {
                                    Self::take_basic_constraints(
                                        content, &mut basic_ca, &mut path_len
                                    )
                                } else if id == oid::CE_SUBJECT_KEY_IDENTIFIER {
                                    Self::take_subject_key_identifier(
                                        content, &mut subject_key_id
                                    )
                                } else if id == oid::CE_AUTHORITY_KEY_IDENTIFIER {
                                    Self::take_authority_key_identifier(
                                        content, &mut authority_key_id
                                    )
                                } else if id == oid::CE_SUBJECT_ALT_NAME {
                                    Self::take_subject_alt_name(
                                        content, &mut alt_names
                                    )
                                } else if id == oid::PE_AUTHORITY_INFO_ACCESS {
                                    Self::take_access_descriptions(
                                        content, &mut aia,
                                        "duplicate Authority Information \
                                         Access extension"
                                    )
                                } else {
                                    Self::take_access_descriptions(
                                        content, &mut sia,
                                        "duplicate Subject Information \
                                         Access extension"
                                    )
                                }
                            }).map_err(DecodeError::convert)?;
                        }
                        extensions.push(Extension { id, critical, value });
                        Ok(())
                    })? { }
                    Ok(())
                }
            ))?;

            Ok(TbsCert {
                serial_number,
                signature,
                issuer,
                validity,
                subject,
                subject_public_key_info,
                basic_ca,
                path_len,
                subject_key_identifier: subject_key_id,
                authority_key_identifier: authority_key_id,
                alt_names: alt_names.unwrap_or_default(),
                authority_info_access: aia.unwrap_or_default(),
                subject_info_access: sia.unwrap_or_default(),
                extensions,
            })
        })
    }

    /// Returns whether we decode the content of an extension.
    ///
    /// Everything else is kept in its raw form only. RFC 5280 allows us to
    /// ignore non-critical extensions we don’t know of. Critical extensions
    /// such as key usage are the issuer’s business and are kept, too.
    fn is_decoded_extension(id: &Oid<Bytes>) -> bool {
        *id == oid::CE_BASIC_CONSTRAINTS
            || *id == oid::CE_SUBJECT_KEY_IDENTIFIER
            || *id == oid::CE_AUTHORITY_KEY_IDENTIFIER
            || *id == oid::CE_SUBJECT_ALT_NAME
            || *id == oid::PE_AUTHORITY_INFO_ACCESS
            || *id == oid::PE_SUBJECT_INFO_ACCESS
    }

    /// Parses the Basic Constraints extension.
    ///
    /// ```text
    /// BasicConstraints        ::= SEQUENCE {
    ///     cA                      BOOLEAN DEFAULT FALSE,
    ///     pathLenConstraint       INTEGER (0..MAX) OPTIONAL
    /// }
    /// ```
    fn take_basic_constraints<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        basic_ca: &mut Option<bool>,
        path_len: &mut Option<u64>,
    ) -> Result<(), DecodeError<S::Error>> {
        if basic_ca.is_some() {
            Err(cons.content_err("duplicate Basic Constraints extension"))
        }
        else {
            cons.take_sequence(|cons| {
                *basic_ca = Some(cons.take_opt_bool()?.unwrap_or(false));
                *path_len = cons.take_opt_u64()?;
                Ok(())
            })
        }
    }

    /// Parses the Subject Key Identifier extension.
    ///
    /// ```text
    /// SubjectKeyIdentifier ::= KeyIdentifier
    /// ```
    fn take_subject_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        subject_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), DecodeError<S::Error>> {
        if subject_key_id.is_some() {
            Err(cons.content_err(
                "duplicate Subject Key Identifier extension"
            ))
        }
        else {
            *subject_key_id = Some(KeyIdentifier::take_from(cons)?);
            Ok(())
        }
    }

    /// Parses the Authority Key Identifier extension.
    ///
    /// ```text
    /// AuthorityKeyIdentifier ::= SEQUENCE {
    ///   keyIdentifier             [0] KeyIdentifier           OPTIONAL,
    ///   authorityCertIssuer       [1] GeneralNames            OPTIONAL,
    ///   authorityCertSerialNumber [2] CertificateSerialNumber OPTIONAL  }
    /// ```
    ///
    /// We only care about the key identifier and skip the rest.
    fn take_authority_key_identifier<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        authority_key_id: &mut Option<KeyIdentifier>,
    ) -> Result<(), DecodeError<S::Error>> {
        if authority_key_id.is_some() {
            Err(cons.content_err(
                "duplicate Authority Key Identifier extension"
            ))
        }
        else {
            *authority_key_id = cons.take_sequence(|cons| {
                let id = cons.take_opt_value_if(
                    Tag::CTX_0, KeyIdentifier::from_content
                )?;
                cons.skip_all()?;
                Ok(id)
            })?;
            Ok(())
        }
    }

    /// Parses the Subject Alternative Name extension.
    ///
    /// ```text
    /// SubjectAltName ::= GeneralNames
    ///
    /// GeneralNames ::= SEQUENCE SIZE (1..MAX) OF GeneralName
    ///
    /// GeneralName ::= CHOICE {
    ///      otherName                       [0]     OtherName,
    ///      ... }
    ///
    /// OtherName ::= SEQUENCE {
    ///      type-id    OBJECT IDENTIFIER,
    ///      value      [0] EXPLICIT ANY DEFINED BY type-id }
    /// ```
    ///
    /// MCP only uses `otherName` with string values. All other choices
    /// are skipped.
    fn take_subject_alt_name<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        alt_names: &mut Option<Vec<OtherName>>,
    ) -> Result<(), DecodeError<S::Error>> {
        if alt_names.is_some() {
            return Err(cons.content_err(
                "duplicate Subject Alternative Name extension"
            ))
        }
        *alt_names = Some(cons.take_sequence(|cons| {
            let mut res = Vec::new();
            loop {
                if let Some(name) = cons.take_opt_constructed_if(
                    Tag::CTX_0, OtherName::from_constructed
                )? {
                    res.push(name);
                }
                else if cons.skip_one()?.is_none() {
                    break
                }
            }
            Ok(res)
        })?);
        Ok(())
    }

    /// Parses an information access extension.
    ///
    /// ```text
    /// AuthorityInfoAccessSyntax  ::=
    ///         SEQUENCE SIZE (1..MAX) OF AccessDescription
    ///
    /// AccessDescription  ::=  SEQUENCE {
    ///         accessMethod          OBJECT IDENTIFIER,
    ///         accessLocation        GeneralName  }
    /// ```
    ///
    /// Subject information access has the same syntax. Only locations
    /// given as a uniformResourceIdentifier are kept.
    fn take_access_descriptions<S: decode::Source>(
        cons: &mut decode::Constructed<S>,
        target: &mut Option<Vec<AccessDescription>>,
        duplicate_msg: &'static str,
    ) -> Result<(), DecodeError<S::Error>> {
        if target.is_some() {
            return Err(cons.content_err(duplicate_msg))
        }
        *target = Some(cons.take_sequence(|cons| {
            let mut res = Vec::new();
            while let Some(()) = cons.take_opt_sequence(|cons| {
                let method = Oid::take_from(cons)?;
                let location = cons.take_opt_value_if(Tag::CTX_6, |content| {
                    let uri = Ia5String::from_content(content)?;
                    String::from_utf8(uri.into_bytes().to_vec()).map_err(|_| {
                        content.content_err("invalid URI in access location")
                    })
                })?;
                match location {
                    Some(location) => {
                        res.push(AccessDescription { method, location })
                    }
                    None => {
                        cons.skip_one()?;
                    }
                }
                Ok(())
            })? { }
            Ok(res)
        })?);
        Ok(())
    }
}


//------------ OtherName -----------------------------------------------------

/// An `otherName` entry of the subject alternative name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OtherName {
    /// The type of the name.
    pub id: Oid<Bytes>,

    /// The value of the name.
    pub value: String,
}

impl OtherName {
    fn from_constructed<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        let id = Oid::take_from(cons)?;
        let value = cons.take_constructed_if(Tag::CTX_0, |cons| {
            cons.take_value(|_, content| OctetString::from_content(content))
        })?;
        Ok(OtherName {
            id,
            value: String::from_utf8_lossy(
                value.to_bytes().as_ref()
            ).into_owned(),
        })
    }
}


//------------ AccessDescription ---------------------------------------------

/// An entry of the authority or subject information access extension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessDescription {
    /// The access method.
    pub method: Oid<Bytes>,

    /// The URI of the access location.
    pub location: String,
}


//------------ Extension -----------------------------------------------------

/// A certificate extension in its raw form.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Extension {
    /// The object identifier of the extension.
    pub id: Oid<Bytes>,

    /// Whether the extension is critical.
    pub critical: bool,

    /// The DER encoded value of the extension.
    pub value: Bytes,
}

impl Extension {
    /// Returns the registered name of the extension if it has one.
    pub fn name(&self) -> Option<&'static str> {
        oid::oid_to_dotted(&self.id).as_deref().and_then(oid::name_of)
    }
}


//============ Testing =======================================================
