//! Issuing certificates.

use bcder::encode;
use bcder::{BitString, Captured, Mode, OctetString, Oid, Tag};
use bcder::encode::PrimitiveContent;
use bytes::Bytes;
use crate::crypto::{KeyIdentifier, KeyPair, PublicKey, SigningError};
use crate::oid;
use crate::x509::{encode_extension, Name, Serial, SignedData, Validity};
use super::{AccessDescription, Cert, OtherName};


//------------ CertBuilder ---------------------------------------------------

/// Assembles the content of a certificate and signs it.
#[derive(Clone, Debug)]
pub struct CertBuilder {
    //--- TBSCertificate

    //  Version.
    //
    //  This is always present and v3, which really is 2.

    /// Serial number.
    serial_number: Serial,

    /// Issuer.
    ///
    /// This needs to be identical to the subject of the issuing certificate.
    /// The name should carry the MRN of the issuer in its UID attribute.
    issuer: Name,

    /// Subject.
    ///
    /// The name should carry the MRN of the subject in its UID attribute.
    subject: Name,

    /// Validity.
    validity: Validity,

    //  Subject Public Key Info
    //
    //  This is taken as an argument when signing.

    //--- Extensions

    /// Basic Constraints.
    ///
    /// Critical if present. We remember whether we are making a CA
    /// certificate and its path length constraint.
    ca: bool,
    path_len: Option<u64>,

    //  Subject Key Identifier
    //
    //  Non-critical and always present. It is the SHA1 of the BIT STRING
    //  of the subject public key, so we take it from there.

    /// Authority Key Identifier.
    ///
    /// Should be present except in self-signed certificates.
    authority_key_identifier: Option<KeyIdentifier>,

    //  Key Usage
    //
    //  Critical. For CA certificates, keyCertSign and cRLSign are set, for
    //  all others the digitalSignature bit.

    /// The `otherName` entries of the Subject Alternative Name.
    alt_names: Vec<OtherName>,

    /// Authority Information Access.
    ///
    /// MCP uses this for the OCSP responder and the x5u bundle.
    authority_info_access: Vec<AccessDescription>,

    /// Subject Information Access.
    ///
    /// MCP uses this for the MATP endpoint.
    subject_info_access: Vec<AccessDescription>,
}

impl CertBuilder {
    pub fn new(
        serial_number: Serial,
        issuer: Name,
        subject: Name,
        validity: Validity,
    ) -> Self {
        CertBuilder {
            serial_number,
            issuer,
            subject,
            validity,
            ca: false,
            path_len: None,
            authority_key_identifier: None,
            alt_names: Vec::new(),
            authority_info_access: Vec::new(),
            subject_info_access: Vec::new(),
        }
    }

    /// Makes this a CA certificate with an optional path length.
    pub fn ca(&mut self, path_len: Option<u64>) -> &mut Self {
        self.ca = true;
        self.path_len = path_len;
        self
    }

    pub fn authority_key_identifier(
        &mut self, id: KeyIdentifier
    ) -> &mut Self {
        self.authority_key_identifier = Some(id);
        self
    }

    /// Adds an `otherName` subject alternative name.
    pub fn alt_name(
        &mut self, id: Oid<Bytes>, value: impl Into<String>
    ) -> &mut Self {
        self.alt_names.push(OtherName { id, value: value.into() });
        self
    }

    /// Adds an authority information access entry.
    pub fn authority_access(
        &mut self, method: Oid<Bytes>, location: impl Into<String>
    ) -> &mut Self {
        self.authority_info_access.push(AccessDescription {
            method, location: location.into()
        });
        self
    }

    /// Adds a subject information access entry.
    pub fn subject_access(
        &mut self, method: Oid<Bytes>, location: impl Into<String>
    ) -> &mut Self {
        self.subject_info_access.push(AccessDescription {
            method, location: location.into()
        });
        self
    }

    /// Adds the location of the OCSP responder.
    pub fn ocsp(&mut self, uri: impl Into<String>) -> &mut Self {
        self.authority_access(Oid(Bytes::from_static(oid::AD_OCSP.0)), uri)
    }

    /// Adds the location of the PEM bundle for the subject.
    pub fn x5u(&mut self, uri: impl Into<String>) -> &mut Self {
        match oid::by_name("x5u") {
            Some(method) => self.authority_access(method, uri),
            None => self
        }
    }

    /// Adds the location of the subject’s MATP endpoint.
    pub fn matp(&mut self, uri: impl Into<String>) -> &mut Self {
        match oid::by_name("matp") {
            Some(method) => self.subject_access(method, uri),
            None => self
        }
    }

    /// Signs the certificate with the issuer’s key.
    ///
    /// `public_key` is the key of the subject. For self-signed
    /// certificates, this is the public key of `issuer_key`.
    pub fn into_cert(
        self,
        public_key: &PublicKey,
        issuer_key: &KeyPair,
    ) -> Result<Cert, SigningError> {
        let tbs = self.encode_tbs_cert(issuer_key, public_key);
        let signature = issuer_key.sign(tbs.as_slice())?;
        let signed = SignedData::new(tbs, signature);
        Cert::decode(
            Captured::from_values(Mode::Der, signed.encode_ref()).into_bytes()
        ).map_err(|_| SigningError::Encode)
    }

    fn encode_tbs_cert(
        &self,
        issuer_key: &KeyPair,
        public_key: &PublicKey,
    ) -> Captured {
        Captured::from_values(Mode::Der, encode::sequence((
            encode::sequence_as(Tag::CTX_0, 2.encode()), // version
            self.serial_number.encode_ref(),
            issuer_key.signature_algorithm().x509_encode(),
            self.issuer.encode_ref(),
            self.validity.encode(),
            self.subject.encode_ref(),
            public_key.encode_ref(),
            // no issuerUniqueID, no subjectUniqueID
            encode::sequence_as(Tag::CTX_3, encode::sequence((
                // Basic Constraints
                if self.ca {
                    Some(encode_extension(
                        &oid::CE_BASIC_CONSTRAINTS, true,
                        encode::sequence((
                            true.encode(),
                            self.path_len.map(|len| len.encode()),
                        ))
                    ))
                }
                else { None },

                // Subject Key Identifier
                encode_extension(
                    &oid::CE_SUBJECT_KEY_IDENTIFIER, false,
                    public_key.key_identifier().encode()
                ),

                // Authority Key Identifier
                self.authority_key_identifier.as_ref().map(|id| {
                    encode_extension(
                        &oid::CE_AUTHORITY_KEY_IDENTIFIER, false,
                        encode::sequence(id.encode_ref_as(Tag::CTX_0))
                    )
                }),

                // Key Usage
                encode_extension(
                    &oid::CE_KEY_USAGE, true,
                    if self.ca {
                        // Bits 5 and 6 must be set.
                        BitString::new(1, Bytes::from_static(b"\x06"))
                            .encode()
                    }
                    else {
                        // Bit 0 must be set.
                        BitString::new(7, Bytes::from_static(b"\x80"))
                            .encode()
                    }
                ),

                // Subject Alternative Name
                if self.alt_names.is_empty() {
                    None
                }
                else {
                    Some(encode_extension(
                        &oid::CE_SUBJECT_ALT_NAME, false,
                        encode::sequence(encode::iter(
                            self.alt_names.iter().map(|name| {
                                encode::sequence_as(Tag::CTX_0, (
                                    name.id.encode_ref(),
                                    encode::sequence_as(Tag::CTX_0,
                                        encode_string(
                                            &name.value, Tag::UTF8_STRING
                                        )
                                    )
                                ))
                            })
                        ))
                    ))
                },

                // Authority Information Access
                encode_access(
                    &oid::PE_AUTHORITY_INFO_ACCESS,
                    &self.authority_info_access
                ),

                // Subject Information Access
                encode_access(
                    &oid::PE_SUBJECT_INFO_ACCESS,
                    &self.subject_info_access
                ),
            )))
        )))
    }
}


fn encode_string(value: &str, tag: Tag) -> impl encode::Values {
    OctetString::new(Bytes::copy_from_slice(value.as_bytes())).encode_as(tag)
}

fn encode_access<'a>(
    id: &'static bcder::ConstOid,
    items: &'a [AccessDescription],
) -> Option<impl encode::Values + 'a> {
    if items.is_empty() {
        return None
    }
    Some(encode_extension(
        id, false,
        encode::sequence(encode::iter(
            items.iter().map(|item| {
                encode::sequence((
                    item.method.encode_ref(),
                    encode_string(&item.location, Tag::CTX_6),
                ))
            })
        ))
    ))
}


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeDelta;
    use crate::crypto::PublicKeyFormat;

    #[test]
    fn issue_chain() {
        let root_key = KeyPair::generate(PublicKeyFormat::EcdsaP384).unwrap();
        let root_name = Name::from_attributes(&[
            (&oid::AT_UID, "urn:mrn:mcp:id:mir"),
        ]);
        let mut builder = CertBuilder::new(
            Serial::from(1), root_name.clone(), root_name.clone(),
            Validity::from_duration(TimeDelta::days(365)),
        );
        builder.ca(None);
        let root = builder.into_cert(
            &root_key.public_key(), &root_key
        ).unwrap();

        let leaf_key = KeyPair::generate(PublicKeyFormat::EcdsaP256).unwrap();
        let mut builder = CertBuilder::new(
            Serial::from(2), root_name,
            Name::from_attributes(&[
                (&oid::AT_UID, "urn:mrn:mcp:id:mir:vessel"),
            ]),
            Validity::from_duration(TimeDelta::days(30)),
        );
        builder
            .authority_key_identifier(root_key.public_key().key_identifier())
            .matp("https://example.com/matp");
        let leaf = builder.into_cert(
            &leaf_key.public_key(), &root_key
        ).unwrap();

        assert!(root.is_ca());
        assert!(!leaf.is_ca());
        assert_eq!(leaf.basic_ca(), None);
        assert_eq!(leaf.issuer(), root.subject());
        assert_eq!(
            leaf.authority_key_identifier(), root.subject_key_identifier()
        );
        assert_eq!(
            leaf.subject_public_key_info(), &leaf_key.public_key()
        );
        assert!(leaf.verify_signature(&root_key.public_key()).is_ok());
        assert!(leaf.verify_signature(&leaf_key.public_key()).is_err());
        assert_eq!(
            leaf.access_location(&oid::by_name("matp").unwrap()),
            Some("https://example.com/matp")
        );
        assert!(leaf.authority_info_access().is_empty());
    }
}
