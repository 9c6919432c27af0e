//! Signature algorithms and operations.

use std::fmt;
use bcder::{decode, encode};
use bcder::decode::DecodeError;
use bcder::encode::PrimitiveContent;
use bcder::{Oid, Tag};
use bytes::Bytes;
use crate::oid;
use super::keys::PublicKeyFormat;


//------------ SignatureAlgorithm --------------------------------------------

/// The signature algorithms used by MCP certificates.
///
/// Identity registries issue certificates signed with ECDSA, mostly on the
/// P-384 curve. Older deployments used RSA with SHA-256 which we still
/// accept when verifying.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SignatureAlgorithm {
    /// ECDSA with SHA-256, usually on the P-256 curve.
    EcdsaSha256,

    /// ECDSA with SHA-384, usually on the P-384 curve.
    EcdsaSha384,

    /// RSA PKCS #1 version 1.5 with SHA-256.
    RsaSha256,
}

/// # ASN.1 Values
///
/// ```txt
/// AlgorithmIdentifier          ::= SEQUENCE {
///      algorithm                   OBJECT IDENTIFIER,
///      parameters                  ANY DEFINED BY algorithm OPTIONAL }
/// ```
///
/// For the ECDSA algorithms, RFC 5758 requires the parameters to be
/// absent. For RSA they are NULL but we also accept them missing.
impl SignatureAlgorithm {
    /// Takes a signature algorithm identifier from X.509 signed data.
    pub fn x509_take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let alg = Oid::take_from(cons)?;
            let res = if alg == oid::ECDSA_WITH_SHA256 {
                SignatureAlgorithm::EcdsaSha256
            }
            else if alg == oid::ECDSA_WITH_SHA384 {
                SignatureAlgorithm::EcdsaSha384
            }
            else if alg == oid::SHA256_WITH_RSA_ENCRYPTION {
                SignatureAlgorithm::RsaSha256
            }
            else {
                return Err(cons.content_err("invalid signature algorithm"))
            };
            cons.take_opt_primitive_if(Tag::NULL, |_| Ok(()))?;
            Ok(res)
        })
    }

    /// Provides an encoder for X.509 objects.
    pub fn x509_encode(self) -> impl encode::Values {
        match self {
            SignatureAlgorithm::EcdsaSha256 => {
                encode::Choice2::One(
                    encode::sequence(oid::ECDSA_WITH_SHA256.encode())
                )
            }
            SignatureAlgorithm::EcdsaSha384 => {
                encode::Choice2::One(
                    encode::sequence(oid::ECDSA_WITH_SHA384.encode())
                )
            }
            SignatureAlgorithm::RsaSha256 => {
                encode::Choice2::Two(
                    encode::sequence((
                        oid::SHA256_WITH_RSA_ENCRYPTION.encode(),
                        ().encode(),
                    ))
                )
            }
        }
    }

    /// Returns the signature algorithm a key format signs with by default.
    pub fn for_key_format(format: PublicKeyFormat) -> Self {
        match format {
            PublicKeyFormat::EcdsaP256 => SignatureAlgorithm::EcdsaSha256,
            PublicKeyFormat::EcdsaP384 => SignatureAlgorithm::EcdsaSha384,
            PublicKeyFormat::Rsa => SignatureAlgorithm::RsaSha256,
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SignatureAlgorithm::EcdsaSha256 => "ecdsa-with-SHA256",
            SignatureAlgorithm::EcdsaSha384 => "ecdsa-with-SHA384",
            SignatureAlgorithm::RsaSha256 => "sha256WithRSAEncryption",
        })
    }
}


//------------ Signature -----------------------------------------------------

/// A signature together with the algorithm used to create it.
///
/// For ECDSA, the value is DER encoded as required by X.509.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signature {
    algorithm: SignatureAlgorithm,
    value: Bytes
}

impl Signature {
    pub fn new(algorithm: SignatureAlgorithm, value: Bytes) -> Self {
        Signature { algorithm, value }
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn unwrap(self) -> (SignatureAlgorithm, Bytes) {
        (self.algorithm, self.value)
    }
}


//============ Testing =======================================================
