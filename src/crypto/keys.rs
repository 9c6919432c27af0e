//! Types and parameters of keys.

use std::{error, fmt};
use bcder::{decode, encode};
use bcder::{BitString, Mode, OctetString, Oid, Tag};
use bcder::decode::{DecodeError, IntoSource, Source};
use bcder::encode::{PrimitiveContent, Values};
use bytes::Bytes;
use ring::{digest, signature};
use ring::error::Unspecified;
use crate::oid;
use crate::util::hex;
use super::signature::{Signature, SignatureAlgorithm};


//------------ PublicKeyFormat -----------------------------------------------

/// The formats of public keys found in MCP certificates.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PublicKeyFormat {
    /// An RSA public key.
    Rsa,

    /// An ECDSA public key for the P-256 elliptic curve.
    EcdsaP256,

    /// An ECDSA public key for the P-384 elliptic curve.
    ///
    /// This is what identity registries generally use.
    EcdsaP384,
}

/// # ASN.1 Algorithm Identifiers
///
/// ```txt
/// AlgorithmIdentifier ::= SEQUENCE {
///      algorithm          OBJECT IDENTIFIER,
///      parameters         ANY DEFINED BY algorithm OPTIONAL }
/// ```
///
/// For RSA keys, the object identifier needs to be `rsaEncryption` and the
/// parameters NULL or absent. For ECDSA keys, it is `ecPublicKey` with
/// the named curve as the parameter.
impl PublicKeyFormat {
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let alg = Oid::take_from(cons)?;
            if alg == oid::RSA_ENCRYPTION {
                cons.take_opt_primitive_if(Tag::NULL, |_| Ok(()))?;
                Ok(PublicKeyFormat::Rsa)
            }
            else if alg == oid::EC_PUBLIC_KEY {
                let curve = Oid::take_from(cons)?;
                if curve == oid::SECP256R1 {
                    Ok(PublicKeyFormat::EcdsaP256)
                }
                else if curve == oid::SECP384R1 {
                    Ok(PublicKeyFormat::EcdsaP384)
                }
                else {
                    Err(cons.content_err("unsupported elliptic curve"))
                }
            }
            else {
                Err(cons.content_err("unsupported public key algorithm"))
            }
        })
    }

    /// Provides an encoder for the algorihm identifier.
    pub fn encode(self) -> impl encode::Values {
        match self {
            PublicKeyFormat::Rsa => {
                encode::Choice2::One(
                    encode::sequence((
                        oid::RSA_ENCRYPTION.encode(),
                        ().encode(),
                    ))
                )
            }
            PublicKeyFormat::EcdsaP256 => {
                encode::Choice2::Two(
                    encode::sequence((
                        oid::EC_PUBLIC_KEY.encode(),
                        oid::SECP256R1.encode(),
                    ))
                )
            }
            PublicKeyFormat::EcdsaP384 => {
                encode::Choice2::Two(
                    encode::sequence((
                        oid::EC_PUBLIC_KEY.encode(),
                        oid::SECP384R1.encode(),
                    ))
                )
            }
        }
    }

    /// Returns the name of the curve as used by JSON Web Keys.
    pub fn curve(self) -> Option<&'static str> {
        match self {
            PublicKeyFormat::Rsa => None,
            PublicKeyFormat::EcdsaP256 => Some("P-256"),
            PublicKeyFormat::EcdsaP384 => Some("P-384"),
        }
    }

    /// Returns the format for a JSON Web Key curve name.
    pub fn from_curve(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(PublicKeyFormat::EcdsaP256),
            "P-384" => Some(PublicKeyFormat::EcdsaP384),
            _ => None
        }
    }
}


//------------ PublicKey -----------------------------------------------------

/// A public key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicKey {
    algorithm: PublicKeyFormat,
    bits: Bytes,
}

impl PublicKey {
    pub fn new(algorithm: PublicKeyFormat, bits: Bytes) -> Self {
        PublicKey { algorithm, bits }
    }

    /// Returns the algorithm of this public key.
    pub fn algorithm(&self) -> PublicKeyFormat {
        self.algorithm
    }

    /// Returns the bits of this public key.
    ///
    /// For ECDSA keys, this is the uncompressed curve point.
    pub fn bits(&self) -> &[u8] {
        self.bits.as_ref()
    }

    /// Returns a key identifier for this key.
    ///
    /// The identifier will be the SHA1 hash of the key’s bits.
    pub fn key_identifier(&self) -> KeyIdentifier {
        KeyIdentifier(Bytes::copy_from_slice(
            digest::digest(
                &digest::SHA1_FOR_LEGACY_USE_ONLY, self.bits()
            ).as_ref()
        ))
    }

    /// Verifies an X.509 signature using this public key.
    pub fn verify(
        &self, message: &[u8], signature: &Signature
    ) -> Result<(), VerificationError> {
        let alg = self.verification_algorithm(
            signature.algorithm()
        ).ok_or(VerificationError)?;
        signature::UnparsedPublicKey::new(alg, self.bits()).verify(
            message, signature.value().as_ref()
        ).map_err(Into::into)
    }

    /// Returns whether the key can verify signatures of the algorithm.
    pub fn supports(&self, algorithm: SignatureAlgorithm) -> bool {
        self.verification_algorithm(algorithm).is_some()
    }

    fn verification_algorithm(
        &self,
        algorithm: SignatureAlgorithm,
    ) -> Option<&'static dyn signature::VerificationAlgorithm> {
        use self::PublicKeyFormat::*;
        use super::signature::SignatureAlgorithm::*;

        Some(match (self.algorithm, algorithm) {
            (EcdsaP256, EcdsaSha256) => {
                &signature::ECDSA_P256_SHA256_ASN1
            }
            (EcdsaP256, EcdsaSha384) => {
                &signature::ECDSA_P256_SHA384_ASN1
            }
            (EcdsaP384, EcdsaSha256) => {
                &signature::ECDSA_P384_SHA256_ASN1
            }
            (EcdsaP384, EcdsaSha384) => {
                &signature::ECDSA_P384_SHA384_ASN1
            }
            (Rsa, RsaSha256) => {
                &signature::RSA_PKCS1_2048_8192_SHA256
            }
            _ => return None
        })
    }
}


/// # As `SubjectPublicKeyInfo`
///
/// Public keys are included in X.509 certificates as `SubjectPublicKeyInfo`
/// structures. As these contain the same information as `PublicKey`,
/// it can be decoded from and encoded to such sequences.
impl PublicKey {
    pub fn decode<S: IntoSource>(
        source: S
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            Ok(PublicKey {
                algorithm: PublicKeyFormat::take_from(cons)?,
                bits: BitString::take_from(cons)?.octet_bytes(),
            })
        })
    }

    pub fn encode_ref(&self) -> impl encode::Values + '_ {
        encode::sequence((
            self.algorithm.encode(),
            BitString::new(0, self.bits.clone()).encode(),
        ))
    }

    /// Returns a bytes values of the encoded the *subjectPublicKeyInfo*.
    pub fn to_info_bytes(&self) -> Bytes {
        self.encode_ref().to_captured(Mode::Der).into_bytes()
    }
}


//------------ KeyIdentifier -------------------------------------------------

/// A key identifier.
///
/// Identifiers created by us are the SHA-1 hash over the public key’s bits.
/// Identifiers found in certificates are taken as they are.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct KeyIdentifier(Bytes);

impl KeyIdentifier {
    pub fn new(octets: Bytes) -> Self {
        KeyIdentifier(octets)
    }

    /// Returns an octet slice of the key identifer’s value.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Takes an encoded key identifier from a constructed value.
    ///
    /// ```text
    /// KeyIdentifier ::= OCTET STRING
    /// ```
    pub fn take_from<S: decode::Source>(
        cons: &mut decode::Constructed<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        OctetString::take_from(cons).map(|id| KeyIdentifier(id.to_bytes()))
    }

    /// Parses an encoded key identifer from encoded content.
    pub fn from_content<S: decode::Source>(
        content: &mut decode::Content<S>
    ) -> Result<Self, DecodeError<S::Error>> {
        OctetString::from_content(content).map(|id| {
            KeyIdentifier(id.to_bytes())
        })
    }
}

impl AsRef<[u8]> for KeyIdentifier {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&hex::Colons(self.as_slice()), f)
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KeyIdentifier({})", self)
    }
}

impl PrimitiveContent for KeyIdentifier {
    const TAG: Tag = Tag::OCTET_STRING;

    fn encoded_len(&self, _mode: Mode) -> usize {
        self.0.len()
    }

    fn write_encoded<W: std::io::Write>(
        &self,
        _mode: Mode,
        target: &mut W
    ) -> Result<(), std::io::Error> {
        target.write_all(self.0.as_ref())
    }
}


//------------ VerificationError ---------------------------------------------

/// An error happened while verifying a signature.
///
/// No further information is provided. This is on purpose.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VerificationError;

impl From<Unspecified> for VerificationError {
    fn from(_: Unspecified) -> Self {
        VerificationError
    }
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("signature verification failed")
    }
}

impl error::Error for VerificationError { }


//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::softsigner::KeyPair;

    #[test]
    fn info_round_trip() {
        for format in [PublicKeyFormat::EcdsaP256, PublicKeyFormat::EcdsaP384] {
            let key = KeyPair::generate(format).unwrap().public_key();
            let decoded = PublicKey::decode(key.to_info_bytes()).unwrap();
            assert_eq!(decoded, key);
            assert_eq!(decoded.algorithm(), format);
        }
    }

    #[test]
    fn verify_signatures() {
        let pair = KeyPair::generate(PublicKeyFormat::EcdsaP384).unwrap();
        let other = KeyPair::generate(PublicKeyFormat::EcdsaP384).unwrap();
        let key = pair.public_key();

        let signature = pair.sign(b"foobar").unwrap();
        assert!(key.verify(b"foobar", &signature).is_ok());
        assert!(key.verify(b"barfoo", &signature).is_err());
        assert!(other.public_key().verify(b"foobar", &signature).is_err());

        assert_eq!(pair.sign_fixed(b"foobar").unwrap().len(), 96);
    }

    #[test]
    fn key_identifier() {
        let key = KeyPair::generate(
            PublicKeyFormat::EcdsaP256
        ).unwrap().public_key();
        let id = key.key_identifier();
        assert_eq!(id.as_slice().len(), 20);
        assert_eq!(id.to_string().len(), 59);
    }
}
