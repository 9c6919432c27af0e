//! A signer atop the ring library.
//!
//! Keys are kept in memory. This is all that is needed to issue test
//! certificates, to sign attestations, and to run a small MIR.

use std::{error, fmt};
use bytes::Bytes;
use ring::rand;
use ring::signature::{self, EcdsaKeyPair, KeyPair as _};
use super::keys::{PublicKey, PublicKeyFormat};
use super::signature::{Signature, SignatureAlgorithm};


//------------ KeyPair -------------------------------------------------------

/// An ECDSA key pair held in memory.
///
/// ring binds a key pair to the encoding of the signatures it creates.
/// Because certificates need DER encoded signatures while JSON Web
/// Signatures need them in fixed-length form, we keep two pairs made from
/// the same private key.
pub struct KeyPair {
    format: PublicKeyFormat,
    asn1: EcdsaKeyPair,
    fixed: EcdsaKeyPair,
    rng: rand::SystemRandom,
}

impl KeyPair {
    /// Creates a new random key pair.
    pub fn generate(format: PublicKeyFormat) -> Result<Self, SigningError> {
        let rng = rand::SystemRandom::new();
        let (asn1, _) = Self::algorithms(format)?;
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(
            asn1, &rng
        ).map_err(|_| SigningError::Sign)?;
        Self::from_pkcs8_with_rng(format, pkcs8.as_ref(), rng)
    }

    /// Imports a key pair from a PKCS #8 document.
    pub fn from_pkcs8(
        format: PublicKeyFormat, pkcs8: &[u8]
    ) -> Result<Self, SigningError> {
        Self::from_pkcs8_with_rng(format, pkcs8, rand::SystemRandom::new())
    }

    fn from_pkcs8_with_rng(
        format: PublicKeyFormat, pkcs8: &[u8], rng: rand::SystemRandom,
    ) -> Result<Self, SigningError> {
        let (asn1, fixed) = Self::algorithms(format)?;
        Ok(KeyPair {
            format,
            asn1: EcdsaKeyPair::from_pkcs8(asn1, pkcs8, &rng)?,
            fixed: EcdsaKeyPair::from_pkcs8(fixed, pkcs8, &rng)?,
            rng,
        })
    }

    /// Imports a key pair from the raw components of an EC key.
    ///
    /// `d` is the private scalar, `x` and `y` the coordinates of the
    /// public point, all as big-endian octets. This is what JSON Web Keys
    /// carry.
    pub fn from_ec_components(
        format: PublicKeyFormat, d: &[u8], x: &[u8], y: &[u8]
    ) -> Result<Self, SigningError> {
        let (asn1, fixed) = Self::algorithms(format)?;
        let mut point = Vec::with_capacity(1 + x.len() + y.len());
        point.push(0x04);
        point.extend_from_slice(x);
        point.extend_from_slice(y);
        let rng = rand::SystemRandom::new();
        Ok(KeyPair {
            format,
            asn1: EcdsaKeyPair::from_private_key_and_public_key(
                asn1, d, &point, &rng
            )?,
            fixed: EcdsaKeyPair::from_private_key_and_public_key(
                fixed, d, &point, &rng
            )?,
            rng,
        })
    }

    fn algorithms(
        format: PublicKeyFormat
    ) -> Result<
        (
            &'static signature::EcdsaSigningAlgorithm,
            &'static signature::EcdsaSigningAlgorithm
        ),
        SigningError
    > {
        match format {
            PublicKeyFormat::EcdsaP256 => Ok((
                &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
                &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            )),
            PublicKeyFormat::EcdsaP384 => Ok((
                &signature::ECDSA_P384_SHA384_ASN1_SIGNING,
                &signature::ECDSA_P384_SHA384_FIXED_SIGNING,
            )),
            PublicKeyFormat::Rsa => Err(SigningError::UnsupportedAlgorithm),
        }
    }

    pub fn format(&self) -> PublicKeyFormat {
        self.format
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(
            self.format,
            Bytes::copy_from_slice(self.asn1.public_key().as_ref())
        )
    }

    /// Returns the algorithm signatures of this key are made with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::for_key_format(self.format)
    }

    /// Signs data producing a DER encoded signature.
    pub fn sign(&self, data: &[u8]) -> Result<Signature, SigningError> {
        let signature = self.asn1.sign(
            &self.rng, data
        ).map_err(|_| SigningError::Sign)?;
        Ok(Signature::new(
            self.signature_algorithm(),
            Bytes::copy_from_slice(signature.as_ref())
        ))
    }

    /// Signs data producing a fixed-length signature.
    pub fn sign_fixed(&self, data: &[u8]) -> Result<Bytes, SigningError> {
        let signature = self.fixed.sign(
            &self.rng, data
        ).map_err(|_| SigningError::Sign)?;
        Ok(Bytes::copy_from_slice(signature.as_ref()))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("format", &self.format)
            .field("public_key", &self.public_key())
            .finish()
    }
}


//------------ SigningError --------------------------------------------------

/// An error happened while creating keys or signing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SigningError {
    /// The key format cannot be used for signing here.
    UnsupportedAlgorithm,

    /// The key material was rejected.
    InvalidKey,

    /// Creating the signature failed.
    Sign,

    /// The signed object could not be assembled.
    Encode,
}

impl From<ring::error::KeyRejected> for SigningError {
    fn from(_: ring::error::KeyRejected) -> Self {
        SigningError::InvalidKey
    }
}

impl fmt::Display for SigningError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            SigningError::UnsupportedAlgorithm => "unsupported key algorithm",
            SigningError::InvalidKey => "invalid key",
            SigningError::Sign => "signing failed",
            SigningError::Encode => "failed to encode signed object",
        })
    }
}

impl error::Error for SigningError { }


//============ Testing =======================================================
