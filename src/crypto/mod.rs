//! Keys, signatures, and signing.

pub use self::keys::{
    KeyIdentifier, PublicKey, PublicKeyFormat, VerificationError
};
pub use self::signature::{Signature, SignatureAlgorithm};
pub use self::softsigner::{KeyPair, SigningError};

pub mod keys;
pub mod signature;
pub mod softsigner;
