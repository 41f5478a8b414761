use p192::ecdsa::signature::{Signer, Verifier};
use p192::ecdsa::{Signature, SigningKey, VerifyingKey};
use p192::EncodedPoint;
use rand::rngs::OsRng;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Error, Formatter};
use std::str::FromStr;
use thiserror::Error;

// NIST P-192: 24-byte scalars, so raw public keys (X || Y) and raw
// signatures (r || s) are both 48 bytes / 96 hex characters.
pub const PUBLIC_KEY_SIZE: usize = 48;
pub const SIGNATURE_SIZE: usize = 48;
pub const PRIVATE_KEY_SIZE: usize = 24;

#[derive(Debug, Error, PartialEq)]
pub enum CryptoError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Uncompressed P-192 point without the SEC1 tag byte. Accounts, miners and
/// balance-map keys are all public keys in this form.
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Debug)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for PublicKey {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| "Invalid hex string")?;
        let bytes: [u8; PUBLIC_KEY_SIZE] =
            bytes.try_into().map_err(|_| "Invalid public key")?;
        Ok(PublicKey::new(bytes))
    }
}

impl std::hash::Hash for PublicKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_str(&hex).map_err(SerdeError::custom)
    }
}

fn encode_verifying_key(key: &VerifyingKey) -> PublicKey {
    let point = key.to_encoded_point(false);
    // skip the SEC1 0x04 tag, keep X || Y
    let mut bytes = [0u8; PUBLIC_KEY_SIZE];
    bytes.copy_from_slice(&point.as_bytes()[1..]);
    PublicKey(bytes)
}

fn decode_verifying_key(key: &PublicKey) -> Result<VerifyingKey, CryptoError> {
    let mut sec1 = [0u8; PUBLIC_KEY_SIZE + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(&key.0);
    let point =
        EncodedPoint::from_bytes(sec1).map_err(|_| CryptoError::InvalidPublicKey)?;
    VerifyingKey::from_encoded_point(&point).map_err(|_| CryptoError::InvalidPublicKey)
}

fn signing_key_from_hex(private_key: &str) -> Result<SigningKey, CryptoError> {
    let bytes = hex::decode(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
    if bytes.len() != PRIVATE_KEY_SIZE {
        return Err(CryptoError::InvalidPrivateKey);
    }
    SigningKey::from_slice(&bytes).map_err(|_| CryptoError::InvalidPrivateKey)
}

/// Generates a fresh keypair: (private key hex, public key).
pub fn generate_keypair() -> (String, PublicKey) {
    let signing_key = SigningKey::random(&mut OsRng);
    let public_key = encode_verifying_key(signing_key.verifying_key());
    (hex::encode(signing_key.to_bytes()), public_key)
}

/// Derives the public key belonging to a hex-encoded private key.
pub fn public_key_for(private_key: &str) -> Result<PublicKey, CryptoError> {
    let signing_key = signing_key_from_hex(private_key)?;
    Ok(encode_verifying_key(signing_key.verifying_key()))
}

/// Signs UTF-8 content with the given private key; returns the 48-byte
/// signature hex encoded.
pub fn sign(content: &str, private_key: &str) -> Result<String, CryptoError> {
    let signing_key = signing_key_from_hex(private_key)?;
    let signature: Signature = signing_key.sign(content.as_bytes());
    Ok(hex::encode(signature.to_bytes()))
}

/// Returns whether the signature is valid for the given content and public
/// key. Any decode failure counts as an invalid signature.
pub fn verify(content: &str, public_key: &PublicKey, signature: &str) -> bool {
    let Ok(verifying_key) = decode_verifying_key(public_key) else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    verifying_key
        .verify(content.as_bytes(), &signature)
        .is_ok()
}
