//! # Owner Signing Keys
//!
//! Ed25519 keys used by an identity to sign its state transitions.
//!
//! | Type | Size | Held by |
//! |------|------|---------|
//! | `Ed25519KeyPair` | 32-byte seed | the writing identity only |
//! | `Ed25519PublicKey` | 32 bytes | embedded in every transition |
//! | `Ed25519Signature` | 64 bytes | embedded in every transition |
//!
//! Signing is deterministic: one key, one message, one signature. The seed
//! never appears in `Debug` output. `ed25519_dalek::SigningKey` wipes its own
//! secret on drop; hex seeds decoded here are wiped after use.

use crate::CryptoError;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroize;

const SEED_LEN: usize = 32;

/// Signing key of a platform identity.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
}

impl Ed25519KeyPair {
    /// Key derived from a 32-byte seed.
    pub fn from_seed(seed: [u8; SEED_LEN]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Key derived from a hex-encoded seed, as read from the environment.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, CryptoError> {
        let mut decoded =
            hex::decode(seed_hex.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        let result = <[u8; SEED_LEN]>::try_from(decoded.as_slice())
            .map(|mut seed| {
                let keypair = Self::from_seed(seed);
                seed.zeroize();
                keypair
            })
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: SEED_LEN,
                actual: decoded.len(),
            });
        decoded.zeroize();
        result
    }

    /// Public half, as published on the identity.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &hex::encode(self.public_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Verifying key carried inside a signed transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ed25519PublicKey([u8; 32]);

impl Ed25519PublicKey {
    /// Parse a key, rejecting points that are not on the curve.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CryptoError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        key.verify(message, &ed25519_dalek::Signature::from_bytes(&signature.0))
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// Detached Ed25519 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ed25519Signature([u8; 64]);

impl Ed25519Signature {
    /// Parse a signature decoded from the wire.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        <[u8; 64]>::try_from(bytes)
            .map(Self)
            .map_err(|_| CryptoError::InvalidSignatureFormat(bytes.len()))
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}
