//!
//! Pure Rust provider backed by the RustCrypto `p256` and `ed25519-dalek` crates.
//!
use der::oid::ObjectIdentifier;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};

use crate::{
    codec,
    error::ProviderError,
    keychain::{KeyPair, PrivateKey, PublicKey},
    oid,
    provider::{CryptoProvider, KeyAlgorithm, SignatureAlgorithm},
};

const DEFAULT_PBKDF2_ITERATIONS: u32 = 10000;

/// Software implementation of [CryptoProvider]
#[derive(Debug, Clone)]
pub struct SoftwareProvider {
    pbkdf2_iterations: u32,
}

impl Default for SoftwareProvider {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl SoftwareProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set PBKDF2 iterations used for private key encryption. Default is 10000
    pub fn pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }
}

enum SoftKey {
    P256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl SoftKey {
    fn from_private_key(key: &PrivateKey) -> Result<Self, ProviderError> {
        match key.oid() {
            oid::EC_PUBLIC_KEY_OID => Ok(SoftKey::P256(
                p256::ecdsa::SigningKey::from_pkcs8_der(key.as_der())
                    .map_err(|e| ProviderError::InvalidKey(e.to_string()))?,
            )),
            oid::ED25519_OID => Ok(SoftKey::Ed25519(
                ed25519_dalek::SigningKey::from_pkcs8_der(key.as_der())
                    .map_err(|e| ProviderError::InvalidKey(e.to_string()))?,
            )),
            other => Err(ProviderError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn generate(algorithm: KeyAlgorithm) -> Result<Self, ProviderError> {
        match algorithm {
            KeyAlgorithm::EcP256 => {
                // a random scalar is out of range with negligible probability
                loop {
                    let bytes = zeroize::Zeroizing::new(rand::random::<[u8; 32]>());
                    if let Ok(key) = p256::ecdsa::SigningKey::from_slice(bytes.as_slice()) {
                        break Ok(SoftKey::P256(key));
                    }
                }
            }
            KeyAlgorithm::Ed25519 => {
                let bytes = zeroize::Zeroizing::new(rand::random::<[u8; 32]>());
                Ok(SoftKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&bytes)))
            }
        }
    }

    fn private_key(&self) -> Result<PrivateKey, ProviderError> {
        let document = match self {
            SoftKey::P256(key) => key.to_pkcs8_der(),
            SoftKey::Ed25519(key) => key.to_pkcs8_der(),
        }
        .map_err(|e| ProviderError::InvalidKey(e.to_string()))?;

        PrivateKey::from_der(document.as_bytes()).map_err(|e| ProviderError::InvalidKey(e.to_string()))
    }

    fn public_key(&self) -> Result<PublicKey, ProviderError> {
        let (document, oid) = match self {
            SoftKey::P256(key) => (key.verifying_key().to_public_key_der(), oid::EC_PUBLIC_KEY_OID),
            SoftKey::Ed25519(key) => (key.verifying_key().to_public_key_der(), oid::ED25519_OID),
        };
        let document = document.map_err(|e| ProviderError::InvalidKey(e.to_string()))?;

        Ok(PublicKey {
            data: document.as_bytes().to_vec(),
            oid,
        })
    }
}

impl CryptoProvider for SoftwareProvider {
    fn name(&self) -> &'static str {
        "software"
    }

    fn generate_key_pair(&self, algorithm: KeyAlgorithm) -> Result<KeyPair, ProviderError> {
        let key = SoftKey::generate(algorithm)?;
        Ok(KeyPair::new(key.private_key()?, key.public_key()?))
    }

    fn public_key(&self, key: &PrivateKey) -> Result<PublicKey, ProviderError> {
        SoftKey::from_private_key(key)?.public_key()
    }

    fn sign(&self, key: &PrivateKey, algorithm: SignatureAlgorithm, message: &[u8]) -> Result<Vec<u8>, ProviderError> {
        match (SoftKey::from_private_key(key)?, algorithm) {
            (SoftKey::P256(key), SignatureAlgorithm::EcdsaSha256) => {
                use p256::ecdsa::signature::Signer;

                let signature: p256::ecdsa::Signature =
                    key.try_sign(message).map_err(|e| ProviderError::InvalidKey(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            (SoftKey::Ed25519(key), SignatureAlgorithm::Ed25519) => {
                use ed25519_dalek::Signer;

                let signature = key.try_sign(message).map_err(|e| ProviderError::InvalidKey(e.to_string()))?;
                Ok(signature.to_bytes().to_vec())
            }
            _ => Err(ProviderError::KeyMismatch),
        }
    }

    fn verify(
        &self,
        key: &PublicKey,
        algorithm: ObjectIdentifier,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError> {
        match algorithm {
            oid::ECDSA_WITH_SHA256_OID => {
                use p256::ecdsa::signature::Verifier;

                if key.oid() != oid::EC_PUBLIC_KEY_OID {
                    return Err(ProviderError::KeyMismatch);
                }
                let verifying_key = p256::ecdsa::VerifyingKey::from_public_key_der(key.as_der())
                    .map_err(|e| ProviderError::InvalidKey(e.to_string()))?;
                let signature =
                    p256::ecdsa::Signature::from_der(signature).map_err(|_| ProviderError::InvalidSignature)?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| ProviderError::InvalidSignature)
            }
            oid::ED25519_OID => {
                use ed25519_dalek::Verifier;

                if key.oid() != oid::ED25519_OID {
                    return Err(ProviderError::KeyMismatch);
                }
                let verifying_key = ed25519_dalek::VerifyingKey::from_public_key_der(key.as_der())
                    .map_err(|e| ProviderError::InvalidKey(e.to_string()))?;
                let signature =
                    ed25519_dalek::Signature::from_slice(signature).map_err(|_| ProviderError::InvalidSignature)?;
                verifying_key
                    .verify(message, &signature)
                    .map_err(|_| ProviderError::InvalidSignature)
            }
            other => Err(ProviderError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    fn encrypt_private_key(&self, key: &PrivateKey, password: &str) -> Result<Vec<u8>, ProviderError> {
        codec::encrypt_private_key_info(key.as_der(), self.pbkdf2_iterations, password)
            .map_err(|e| ProviderError::Encryption(e.to_string()))
    }

    fn decrypt_private_key(&self, encrypted: &[u8], password: &str) -> Result<PrivateKey, ProviderError> {
        let plain = codec::decrypt_private_key_info(encrypted, password).map_err(|_| ProviderError::Decryption)?;
        PrivateKey::from_der(&plain).map_err(|_| ProviderError::Decryption)
    }
}
