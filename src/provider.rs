//!
//! Process-wide handle to the cryptographic backend.
//!
//! The handle is created at most once. Callers may [install] their own provider before
//! first use; otherwise the first call to [get] initializes it with the default provider
//! (the [crate::software::SoftwareProvider] when the `software-provider` feature is enabled).
//! Absence of a provider is a valid state: operations that need one report
//! [ProviderError::Unavailable]. There is no teardown.
//!
use std::sync::OnceLock;

use der::oid::ObjectIdentifier;

use crate::{
    error::ProviderError,
    keychain::{KeyPair, PrivateKey, PublicKey},
    oid,
};

/// Key algorithms a provider may be asked to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum KeyAlgorithm {
    EcP256,
    Ed25519,
}

/// Certificate signature algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SignatureAlgorithm {
    EcdsaSha256,
    Ed25519,
}

impl SignatureAlgorithm {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::EcdsaSha256 => oid::ECDSA_WITH_SHA256_OID,
            SignatureAlgorithm::Ed25519 => oid::ED25519_OID,
        }
    }

    /// Default signature algorithm for a key algorithm family
    pub fn for_key(key_oid: ObjectIdentifier) -> Option<Self> {
        match key_oid {
            oid::EC_PUBLIC_KEY_OID => Some(SignatureAlgorithm::EcdsaSha256),
            oid::ED25519_OID => Some(SignatureAlgorithm::Ed25519),
            _ => None,
        }
    }
}

/// Signing, verification and key protection capabilities consumed by this crate
pub trait CryptoProvider: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn generate_key_pair(&self, algorithm: KeyAlgorithm) -> Result<KeyPair, ProviderError>;

    /// Derive the public half of a private key
    fn public_key(&self, key: &PrivateKey) -> Result<PublicKey, ProviderError>;

    fn sign(&self, key: &PrivateKey, algorithm: SignatureAlgorithm, message: &[u8]) -> Result<Vec<u8>, ProviderError>;

    /// Verify `signature` over `message`; `algorithm` is the signature algorithm OID
    fn verify(
        &self,
        key: &PublicKey,
        algorithm: ObjectIdentifier,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError>;

    /// Encrypt a private key into a DER-encoded PKCS#8 EncryptedPrivateKeyInfo
    fn encrypt_private_key(&self, key: &PrivateKey, password: &str) -> Result<Vec<u8>, ProviderError>;

    /// Decrypt a DER-encoded PKCS#8 EncryptedPrivateKeyInfo
    fn decrypt_private_key(&self, encrypted: &[u8], password: &str) -> Result<PrivateKey, ProviderError>;
}

static PROVIDER: OnceLock<Option<Box<dyn CryptoProvider>>> = OnceLock::new();

fn default_provider() -> Option<Box<dyn CryptoProvider>> {
    #[cfg(feature = "software-provider")]
    {
        Some(Box::new(crate::software::SoftwareProvider::default()))
    }
    #[cfg(not(feature = "software-provider"))]
    {
        None
    }
}

/// Install a provider. Fails if the handle was already initialized, either by a previous
/// `install` or by a call to [get].
pub fn install(provider: Box<dyn CryptoProvider>) -> Result<(), ProviderError> {
    PROVIDER
        .set(Some(provider))
        .map_err(|_| ProviderError::AlreadyInstalled)?;
    log::debug!("Installed cryptographic provider");
    Ok(())
}

/// Get the active provider, initializing the handle on first use
pub fn get() -> Option<&'static dyn CryptoProvider> {
    PROVIDER
        .get_or_init(|| {
            let provider = default_provider();
            match &provider {
                Some(p) => log::debug!("Initialized default cryptographic provider {}", p.name()),
                None => log::debug!("No default cryptographic provider available"),
            }
            provider
        })
        .as_deref()
}

pub fn is_available() -> bool {
    get().is_some()
}

/// Get the active provider or fail with [ProviderError::Unavailable]
pub fn require() -> Result<&'static dyn CryptoProvider, ProviderError> {
    get().ok_or(ProviderError::Unavailable)
}
