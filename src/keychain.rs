use std::fmt;

use der::oid::ObjectIdentifier;
use pkcs8::PrivateKeyInfo;
use sha1::{Digest, Sha1};
use x509_cert::spki::SubjectPublicKeyInfoRef;
use zeroize::Zeroizing;

use crate::{Result, cert::Certificate, error::Error};

/// PKCS#8 private key wrapper, zeroed on drop
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) data: Zeroizing<Vec<u8>>,
    pub(crate) oid: ObjectIdentifier,
}

impl PrivateKey {
    /// Parses a PKCS#8 private key encoded in DER format and constructs a new instance of the struct.
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::try_from(data).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self {
            data: Zeroizing::new(data.to_vec()),
            oid: info.algorithm.oid,
        })
    }

    /// Returns a reference to the private key data in PKCS#8 DER-encoded format.
    pub fn as_der(&self) -> &[u8] {
        &self.data
    }

    /// Returns an ObjectIdentifier of the key algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        self.oid
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("data", &"<PKCS#8>")
            .field("oid", &self.oid)
            .finish()
    }
}

/// SubjectPublicKeyInfo wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) data: Vec<u8>,
    pub(crate) oid: ObjectIdentifier,
}

impl PublicKey {
    pub fn from_der(data: &[u8]) -> Result<Self> {
        let info = SubjectPublicKeyInfoRef::try_from(data).map_err(|_| Error::InvalidPublicKey)?;
        Ok(Self {
            data: data.to_vec(),
            oid: info.algorithm.oid,
        })
    }

    /// Returns the SubjectPublicKeyInfo in DER encoding
    pub fn as_der(&self) -> &[u8] {
        &self.data
    }

    pub fn oid(&self) -> ObjectIdentifier {
        self.oid
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("data", &hex::encode(&self.data))
            .field("oid", &self.oid)
            .finish()
    }
}

/// A private key together with its public half
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub(crate) private_key: PrivateKey,
    pub(crate) public_key: PublicKey,
}

impl KeyPair {
    pub fn new(private_key: PrivateKey, public_key: PublicKey) -> Self {
        Self {
            private_key,
            public_key,
        }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private_key, self.public_key)
    }
}

/// Wrapper for the local key id.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalKeyId(pub Vec<u8>);

impl LocalKeyId {
    /// Key id derived from the entity certificate, stable across saves
    pub fn for_certificate(cert: &Certificate) -> Self {
        Self(Sha1::digest(cert.as_der()).to_vec())
    }
}

impl From<Vec<u8>> for LocalKeyId {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for LocalKeyId {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for LocalKeyId {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl AsRef<[u8]> for LocalKeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LocalKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LocalKeyId").field(&hex::encode(&self.0)).finish()
    }
}

/// A private key with its certificate chain
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKeyEntry {
    pub(crate) key: PrivateKey,
    pub(crate) local_key_id: LocalKeyId,
    pub(crate) chain: Vec<Certificate>,
}

impl PrivateKeyEntry {
    /// Creates a new entry with a given key id, private key and a list of certificates.
    /// The leaf (entity) certificate must be the first in the list, and the root certificate must be the last.
    pub fn new<K, I>(local_key_id: K, key: PrivateKey, chain: I) -> Self
    where
        K: Into<LocalKeyId>,
        I: IntoIterator<Item = Certificate>,
    {
        Self {
            key,
            local_key_id: local_key_id.into(),
            chain: chain.into_iter().collect(),
        }
    }

    /// Get a private key
    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// Get certificates, leaf first
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// Get local key id
    pub fn local_key_id(&self) -> &LocalKeyId {
        &self.local_key_id
    }
}

impl fmt::Debug for PrivateKeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyEntry")
            .field("key", &self.key)
            .field("chain", &self.chain)
            .field("local_key_id", &hex::encode(&self.local_key_id))
            .finish()
    }
}
