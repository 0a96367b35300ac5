use std::fmt;
use std::time::{Duration, UNIX_EPOCH};

use der::oid::ObjectIdentifier;
use rand::TryRngCore;
use rand::rand_core::OsError;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::oid::{
    AES_128_CBC_KEY_OID, AES_192_CBC_KEY_OID, AES_256_CBC_KEY_OID, AES_GROUP_KEY_OID, BLOWFISH_KEY_OID,
    CAMELIA_KEY_OID, DES_EDE3_CBC_KEY_OID, HMAC_SHA1_KEY_OID, HMAC_SHA256_KEY_OID, HMAC_SHA384_KEY_OID,
    HMAC_SHA512_KEY_OID,
};

/// Symmetric key material, zeroed on drop
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    pub(crate) key_type: SecretKeyType,
    pub(crate) key: Zeroizing<Vec<u8>>,
    pub(crate) local_key_id: Vec<u8>,
}

impl SecretKey {
    pub fn builder(key_type: SecretKeyType) -> SecretKeyBuilder {
        SecretKeyBuilder::new(key_type)
    }

    /// Raw key bytes
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn key_type(&self) -> SecretKeyType {
        self.key_type
    }

    pub fn local_key_id(&self) -> &[u8] {
        &self.local_key_id
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("key_type", &self.key_type)
            .field("key", &"<KEY>")
            .field("local_key_id", &hex::encode(&self.local_key_id))
            .finish()
    }
}

pub struct SecretKeyBuilder {
    key_type: SecretKeyType,
    key: Option<Zeroizing<Vec<u8>>>,
    local_key_id: Option<Vec<u8>>,
    key_len: Option<usize>,
}

impl SecretKeyBuilder {
    pub fn new(key_type: SecretKeyType) -> Self {
        SecretKeyBuilder {
            key_len: key_type.default_len(),
            key_type,
            key: None,
            local_key_id: None,
        }
    }

    /// Length in bytes of a generated key
    pub fn with_length(mut self, len: usize) -> Self {
        self.key_len = Some(len);
        self
    }

    /// Use the given key bytes instead of generating them
    pub fn with_key(mut self, key: Vec<u8>) -> Self {
        self.key_len = Some(key.len());
        self.key = Some(Zeroizing::new(key));
        self
    }

    pub fn with_local_key_id(mut self, local_key_id: Vec<u8>) -> Self {
        self.local_key_id = Some(local_key_id);
        self
    }

    pub fn build(self) -> Result<SecretKey, SecretKeyBuilderError> {
        let local_key_id = match self.local_key_id {
            Some(id) => id,
            None => {
                let key_id = OsRng.try_next_u32().map_err(SecretKeyBuilderError::RandomGenerationError)?;
                let ts = UNIX_EPOCH.elapsed().unwrap_or(Duration::from_secs(0)).as_millis();
                format!("Time {ts}:{key_id}").into_bytes()
            }
        };

        let key = match self.key {
            Some(key) => key,
            None => {
                let key_len = self.key_len.ok_or(SecretKeyBuilderError::MissingKeyLength)?;
                let mut key = Zeroizing::new(vec![0u8; key_len]);
                OsRng
                    .try_fill_bytes(&mut key)
                    .map_err(SecretKeyBuilderError::RandomGenerationError)?;
                key
            }
        };

        Ok(SecretKey {
            key_type: self.key_type,
            key,
            local_key_id,
        })
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SecretKeyBuilderError {
    #[error("Key length is not known for this key type")]
    MissingKeyLength,

    #[error("Random generation failed: {0}")]
    RandomGenerationError(OsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKeyType {
    Aes,
    Aes128Cbc,
    Aes192Cbc,
    Aes256Cbc,
    DesEde3Cbc,
    Blowfish,
    Camelia,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    Unknown(ObjectIdentifier),
}

impl SecretKeyType {
    pub fn from_oid(oid: &ObjectIdentifier) -> Self {
        match *oid {
            AES_GROUP_KEY_OID => SecretKeyType::Aes,
            AES_128_CBC_KEY_OID => SecretKeyType::Aes128Cbc,
            AES_192_CBC_KEY_OID => SecretKeyType::Aes192Cbc,
            AES_256_CBC_KEY_OID => SecretKeyType::Aes256Cbc,
            DES_EDE3_CBC_KEY_OID => SecretKeyType::DesEde3Cbc,
            BLOWFISH_KEY_OID => SecretKeyType::Blowfish,
            CAMELIA_KEY_OID => SecretKeyType::Camelia,
            HMAC_SHA1_KEY_OID => SecretKeyType::HmacSha1,
            HMAC_SHA256_KEY_OID => SecretKeyType::HmacSha256,
            HMAC_SHA384_KEY_OID => SecretKeyType::HmacSha384,
            HMAC_SHA512_KEY_OID => SecretKeyType::HmacSha512,
            _ => SecretKeyType::Unknown(*oid),
        }
    }

    pub fn to_oid(&self) -> ObjectIdentifier {
        match self {
            SecretKeyType::Aes => AES_GROUP_KEY_OID,
            SecretKeyType::Aes128Cbc => AES_128_CBC_KEY_OID,
            SecretKeyType::Aes192Cbc => AES_192_CBC_KEY_OID,
            SecretKeyType::Aes256Cbc => AES_256_CBC_KEY_OID,
            SecretKeyType::DesEde3Cbc => DES_EDE3_CBC_KEY_OID,
            SecretKeyType::Blowfish => BLOWFISH_KEY_OID,
            SecretKeyType::Camelia => CAMELIA_KEY_OID,
            SecretKeyType::HmacSha1 => HMAC_SHA1_KEY_OID,
            SecretKeyType::HmacSha256 => HMAC_SHA256_KEY_OID,
            SecretKeyType::HmacSha384 => HMAC_SHA384_KEY_OID,
            SecretKeyType::HmacSha512 => HMAC_SHA512_KEY_OID,
            SecretKeyType::Unknown(oid) => *oid,
        }
    }

    /// returns default key length in bytes
    pub(crate) fn default_len(&self) -> Option<usize> {
        match self {
            SecretKeyType::Aes128Cbc => Some(16),
            SecretKeyType::Aes192Cbc => Some(192 / 8),
            SecretKeyType::Aes256Cbc => Some(256 / 8),
            SecretKeyType::DesEde3Cbc => Some(24),
            SecretKeyType::HmacSha1 => Some(512 / 8),
            SecretKeyType::HmacSha256 | SecretKeyType::HmacSha384 | SecretKeyType::HmacSha512 => Some(1024 / 8),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_mapping() {
        for key_type in [
            SecretKeyType::Aes,
            SecretKeyType::Aes256Cbc,
            SecretKeyType::Blowfish,
            SecretKeyType::HmacSha512,
        ] {
            assert_eq!(key_type, SecretKeyType::from_oid(&key_type.to_oid()));
        }

        let dummy_oid = ObjectIdentifier::new_unwrap("1.2.3.4.5.6.7");
        assert_eq!(SecretKeyType::Unknown(dummy_oid), SecretKeyType::from_oid(&dummy_oid));
    }

    #[test]
    fn test_builder_default_length() {
        let secret = SecretKey::builder(SecretKeyType::Aes192Cbc).build().unwrap();
        assert_eq!(secret.key_type(), SecretKeyType::Aes192Cbc);
        assert_eq!(secret.key_len(), 24);
        assert!(secret.local_key_id().starts_with(b"Time "));
    }

    #[test]
    fn test_builder_missing_length() {
        let secret = SecretKey::builder(SecretKeyType::Aes).build();
        assert_eq!(secret.unwrap_err(), SecretKeyBuilderError::MissingKeyLength);
    }

    #[test]
    fn test_builder_with_key_and_id() {
        let key = vec![17u8; 32];
        let secret = SecretKey::builder(SecretKeyType::Aes)
            .with_key(key.clone())
            .with_local_key_id(vec![0u8; 20])
            .build()
            .unwrap();
        assert_eq!(secret.key(), key.as_slice());
        assert_eq!(secret.local_key_id(), &[0u8; 20]);
    }
}
