use cms::{
    content_info::{CmsVersion, ContentInfo},
    encrypted_data::EncryptedData,
    enveloped_data::EncryptedContentInfo,
};
use der::{
    Any, Decode, Encode, Sequence,
    asn1::{BmpString, ContextSpecific, ObjectIdentifier, OctetString, OctetStringRef, SetOfVec},
};
use hmac::{Mac, digest::Digest};
use pkcs5::pbes2;
use pkcs12::{
    cert_type::CertBag, digest_info::DigestInfo, kdf, mac_data::MacData,
    pbe_params::EncryptedPrivateKeyInfo,
    safe_bag::{Pkcs8Version, PrivateKeyInfo, SafeBag, SafeContents},
};
use rand::random;
use sha1::Sha1;
use sha2::Sha256;
use x509_cert::{
    attr::{Attribute, AttributeValue, Attributes},
    spki::AlgorithmIdentifierOwned,
};
use zeroize::Zeroizing;

use crate::{
    cert::Certificate,
    error::BackendError,
    keychain::{PrivateKey, PrivateKeyEntry},
    oid,
    secret::{SecretKey, SecretKeyType},
};

type Result<T> = std::result::Result<T, BackendError>;

/// MAC algorithm protecting the integrity of a PKCS#12 file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum MacAlgorithm {
    HmacSha1,
    HmacSha256,
}

pub struct ParsedKey {
    pub friendly_name: Option<String>,
    pub key: PrivateKeyEntry,
}

pub struct ParsedSecret {
    pub friendly_name: Option<String>,
    pub key: SecretKey,
}

pub struct ParsedCertificate {
    pub friendly_name: Option<String>,
    pub local_key_id: Option<Vec<u8>>,
    pub trusted: bool,
    pub cert: Certificate,
}

#[derive(Default)]
pub struct ParsedAuthSafe {
    pub keys: Vec<ParsedKey>,
    pub certs: Vec<ParsedCertificate>,
    pub secrets: Vec<ParsedSecret>,
}

pub fn verify_mac(mac_data: &MacData, password: &str, data: &[u8]) -> Result<()> {
    match mac_data.mac.algorithm.oid {
        oid::SHA1_OID => {
            let key = Zeroizing::new(kdf::derive_key_utf8::<Sha1>(
                password,
                mac_data.mac_salt.as_bytes(),
                kdf::Pkcs12KeyType::Mac,
                mac_data.iterations,
                Sha1::output_size(),
            )?);
            let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(&key).map_err(|_| BackendError::InvalidLength)?;
            hmac.update(data);
            hmac.verify_slice(mac_data.mac.digest.as_bytes())?;
            Ok(())
        }
        oid::SHA256_OID => {
            let key = Zeroizing::new(kdf::derive_key_utf8::<Sha256>(
                password,
                mac_data.mac_salt.as_bytes(),
                kdf::Pkcs12KeyType::Mac,
                mac_data.iterations,
                Sha256::output_size(),
            )?);
            let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(&key).map_err(|_| BackendError::InvalidLength)?;
            hmac.update(data);
            hmac.verify_slice(mac_data.mac.digest.as_bytes())?;
            Ok(())
        }
        _ => Err(BackendError::UnsupportedEncryptionScheme),
    }
}

pub fn compute_mac(data: &[u8], algorithm: MacAlgorithm, iterations: u32, password: &str) -> Result<MacData> {
    let iterations = i32::try_from(iterations).map_err(|_| BackendError::InvalidParameters)?;

    let (oid, salt, digest) = match algorithm {
        MacAlgorithm::HmacSha1 => {
            let salt: [u8; 20] = random();
            let key = Zeroizing::new(kdf::derive_key_utf8::<Sha1>(
                password,
                &salt,
                kdf::Pkcs12KeyType::Mac,
                iterations,
                Sha1::output_size(),
            )?);
            let mut hmac = hmac::Hmac::<Sha1>::new_from_slice(&key).map_err(|_| BackendError::InvalidLength)?;
            hmac.update(data);
            (oid::SHA1_OID, salt.to_vec(), hmac.finalize().into_bytes().to_vec())
        }
        MacAlgorithm::HmacSha256 => {
            let salt: [u8; 32] = random();
            let key = Zeroizing::new(kdf::derive_key_utf8::<Sha256>(
                password,
                &salt,
                kdf::Pkcs12KeyType::Mac,
                iterations,
                Sha256::output_size(),
            )?);
            let mut hmac = hmac::Hmac::<Sha256>::new_from_slice(&key).map_err(|_| BackendError::InvalidLength)?;
            hmac.update(data);
            (oid::SHA256_OID, salt.to_vec(), hmac.finalize().into_bytes().to_vec())
        }
    };

    Ok(MacData {
        mac: DigestInfo {
            algorithm: AlgorithmIdentifierOwned { oid, parameters: None },
            digest: OctetString::new(digest)?,
        },
        mac_salt: OctetString::new(salt)?,
        iterations,
    })
}

/// Decrypt PBES2-protected content
pub fn decrypt(alg: &AlgorithmIdentifierOwned, data: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    match alg.oid {
        oid::PBES2_OID => {
            let params = alg.parameters.as_ref().ok_or(BackendError::InvalidParameters)?.to_der()?;
            let params = pbes2::Parameters::from_der(&params)?;

            Ok(Zeroizing::new(
                params
                    .decrypt(password.as_bytes(), data)
                    .map_err(|e| BackendError::Pkcs5Error(format!("{e}")))?,
            ))
        }
        _ => Err(BackendError::UnsupportedEncryptionScheme),
    }
}

/// Encrypt content with PBES2 (PBKDF2-HMAC-SHA256, AES-256-CBC)
pub fn encrypt(iterations: u32, data: &[u8], password: &str) -> Result<(AlgorithmIdentifierOwned, Vec<u8>)> {
    let salt: [u8; 32] = random();
    let iv: [u8; 16] = random();
    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)
        .map_err(|e| BackendError::Pkcs5Error(e.to_string()))?;

    let encrypted = params
        .encrypt(password.as_bytes(), data)
        .map_err(|e| BackendError::Pkcs5Error(format!("{e}")))?;

    let alg_id = AlgorithmIdentifierOwned {
        oid: oid::PBES2_OID,
        parameters: Some(Any::from_der(&params.to_der()?)?),
    };

    Ok((alg_id, encrypted))
}

/// Encrypt a PKCS#8 structure into a DER-encoded EncryptedPrivateKeyInfo
pub fn encrypt_private_key_info(data: &[u8], iterations: u32, password: &str) -> Result<Vec<u8>> {
    let (encryption_algorithm, encrypted) = encrypt(iterations, data, password)?;
    Ok(EncryptedPrivateKeyInfo {
        encryption_algorithm,
        encrypted_data: OctetString::new(encrypted)?,
    }
    .to_der()?)
}

/// Decrypt a DER-encoded EncryptedPrivateKeyInfo into the PKCS#8 structure it protects
pub fn decrypt_private_key_info(data: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let info = EncryptedPrivateKeyInfo::from_der(data)?;
    decrypt(&info.encryption_algorithm, info.encrypted_data.as_bytes(), password)
}

/// PKCS#8 structure carrying a symmetric key, tagged with the key algorithm
pub fn secret_key_info(key: &SecretKey) -> Result<Zeroizing<Vec<u8>>> {
    let key_info = PrivateKeyInfo {
        version: Pkcs8Version::V0,
        algorithm: AlgorithmIdentifierOwned {
            oid: key.key_type.to_oid(),
            parameters: None,
        },
        private_key: OctetString::new(key.key())?,
        attributes: None,
    };
    Ok(Zeroizing::new(key_info.to_der()?))
}

pub fn parse_auth_safe(safe: &ContentInfo, password: &str) -> Result<ParsedAuthSafe> {
    let data = match safe.content_type {
        oid::CONTENT_TYPE_DATA_OID => Zeroizing::new(OctetString::from_der(&safe.content.to_der()?)?.into_bytes()),
        oid::CONTENT_TYPE_ENCRYPTED_DATA_OID => {
            let enc_data = EncryptedData::from_der(&safe.content.to_der()?)?;
            if enc_data.version != CmsVersion::V0 {
                return Err(BackendError::InvalidVersion);
            }
            match enc_data.enc_content_info.encrypted_content.as_ref() {
                Some(data) => decrypt(&enc_data.enc_content_info.content_enc_alg, data.as_bytes(), password)?,
                None => Zeroizing::new(Vec::new()),
            }
        }
        _ => {
            return Err(BackendError::UnsupportedContentType);
        }
    };

    parse_bags(SafeContents::from_der(&data)?, password)
}

fn get_bag_attribute(oid: &ObjectIdentifier, bag: &SafeBag) -> Option<Vec<u8>> {
    bag.bag_attributes.as_ref().and_then(|attrs| {
        attrs.iter().find_map(|a| {
            if a.oid == *oid {
                a.values.iter().next().and_then(|a| a.to_der().ok())
            } else {
                None
            }
        })
    })
}

fn parse_bags(bags: SafeContents, password: &str) -> Result<ParsedAuthSafe> {
    let mut parsed = ParsedAuthSafe::default();

    for bag in bags {
        let local_key_id = get_bag_attribute(&oid::LOCAL_KEY_ID_OID, &bag)
            .and_then(|a| OctetString::from_der(&a).ok().map(|a| a.as_bytes().to_vec()));

        let friendly_name = get_bag_attribute(&oid::FRIENDLY_NAME_OID, &bag)
            .and_then(|n| BmpString::from_der(&n).ok().map(|a| a.to_string()));

        let trusted = get_bag_attribute(&oid::ORACLE_TRUSTED_KEY_USAGE_OID, &bag)
            .and_then(|n| ObjectIdentifier::from_der(&n).ok())
            .is_some_and(|o| o == oid::ANY_EXTENDED_USAGE_OID);

        match bag.bag_id {
            oid::PKCS_12_CERT_BAG_OID => {
                let cs: ContextSpecific<CertBag> = ContextSpecific::from_der(&bag.bag_value)?;
                if cs.value.cert_id != oid::CERT_TYPE_X509_CERTIFICATE_OID {
                    return Err(BackendError::UnsupportedCertificateType);
                }
                let cert = Certificate::from_der(cs.value.cert_value.as_bytes())?;
                parsed.certs.push(ParsedCertificate {
                    friendly_name,
                    local_key_id,
                    trusted,
                    cert,
                });
            }
            oid::PKCS_12_PKCS8_KEY_BAG_OID => {
                let cs: ContextSpecific<EncryptedPrivateKeyInfo> = ContextSpecific::from_der(&bag.bag_value)?;

                let decrypted = decrypt(
                    &cs.value.encryption_algorithm,
                    cs.value.encrypted_data.as_bytes(),
                    password,
                )?;

                if let Some(local_key_id) = local_key_id {
                    let key = PrivateKeyEntry {
                        key: PrivateKey::from_der(&decrypted).map_err(|_| BackendError::InvalidPrivateKey)?,
                        local_key_id: local_key_id.into(),
                        chain: vec![],
                    };
                    parsed.keys.push(ParsedKey { friendly_name, key });
                }
            }
            oid::PKCS_12_SECRET_BAG_OID => {
                let secret_bag = SecretBag::from_bag_der(&bag.bag_value)?;

                if let Some(local_key_id) = local_key_id {
                    let key_info = secret_bag.private_key_info(password)?;
                    let key = SecretKey {
                        key_type: SecretKeyType::from_oid(&key_info.algorithm.oid),
                        key: Zeroizing::new(key_info.private_key.as_bytes().to_vec()),
                        local_key_id,
                    };
                    parsed.secrets.push(ParsedSecret { friendly_name, key });
                }
            }
            _ => log::debug!("Skipping unsupported bag type {}", bag.bag_id),
        }
    }

    Ok(parsed)
}

fn bag_attributes(friendly_name: &str, local_key_id: Option<&[u8]>, trusted: bool) -> Result<Attributes> {
    let mut bag_attributes = Attributes::new();

    let friendly_name =
        SetOfVec::<AttributeValue>::from_iter([Any::from_der(&BmpString::from_utf8(friendly_name)?.to_der()?)?])?;

    bag_attributes.insert(Attribute {
        oid: oid::FRIENDLY_NAME_OID,
        values: friendly_name,
    })?;

    if let Some(local_key_id) = local_key_id {
        let local_key_id =
            SetOfVec::<AttributeValue>::from_iter([Any::from_der(&OctetStringRef::new(local_key_id)?.to_der()?)?])?;

        bag_attributes.insert(Attribute {
            oid: oid::LOCAL_KEY_ID_OID,
            values: local_key_id,
        })?;
    }

    if trusted {
        let key_usage =
            SetOfVec::<AttributeValue>::from_iter([Any::from_der(&oid::ANY_EXTENDED_USAGE_OID.to_der()?)?])?;

        bag_attributes.insert(Attribute {
            oid: oid::ORACLE_TRUSTED_KEY_USAGE_OID,
            values: key_usage,
        })?;
    }

    Ok(bag_attributes)
}

pub fn certificate_to_safe_bag(
    certificate: &Certificate,
    friendly_name: &str,
    local_key_id: Option<&[u8]>,
    trusted: bool,
) -> Result<SafeBag> {
    let cert_bag = CertBag {
        cert_id: oid::CERT_TYPE_X509_CERTIFICATE_OID,
        cert_value: OctetString::new(certificate.as_der())?,
    };
    Ok(SafeBag {
        bag_id: oid::PKCS_12_CERT_BAG_OID,
        bag_value: cert_bag.to_der()?,
        bag_attributes: Some(bag_attributes(friendly_name, local_key_id, trusted)?),
    })
}

#[derive(Debug, PartialEq, Eq, Clone, Sequence)]
pub struct SecretBag {
    pub object_identifier: ObjectIdentifier,
    #[asn1(context_specific = "0")]
    pub encrypted_private_key_info: OctetString,
    pub bag_attributes: Option<Attributes>,
}

impl SecretBag {
    pub fn private_key_info(&self, password: &str) -> Result<PrivateKeyInfo> {
        let plain = decrypt_private_key_info(self.encrypted_private_key_info.as_bytes(), password)?;
        Ok(PrivateKeyInfo::from_der(&plain)?)
    }

    pub fn from_bag_der(data: &[u8]) -> Result<SecretBag> {
        let envelope = Any::from_der(data)?;
        Ok(SecretBag::from_der(envelope.value())?)
    }
}

pub fn secret_to_safe_bag(key: &SecretKey, friendly_name: &str, iterations: u32, password: &str) -> Result<SafeBag> {
    let key_info = secret_key_info(key)?;
    let encrypted_key_info = encrypt_private_key_info(&key_info, iterations, password)?;

    let secret_bag = SecretBag {
        object_identifier: oid::PKCS_12_PKCS8_KEY_BAG_OID,
        encrypted_private_key_info: OctetString::new(encrypted_key_info)?,
        bag_attributes: None,
    };

    let any = Any::from_der(&secret_bag.to_der()?)?;

    Ok(SafeBag {
        bag_id: oid::PKCS_12_SECRET_BAG_OID,
        bag_value: any.to_der()?,
        bag_attributes: Some(bag_attributes(friendly_name, Some(&key.local_key_id), false)?),
    })
}

pub fn private_key_to_safe_bag(
    key: &PrivateKeyEntry,
    friendly_name: &str,
    iterations: u32,
    password: &str,
) -> Result<SafeBag> {
    let (alg_id, encrypted) = encrypt(iterations, key.key().as_der(), password)?;

    let pk_info = EncryptedPrivateKeyInfo {
        encryption_algorithm: alg_id,
        encrypted_data: OctetString::new(encrypted)?,
    }
    .to_der()?;

    Ok(SafeBag {
        bag_id: oid::PKCS_12_PKCS8_KEY_BAG_OID,
        bag_value: pk_info,
        bag_attributes: Some(bag_attributes(
            friendly_name,
            Some(key.local_key_id.as_ref()),
            false,
        )?),
    })
}

pub fn cert_bags_to_auth_safe(bags: Vec<SafeBag>, iterations: u32, password: &str) -> Result<ContentInfo> {
    let data = bags.to_der()?;
    let (alg_id, encrypted) = encrypt(iterations, &data, password)?;

    let encrypted_data = EncryptedData {
        version: CmsVersion::V0,
        enc_content_info: EncryptedContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content_enc_alg: alg_id,
            encrypted_content: Some(OctetString::new(encrypted)?),
        },
        unprotected_attrs: None,
    };

    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_ENCRYPTED_DATA_OID,
        content: Any::from_der(&encrypted_data.to_der()?)?,
    })
}

pub fn key_bags_to_auth_safe(bags: Vec<SafeBag>) -> Result<ContentInfo> {
    Ok(ContentInfo {
        content_type: oid::CONTENT_TYPE_DATA_OID,
        content: Any::from_der(&OctetString::new(bags.to_der()?)?.to_der()?)?,
    })
}

#[cfg(test)]
mod tests {
    use der::{Decode, Encode};
    use pkcs12::safe_bag::SafeBag;

    use super::*;

    const PASSWORD: &str = "changeit";

    #[test]
    fn test_secret_to_safe_bag() {
        let secret = SecretKey::builder(SecretKeyType::Aes).with_length(32).build().unwrap();
        let bag = secret_to_safe_bag(&secret, "myKey", 1000, PASSWORD).unwrap();

        let der = bag.to_der().unwrap();

        let safe_bag = SafeBag::from_der(&der).unwrap();
        let bag = SecretBag::from_bag_der(&safe_bag.bag_value).unwrap();

        let private_key_info = bag.private_key_info(PASSWORD).unwrap();

        assert_eq!(private_key_info.algorithm.oid, oid::AES_GROUP_KEY_OID);
        assert_eq!(secret.key(), private_key_info.private_key.as_bytes());
    }

    #[test]
    fn test_encrypted_private_key_info_wrong_password() {
        let encrypted = encrypt_private_key_info(b"plaintext", 1000, PASSWORD).unwrap();
        assert_eq!(
            decrypt_private_key_info(&encrypted, PASSWORD).unwrap().as_slice(),
            b"plaintext"
        );
        assert!(decrypt_private_key_info(&encrypted, "wrong").is_err());
    }

    #[test]
    fn test_mac_round_trip() {
        let mac = compute_mac(b"auth safe", MacAlgorithm::HmacSha256, 1000, PASSWORD).unwrap();
        verify_mac(&mac, PASSWORD, b"auth safe").unwrap();
        assert!(matches!(
            verify_mac(&mac, "wrong", b"auth safe"),
            Err(BackendError::MacError(_))
        ));
    }
}
