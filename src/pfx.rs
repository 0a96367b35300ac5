//!
//! PKCS#12 keystore backend
//!
use cms::content_info::ContentInfo;
use der::{Any, Decode, Encode, asn1::OctetString};
use hex::ToHex;
use pkcs12::{
    authenticated_safe::AuthenticatedSafe,
    pfx::{Pfx, Version},
};

use crate::{
    cert::Certificate,
    codec::{self, MacAlgorithm, ParsedAuthSafe},
    error::{BackendError, KeystoreAccessError},
    format::{FormatBackend, KeystoreFormat},
    keychain::PrivateKeyEntry,
    keystore::{Keystore, KeystoreEntry},
    oid,
};

// default values are taken from JVM java.security config file
const DEFAULT_ITERATIONS: u32 = 10000;

/// PKCS#12 reader and writer
#[derive(Debug, Clone)]
pub struct Pkcs12Backend {
    encryption_iterations: u32,
    mac_algorithm: MacAlgorithm,
    mac_iterations: u32,
    deduplicate: bool,
}

impl Default for Pkcs12Backend {
    fn default() -> Self {
        Self {
            encryption_iterations: DEFAULT_ITERATIONS,
            mac_algorithm: MacAlgorithm::HmacSha256,
            mac_iterations: DEFAULT_ITERATIONS,
            deduplicate: false,
        }
    }
}

impl Pkcs12Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set PBKDF2 iterations for bag encryption. Default is 10000
    pub fn encryption_iterations(mut self, iterations: u32) -> Self {
        self.encryption_iterations = iterations;
        self
    }

    /// Set MAC algorithm. Default is [MacAlgorithm::HmacSha256]
    pub fn mac_algorithm(mut self, algorithm: MacAlgorithm) -> Self {
        self.mac_algorithm = algorithm;
        self
    }

    /// Set MAC iterations. Default is 10000
    pub fn mac_iterations(mut self, iterations: u32) -> Self {
        self.mac_iterations = iterations;
        self
    }

    /// Leave out chain certificates that are also stored as certificate entries. Default is false
    pub fn deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    fn parse(&self, format: &'static KeystoreFormat, data: &[u8], password: &str) -> Result<Keystore, BackendError> {
        let pfx = Pfx::from_der(data)?;

        if pfx.version != Version::V3 {
            return Err(BackendError::InvalidVersion);
        }

        if let Some(mac_data) = pfx.mac_data {
            codec::verify_mac(&mac_data, password, pfx.auth_safe.content.value())?;
        }

        let safes: AuthenticatedSafe = if pfx.auth_safe.content_type == oid::CONTENT_TYPE_DATA_OID {
            AuthenticatedSafe::from_der(&OctetString::from_der(&pfx.auth_safe.content.to_der()?)?.into_bytes())?
        } else {
            return Err(BackendError::UnsupportedContentType);
        };

        let mut keystore = Keystore::new(format);

        let mut parsed_keys = Vec::new();
        let mut parsed_certs = Vec::new();
        let mut parsed_secrets = Vec::new();

        for safe in safes.into_iter() {
            let ParsedAuthSafe { keys, certs, secrets } = codec::parse_auth_safe(&safe, password)?;
            parsed_keys.extend(keys);
            parsed_certs.extend(certs);
            parsed_secrets.extend(secrets);
        }

        let find_cert_by_key = |key: &[u8]| {
            parsed_certs
                .iter()
                .find(|c| c.local_key_id.as_ref().is_some_and(|k| k.as_slice() == key))
        };

        let find_issuer = |issuer: &str| {
            parsed_certs
                .iter()
                .find(|c| c.cert.subject() == issuer && !c.trusted)
        };

        for key in parsed_keys {
            let Some(mut entry) = find_cert_by_key(key.key.local_key_id.as_ref()) else {
                log::warn!("Skipping private key without a certificate");
                continue;
            };

            let alias = key.friendly_name.unwrap_or_else(|| entry.cert.subject().to_owned());
            let mut chain = vec![entry.cert.clone()];

            while let Some(issuer) = find_issuer(entry.cert.issuer()) {
                if chain.contains(&issuer.cert) {
                    break;
                }
                chain.push(issuer.cert.clone());
                if issuer.cert.issuer() == issuer.cert.subject() {
                    break;
                }
                entry = issuer;
            }

            let key_entry = PrivateKeyEntry {
                key: key.key.key,
                local_key_id: key.key.local_key_id,
                chain,
            };
            keystore.insert_entry(&alias, KeystoreEntry::PrivateKey(key_entry));
        }

        for cert in parsed_certs {
            if cert.local_key_id.is_none() && cert.trusted {
                let alias = cert.friendly_name.unwrap_or_else(|| cert.cert.subject().to_owned());
                keystore.insert_entry(&alias, KeystoreEntry::Certificate(cert.cert));
            }
        }

        for secret in parsed_secrets {
            let alias = secret
                .friendly_name
                .unwrap_or_else(|| secret.key.local_key_id.encode_hex());
            keystore.insert_entry(&alias, KeystoreEntry::SecretKey(secret.key));
        }

        Ok(keystore)
    }

    fn write(&self, keystore: &Keystore, password: &str) -> Result<Vec<u8>, BackendError> {
        let mut cert_bags = Vec::new();

        let certs = keystore.entries().filter_map(|(alias, entry)| match entry {
            KeystoreEntry::Certificate(cert) => Some((alias, cert)),
            _ => None,
        });

        for (alias, cert) in certs {
            cert_bags.push(codec::certificate_to_safe_bag(cert, alias, None, true)?);
        }

        let is_certificate_entry = |cert: &Certificate| {
            keystore
                .entries()
                .any(|(_, entry)| matches!(entry, KeystoreEntry::Certificate(c) if c == cert))
        };

        let chain_certs = keystore
            .entries()
            .filter_map(|(_, entry)| match entry {
                KeystoreEntry::PrivateKey(key) => Some(key.chain.iter().enumerate().map(|(i, c)| {
                    (
                        if i == 0 {
                            Some(key.local_key_id.as_ref())
                        } else {
                            None
                        },
                        c,
                    )
                })),
                _ => None,
            })
            .flatten();

        for (local_key_id, cert) in chain_certs {
            if self.deduplicate && local_key_id.is_none() && is_certificate_entry(cert) {
                log::debug!("Omitting {} from chain, it is stored as a certificate entry", cert.subject());
                continue;
            }
            cert_bags.push(codec::certificate_to_safe_bag(
                cert,
                cert.subject(),
                local_key_id,
                false,
            )?);
        }

        let certs_safe = codec::cert_bags_to_auth_safe(cert_bags, self.encryption_iterations, password)?;

        let mut key_bags = Vec::new();

        for (alias, entry) in keystore.entries() {
            if let KeystoreEntry::PrivateKey(key) = entry {
                key_bags.push(codec::private_key_to_safe_bag(
                    key,
                    alias,
                    self.encryption_iterations,
                    password,
                )?);
            }
        }

        let keys_safe = codec::key_bags_to_auth_safe(key_bags)?;

        let mut safes = vec![certs_safe, keys_safe];

        for (alias, entry) in keystore.entries() {
            if let KeystoreEntry::SecretKey(secret) = entry {
                let bag = codec::secret_to_safe_bag(secret, alias, self.encryption_iterations, password)?;
                safes.push(codec::key_bags_to_auth_safe(vec![bag])?);
            }
        }

        let safe_bags = OctetString::new(safes.to_der()?)?;
        let auth_safe = ContentInfo {
            content_type: oid::CONTENT_TYPE_DATA_OID,
            content: Any::from_der(&safe_bags.to_der()?)?,
        };

        let mac_data = codec::compute_mac(
            auth_safe.content.value(),
            self.mac_algorithm,
            self.mac_iterations,
            password,
        )?;

        let pfx = Pfx {
            version: Version::V3,
            auth_safe,
            mac_data: Some(mac_data),
        };

        Ok(pfx.to_der()?)
    }
}

impl FormatBackend for Pkcs12Backend {
    fn load(
        &self,
        format: &'static KeystoreFormat,
        data: &[u8],
        password: &str,
    ) -> Result<Keystore, KeystoreAccessError> {
        let keystore = self.parse(format, data, password).map_err(|e| match e {
            BackendError::MacError(_) => KeystoreAccessError::WrongPassword,
            e => KeystoreAccessError::Backend(e),
        })?;
        log::debug!("Loaded {} store with {} entries", format, keystore.entries_len());
        Ok(keystore)
    }

    fn save(&self, store: &Keystore, password: &str) -> Result<Vec<u8>, KeystoreAccessError> {
        let data = self.write(store, password)?;
        log::debug!("Saved {} store with {} entries", store.format(), store.entries_len());
        Ok(data)
    }
}
