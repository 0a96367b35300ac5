use std::collections::{BTreeMap, BTreeSet, btree_map::Iter};

use rand::random;
use sha2::{Digest, Sha256};

use crate::{
    cert::Certificate,
    error::KeystoreAccessError,
    format::KeystoreFormat,
    keychain::{LocalKeyId, PrivateKey, PrivateKeyEntry},
    secret::SecretKey,
    verify::verify_chain,
};

type Result<T> = std::result::Result<T, KeystoreAccessError>;

/// KeystoreEntry represents one entry in the keystore
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeystoreEntry {
    PrivateKey(PrivateKeyEntry),
    SecretKey(SecretKey),
    Certificate(Certificate),
}

impl KeystoreEntry {
    /// The certificate identifying this entry: the certificate itself, or the leaf of a key chain
    pub fn leaf_certificate(&self) -> Option<&Certificate> {
        match self {
            KeystoreEntry::PrivateKey(entry) => entry.chain.first(),
            KeystoreEntry::SecretKey(_) => None,
            KeystoreEntry::Certificate(cert) => Some(cert),
        }
    }
}

/// Keystore entries iterator
pub struct Entries<'a> {
    iter: Iter<'a, String, KeystoreEntry>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (&'a String, &'a KeystoreEntry);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Salted digest of the password a store was created or loaded with
#[derive(Clone)]
struct PasswordCheck {
    salt: [u8; 16],
    digest: Vec<u8>,
}

impl PasswordCheck {
    fn new(password: &str) -> Self {
        let salt: [u8; 16] = random();
        Self {
            digest: Self::digest(&salt, password),
            salt,
        }
    }

    fn digest(salt: &[u8], password: &str) -> Vec<u8> {
        Sha256::new()
            .chain_update(salt)
            .chain_update(password.as_bytes())
            .finalize()
            .to_vec()
    }

    fn matches(&self, password: &str) -> bool {
        Self::digest(&self.salt, password) == self.digest
    }
}

/// Keystore holds a dictionary of [KeystoreEntry] instances indexed by aliases, in alias order.
/// Storing an entry under an existing alias replaces it.
#[derive(Clone)]
pub struct Keystore {
    format: &'static KeystoreFormat,
    entries: BTreeMap<String, KeystoreEntry>,
    password_check: Option<PasswordCheck>,
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("format", &self.format.name())
            .field("entries", &self.entries)
            .finish()
    }
}

impl Keystore {
    /// Create new empty keystore of a given format
    pub fn new(format: &'static KeystoreFormat) -> Self {
        Self {
            format,
            entries: BTreeMap::new(),
            password_check: None,
        }
    }

    pub fn format(&self) -> &'static KeystoreFormat {
        self.format
    }

    pub(crate) fn set_password(&mut self, password: &str) {
        self.password_check = Some(PasswordCheck::new(password));
    }

    /// Whether `password` is the one this store was created or loaded with.
    /// A store that was never given a password accepts any.
    pub fn unlocks(&self, password: &str) -> bool {
        self.password_check.as_ref().is_none_or(|c| c.matches(password))
    }

    /// Get entries iterator
    pub fn entries(&self) -> Entries<'_> {
        let iter = self.entries.iter();
        Entries { iter }
    }

    /// Get an entry for a given alias
    pub fn entry(&self, alias: &str) -> Option<&KeystoreEntry> {
        self.entries.get(alias)
    }

    /// Get entries count in the keystore
    pub fn entries_len(&self) -> usize {
        self.entries.len()
    }

    /// Aliases in sorted order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Add an entry. Fails if the store format cannot hold it, or if it is a private key
    /// whose chain is empty or does not pass [verify_chain]; the store is then left unchanged.
    pub fn add_entry(&mut self, alias: &str, entry: KeystoreEntry) -> Result<()> {
        match &entry {
            KeystoreEntry::SecretKey(_) if !self.format.supports_secret_keys() => {
                return Err(KeystoreAccessError::UnsupportedEntry {
                    format: self.format.name(),
                    alias: alias.to_owned(),
                });
            }
            KeystoreEntry::PrivateKey(key) => {
                if key.chain.is_empty() {
                    return Err(KeystoreAccessError::EmptyChain(alias.to_owned()));
                }
                verify_chain(&key.chain).map_err(|source| KeystoreAccessError::InvalidChain {
                    alias: alias.to_owned(),
                    source,
                })?;
            }
            _ => {}
        }
        self.insert_entry(alias, entry);
        Ok(())
    }

    pub(crate) fn insert_entry(&mut self, alias: &str, entry: KeystoreEntry) {
        self.entries.insert(alias.to_owned(), entry);
    }

    /// Delete entry from the keystore
    pub fn delete_entry(&mut self, alias: &str) -> Option<KeystoreEntry> {
        self.entries.remove(alias)
    }

    /// Rename entry in the keystore. If an entry with new alias already exists it will be replaced
    pub fn rename_entry(&mut self, old_alias: &str, new_alias: &str) -> Option<&KeystoreEntry> {
        if let Some(old) = self.entries.remove(old_alias) {
            self.entries.insert(new_alias.to_owned(), old);
            self.entry(new_alias)
        } else {
            None
        }
    }

    fn get(&self, alias: &str) -> Result<&KeystoreEntry> {
        self.entries
            .get(alias)
            .ok_or_else(|| KeystoreAccessError::AliasNotFound(alias.to_owned()))
    }

    pub fn set_secret_key(&mut self, alias: &str, key: SecretKey) -> Result<()> {
        self.add_entry(alias, KeystoreEntry::SecretKey(key))
    }

    pub fn secret_key(&self, alias: &str) -> Result<&SecretKey> {
        match self.get(alias)? {
            KeystoreEntry::SecretKey(key) => Ok(key),
            _ => Err(wrong_entry_type(alias, "secret key")),
        }
    }

    /// Store a private key with its chain, leaf first. The chain must not be empty and must
    /// pass [verify_chain]; otherwise the store is left unchanged.
    pub fn set_private_key(&mut self, alias: &str, key: PrivateKey, chain: Vec<Certificate>) -> Result<()> {
        let local_key_id = chain
            .first()
            .map(LocalKeyId::for_certificate)
            .ok_or_else(|| KeystoreAccessError::EmptyChain(alias.to_owned()))?;
        self.add_entry(alias, KeystoreEntry::PrivateKey(PrivateKeyEntry::new(local_key_id, key, chain)))
    }

    pub fn private_key_entry(&self, alias: &str) -> Result<&PrivateKeyEntry> {
        match self.get(alias)? {
            KeystoreEntry::PrivateKey(entry) => Ok(entry),
            _ => Err(wrong_entry_type(alias, "private key")),
        }
    }

    pub fn private_key(&self, alias: &str) -> Result<&PrivateKey> {
        Ok(self.private_key_entry(alias)?.key())
    }

    /// Certificate chain of a private key entry, leaf first
    pub fn certificate_chain(&self, alias: &str) -> Result<&[Certificate]> {
        Ok(self.private_key_entry(alias)?.chain())
    }

    pub fn set_certificate(&mut self, alias: &str, cert: Certificate) {
        self.insert_entry(alias, KeystoreEntry::Certificate(cert));
    }

    /// Certificate of a certificate entry, or the leaf certificate of a private key entry
    pub fn certificate(&self, alias: &str) -> Result<&Certificate> {
        self.get(alias)?
            .leaf_certificate()
            .ok_or_else(|| wrong_entry_type(alias, "certificate"))
    }

    pub(crate) fn replace_chain(&mut self, alias: &str, chain: Vec<Certificate>) {
        if let Some(KeystoreEntry::PrivateKey(entry)) = self.entries.get_mut(alias) {
            entry.chain = chain;
        }
    }

    /// First certificate entry or key chain leaf whose subject equals `subject`
    pub fn find_by_subject(&self, subject: &str) -> Option<&Certificate> {
        self.entries
            .values()
            .filter_map(KeystoreEntry::leaf_certificate)
            .find(|c| c.subject() == subject)
    }

    /// Aliases whose certificate may sign other certificates.
    ///
    /// Entries whose certificate cannot be decoded are skipped.
    pub fn ca_aliases(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|(alias, entry)| {
                let cert = entry.leaf_certificate()?;
                match cert.can_sign_certificates() {
                    Ok(Some(true)) => Some(alias.clone()),
                    Ok(_) => None,
                    Err(e) => {
                        log::warn!("Skipping entry {alias}: {e}");
                        None
                    }
                }
            })
            .collect()
    }
}

fn wrong_entry_type(alias: &str, expected: &'static str) -> KeystoreAccessError {
    KeystoreAccessError::WrongEntryType {
        alias: alias.to_owned(),
        expected,
    }
}
