//!
//! Export of a keystore as a set of armored files
//!
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    codec,
    error::{BackendError, FormatConversionError, KeystoreAccessError},
    keychain::PrivateKey,
    keystore::{Keystore, KeystoreEntry},
    pem,
};

/// File name to PEM text, in file name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportArchive {
    files: BTreeMap<String, String>,
}

impl ExportArchive {
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(name, text)| (name.as_str(), text.as_str()))
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> BTreeMap<String, String> {
        self.files
    }
}

/// Replace characters that are not safe in a portable file name
fn file_stem(alias: &str) -> String {
    alias
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// File stem of `alias` that no earlier alias has taken; clashes get a numeric suffix
fn unique_stem(alias: &str, used: &mut BTreeSet<String>) -> String {
    let base = file_stem(alias);
    let mut stem = base.clone();
    let mut n = 2;
    while !used.insert(stem.clone()) {
        stem = format!("{base}-{n}");
        n += 1;
    }
    if stem != base {
        log::warn!("File stem {base} is already taken, exporting {alias} as {stem}");
    }
    stem
}

/// Write every entry of `store` as PEM files.
///
/// Private and secret keys are encrypted with `password`. Each certificate of a chain gets its
/// own file, numbered from 1 in chain order; a certificate entry is a chain of one. Aliases
/// that sanitize to the same stem are kept apart with a `-2`, `-3`... suffix, in alias order.
pub(crate) fn export(store: &Keystore, password: &str) -> Result<ExportArchive, FormatConversionError> {
    let mut files = BTreeMap::new();
    let mut stems = BTreeSet::new();

    for (alias, entry) in store.entries() {
        let stem = unique_stem(alias, &mut stems);

        match entry {
            KeystoreEntry::PrivateKey(key) => {
                files.insert(
                    format!("{stem}.private.pem"),
                    pem::encrypted_private_key_pem(key.key(), password)?,
                );
                for (n, cert) in key.chain().iter().enumerate() {
                    files.insert(format!("{stem}.{}.cert.pem", n + 1), pem::encode_certificate(cert));
                }
            }
            KeystoreEntry::SecretKey(secret) => {
                let key_info = codec::secret_key_info(secret).map_err(KeystoreAccessError::from)?;
                let key = PrivateKey::from_der(&key_info)
                    .map_err(|_| KeystoreAccessError::from(BackendError::InvalidPrivateKey))?;
                files.insert(
                    format!("{stem}.secret.pem"),
                    pem::encrypted_private_key_pem(&key, password)?,
                );
            }
            KeystoreEntry::Certificate(cert) => {
                files.insert(format!("{stem}.1.cert.pem"), pem::encode_certificate(cert));
            }
        }
    }

    log::debug!("Exported {} entries into {} files", store.entries_len(), files.len());
    Ok(ExportArchive { files })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("server"), "server");
        assert_eq!(file_stem("my key/1"), "my_key_1");
        assert_eq!(file_stem("user@example.com"), "user@example.com");
    }

    #[test]
    fn test_unique_stem() {
        let mut used = BTreeSet::new();
        assert_eq!(unique_stem("my key", &mut used), "my_key");
        assert_eq!(unique_stem("my_key", &mut used), "my_key-2");
        assert_eq!(unique_stem("my/key", &mut used), "my_key-3");
        assert_eq!(unique_stem("my_key-2!", &mut used), "my_key-2_");
        assert_eq!(used.len(), 4);
    }
}
