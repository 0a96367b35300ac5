//!
//! Keystore lifecycle: create, load, save and convert between formats.
//!
//! Every operation taking a [Password] clears it when it returns, according to its
//! [crate::BufferHandling].
//!
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    archive::{self, ExportArchive},
    error::{FormatConversionError, KeystoreAccessError},
    format::{BCPKCS12, FormatBackend, KeystoreFormat, PKCS12},
    keystore::{Keystore, KeystoreEntry},
    password::Password,
    pfx::Pkcs12Backend,
    reconstruct::reconstruct,
    verify::verify_chain,
};

/// Result of [KeystoreRepository::convert]
#[derive(Debug)]
pub enum Conversion {
    /// The target format is export only
    Archive(ExportArchive),
    /// A new store of the target format and its serialized form
    Store { store: Keystore, data: Vec<u8> },
}

/// Format name to backend map
pub struct KeystoreRepository {
    backends: BTreeMap<&'static str, Box<dyn FormatBackend>>,
}

impl Default for KeystoreRepository {
    /// Repository with the built-in PKCS#12 backends
    fn default() -> Self {
        let mut repository = Self::empty();
        repository.register(&PKCS12, Box::new(Pkcs12Backend::new()));
        repository.register(&BCPKCS12, Box::new(Pkcs12Backend::new().deduplicate(true)));
        repository
    }
}

impl KeystoreRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository without any backend
    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// Register or replace the backend of a format
    pub fn register(&mut self, format: &'static KeystoreFormat, backend: Box<dyn FormatBackend>) {
        self.backends.insert(format.name(), backend);
    }

    fn backend(
        &self,
        format: &'static KeystoreFormat,
        operation: &'static str,
    ) -> Result<&dyn FormatBackend, KeystoreAccessError> {
        if format.export_only() {
            return Err(KeystoreAccessError::UnsupportedOperation {
                format: format.name(),
                operation,
            });
        }
        self.backends
            .get(format.name())
            .map(|b| b.as_ref())
            .ok_or(KeystoreAccessError::NoBackend(format.name()))
    }

    /// Create an empty store protected by `password`
    pub fn create(
        &self,
        format: &'static KeystoreFormat,
        password: Password<'_>,
    ) -> Result<Keystore, KeystoreAccessError> {
        let mut store = Keystore::new(format);
        store.set_password(password.as_str()?);
        Ok(store)
    }

    /// Decode a store. Chains of a deduplicating format are repaired from the store's own entries
    pub fn load(
        &self,
        format: &'static KeystoreFormat,
        data: &[u8],
        password: Password<'_>,
    ) -> Result<Keystore, KeystoreAccessError> {
        let password = password.as_str()?;
        let mut store = self.backend(format, "load")?.load(format, data, password)?;
        store.set_password(password);

        if format.deduplicates_chains() {
            repair_chains(&mut store);
        }

        Ok(store)
    }

    pub fn save(&self, store: &Keystore, password: Password<'_>) -> Result<Vec<u8>, KeystoreAccessError> {
        self.backend(store.format(), "save")?.save(store, password.as_str()?)
    }

    /// Convert `store` into the format named `target`.
    ///
    /// `source_password` must be the password the store was created or loaded with. Keys in the
    /// result are protected with `target_password`.
    pub fn convert(
        &self,
        store: &Keystore,
        source_password: Password<'_>,
        target: &str,
        target_password: Password<'_>,
    ) -> Result<Conversion, FormatConversionError> {
        if !store.unlocks(source_password.as_str()?) {
            return Err(KeystoreAccessError::WrongPassword.into());
        }

        let target = KeystoreFormat::by_name(target)
            .ok_or_else(|| FormatConversionError::UnsupportedTarget(target.to_owned()))?;
        let target_password = target_password.as_str()?;

        log::debug!("Converting {} store to {}", store.format(), target);

        if target.export_only() {
            return Ok(Conversion::Archive(archive::export(store, target_password)?));
        }

        let mut converted = Keystore::new(target);
        for (alias, entry) in store.entries() {
            converted.add_entry(alias, entry.clone())?;
        }
        converted.set_password(target_password);

        let backend = self
            .backends
            .get(target.name())
            .ok_or(FormatConversionError::MissingCapability {
                format: target.name(),
                capability: "save",
            })?;

        let data = backend.save(&converted, target_password)?;

        Ok(Conversion::Store { store: converted, data })
    }

    /// Aliases of entries whose certificate may sign other certificates
    pub fn list_ca_aliases(&self, store: &Keystore) -> BTreeSet<String> {
        store.ca_aliases()
    }
}

/// Rebuild every key chain from the store's own entries, keeping only repairs that verify
fn repair_chains(store: &mut Keystore) {
    let chains: Vec<_> = store
        .entries()
        .filter_map(|(alias, entry)| match entry {
            KeystoreEntry::PrivateKey(key) => Some((alias.clone(), key.chain().to_vec())),
            _ => None,
        })
        .collect();

    for (alias, chain) in chains {
        let original_len = chain.len();
        let repaired = reconstruct(chain, |issuer| store.find_by_subject(issuer).cloned());

        if repaired.len() == original_len {
            continue;
        }

        match verify_chain(&repaired) {
            Ok(()) => {
                log::debug!("Repaired chain of {alias}: {original_len} -> {}", repaired.len());
                store.replace_chain(&alias, repaired);
            }
            Err(e) => log::warn!("Keeping stored chain of {alias}, repaired chain is invalid: {e}"),
        }
    }
}

#[cfg(all(test, feature = "software-provider"))]
mod tests {
    use super::*;
    use crate::{
        builder::CertificateBuilder,
        keychain::KeyPair,
        provider::{self, KeyAlgorithm},
    };

    fn key_pair() -> KeyPair {
        provider::require().unwrap().generate_key_pair(KeyAlgorithm::EcP256).unwrap()
    }

    fn repository() -> KeystoreRepository {
        let mut repository = KeystoreRepository::empty();
        repository.register(
            &BCPKCS12,
            Box::new(
                Pkcs12Backend::new()
                    .deduplicate(true)
                    .encryption_iterations(1000)
                    .mac_iterations(1000),
            ),
        );
        repository
    }

    #[test]
    fn test_repair_rejects_issuer_with_other_key() {
        let ca_key = key_pair();
        let ca = CertificateBuilder::ca().subject("CN=CA").build(&ca_key).unwrap();
        let server_key = key_pair();
        let server = CertificateBuilder::new()
            .subject("CN=server")
            .signed_by(ca_key.private_key().clone(), ca)
            .build(&server_key)
            .unwrap();
        let impostor = CertificateBuilder::ca().subject("CN=CA").build(&key_pair()).unwrap();

        let mut store = Keystore::new(&BCPKCS12);
        store
            .set_private_key("server", server_key.private_key().clone(), server[..1].to_vec())
            .unwrap();
        store.set_certificate("ca", impostor[0].clone());

        let repository = repository();
        let mut buf = b"changeit".to_vec();
        let data = repository.save(&store, Password::new(&mut buf)).unwrap();
        let mut buf = b"changeit".to_vec();
        let loaded = repository.load(&BCPKCS12, &data, Password::new(&mut buf)).unwrap();

        assert_eq!(loaded.certificate_chain("server").unwrap(), &server[..1]);
        assert_eq!(loaded.certificate("ca").unwrap(), &impostor[0]);
    }

    #[test]
    fn test_repair_restores_verified_chain() {
        let ca_key = key_pair();
        let ca = CertificateBuilder::ca().subject("CN=CA").build(&ca_key).unwrap();
        let server_key = key_pair();
        let server = CertificateBuilder::new()
            .subject("CN=server")
            .signed_by(ca_key.private_key().clone(), ca.clone())
            .build(&server_key)
            .unwrap();

        let mut store = Keystore::new(&BCPKCS12);
        store
            .set_private_key("server", server_key.private_key().clone(), server[..1].to_vec())
            .unwrap();
        store.set_certificate("ca", ca[0].clone());

        repair_chains(&mut store);
        assert_eq!(store.certificate_chain("server").unwrap(), server.as_slice());
    }
}
