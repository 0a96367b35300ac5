//!
//! Keystore format descriptors and the backend interface that reads and writes them
//!
use std::fmt;

use crate::{error::KeystoreAccessError, keystore::Keystore};

/// Immutable description of a persistent keystore format
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct KeystoreFormat {
    name: &'static str,
    extensions: &'static [&'static str],
    export_only: bool,
    deduplicates_chains: bool,
    supports_secret_keys: bool,
}

/// PKCS#12 keeping full chains for every key entry
pub static PKCS12: KeystoreFormat = KeystoreFormat {
    name: "PKCS12",
    extensions: &["p12", "pfx"],
    export_only: false,
    deduplicates_chains: false,
    supports_secret_keys: true,
};

/// PKCS#12 that drops chain certificates also stored as certificate entries
pub static BCPKCS12: KeystoreFormat = KeystoreFormat {
    name: "BCPKCS12",
    extensions: &["p12", "pfx"],
    export_only: false,
    deduplicates_chains: true,
    supports_secret_keys: true,
};

pub static JKS: KeystoreFormat = KeystoreFormat {
    name: "JKS",
    extensions: &["jks"],
    export_only: false,
    deduplicates_chains: false,
    supports_secret_keys: false,
};

pub static JCEKS: KeystoreFormat = KeystoreFormat {
    name: "JCEKS",
    extensions: &["jceks"],
    export_only: false,
    deduplicates_chains: false,
    supports_secret_keys: true,
};

/// One armored file per key and certificate; can be written but not read back as a store
pub static PEM: KeystoreFormat = KeystoreFormat {
    name: "PEM",
    extensions: &["pem"],
    export_only: true,
    deduplicates_chains: false,
    supports_secret_keys: true,
};

static FORMATS: [&KeystoreFormat; 5] = [&PKCS12, &BCPKCS12, &JKS, &JCEKS, &PEM];

impl KeystoreFormat {
    /// All known formats
    pub fn all() -> &'static [&'static KeystoreFormat] {
        &FORMATS
    }

    /// Case-insensitive lookup by name
    pub fn by_name(name: &str) -> Option<&'static KeystoreFormat> {
        FORMATS.iter().copied().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// First format using the given file extension, without the leading dot
    pub fn by_extension(extension: &str) -> Option<&'static KeystoreFormat> {
        FORMATS
            .iter()
            .copied()
            .find(|f| f.extensions.iter().any(|e| e.eq_ignore_ascii_case(extension)))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        self.extensions
    }

    pub fn export_only(&self) -> bool {
        self.export_only
    }

    pub fn deduplicates_chains(&self) -> bool {
        self.deduplicates_chains
    }

    pub fn supports_secret_keys(&self) -> bool {
        self.supports_secret_keys
    }
}

impl fmt::Display for KeystoreFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Reads and writes the binary layout of a keystore format
pub trait FormatBackend: Send + Sync {
    /// Decode `data` into a new store of `format`
    fn load(&self, format: &'static KeystoreFormat, data: &[u8], password: &str)
    -> Result<Keystore, KeystoreAccessError>;

    /// Encode `store`, protecting it with `password`
    fn save(&self, store: &Keystore, password: &str) -> Result<Vec<u8>, KeystoreAccessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(KeystoreFormat::by_name("pkcs12"), Some(&PKCS12));
        assert_eq!(KeystoreFormat::by_name("BCPKCS12"), Some(&BCPKCS12));
        assert_eq!(KeystoreFormat::by_name("BKS"), None);

        assert_eq!(KeystoreFormat::by_extension("PFX"), Some(&PKCS12));
        assert_eq!(KeystoreFormat::by_extension("jceks"), Some(&JCEKS));
        assert_eq!(KeystoreFormat::by_extension("txt"), None);
    }

    #[test]
    fn test_capabilities() {
        assert!(PEM.export_only());
        assert!(BCPKCS12.deduplicates_chains());
        assert!(!JKS.supports_secret_keys());
        assert_eq!(KeystoreFormat::all().len(), 5);
    }
}
