//!
//! Key and certificate material management, written in pure Rust.
//!
//! The crate covers the lifecycle of keys and X.509 certificates:
//!
//! * [pem] decodes armored text into typed items and encodes certificates and keys back
//! * [CertificateBuilder] creates self-signed or issuer-signed X.509 v3 certificates
//! * [verify_chain] checks the issuer names and signatures of a certificate chain
//! * [reconstruct] repairs chains truncated by formats that deduplicate certificates
//! * [KeystoreRepository] creates, loads, saves and converts keystores of the formats
//!   described by [KeystoreFormat]
//!
//! Signing, verification and private key encryption go through a process-wide
//! [provider::CryptoProvider]. With the default `software-provider` feature a pure Rust
//! provider supporting ECDSA P-256 and Ed25519 is installed on first use; another
//! provider can be installed with [provider::install] before that.
//!
//! Passwords are passed as [Password] values which clear the caller's buffer when the
//! operation returns, unless they are created with [BufferHandling::Preserve].
//!
//! Each entry in a keystore is accessed by 'alias', which is a friendly name chosen when creating it.
//! The first certificate of a private key chain is the entity certificate associated with the key,
//! followed by intermediates, and the root last.
//!

mod archive;
mod builder;
mod cert;
mod codec;
pub mod error;
mod format;
mod keychain;
mod keystore;
mod oid;
pub mod pem;
mod password;
mod pfx;
pub mod provider;
mod reconstruct;
mod repository;
pub mod secret;
#[cfg(feature = "software-provider")]
mod software;
mod verify;

pub use rand;

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, error::Error>;

pub use archive::ExportArchive;
pub use builder::CertificateBuilder;
pub use cert::Certificate;
pub use codec::MacAlgorithm;
pub use format::{BCPKCS12, FormatBackend, JCEKS, JKS, KeystoreFormat, PEM, PKCS12};
pub use keychain::{KeyPair, LocalKeyId, PrivateKey, PrivateKeyEntry, PublicKey};
pub use keystore::{Entries, Keystore, KeystoreEntry};
pub use password::{BufferHandling, Password};
pub use pfx::Pkcs12Backend;
pub use reconstruct::reconstruct;
pub use repository::{Conversion, KeystoreRepository};
#[cfg(feature = "software-provider")]
pub use software::SoftwareProvider;
pub use verify::{is_self_signed, verify_chain};
