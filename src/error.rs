//!
//! Error types, one enum per operation category
//!
use hmac::digest::MacError;
use x509_parser::error::X509Error;

/// Failure to parse an X.509 certificate
#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error(transparent)]
    X509Error(#[from] x509_parser::nom::Err<X509Error>),

    #[error(transparent)]
    DerError(#[from] der::Error),
}

/// Malformed armor, base64 or ASN.1 inside a PEM block
#[derive(Debug, thiserror::Error)]
pub enum PemDecodeError {
    #[error(transparent)]
    Armor(#[from] pem::PemError),

    #[error("Malformed {label} block: {reason}")]
    Malformed { label: String, reason: String },
}

/// The decoded document does not have the shape the caller asked for
#[derive(Debug, thiserror::Error)]
#[error("Expected {expected}, found [{found}]")]
pub struct PemShapeError {
    pub expected: &'static str,
    pub found: String,
}

/// Password-protected material could not be opened
#[derive(Debug, thiserror::Error)]
pub enum EncryptedMaterialError {
    #[error("Password required")]
    PasswordRequired,

    #[error("Decryption failed, the password is probably wrong")]
    DecryptionFailed,

    #[error("Password is not valid UTF-8")]
    InvalidPasswordEncoding,

    #[error("Unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors reported by a [crate::provider::CryptoProvider]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("No cryptographic provider is available")]
    Unavailable,

    #[error("A cryptographic provider is already installed")]
    AlreadyInstalled,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Key does not match the algorithm")]
    KeyMismatch,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed")]
    Decryption,
}

#[derive(Debug, thiserror::Error)]
pub enum CertificateBuildError {
    #[error("Certificate subject is not set")]
    MissingSubject,

    #[error("Invalid distinguished name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Validity must be a positive number of days, got {0}")]
    InvalidValidity(i64),

    #[error("Issuer certificate chain is empty")]
    MissingIssuerCertificate,

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing failed")]
    Signing(#[source] ProviderError),

    #[error(transparent)]
    Encoding(#[from] der::Error),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("Built chain does not verify")]
    Verification(#[from] ChainVerificationError),
}

/// Reason a chain link failed to verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("issuer does not match the next subject")]
    IssuerMismatch,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,

    #[error("issuer key does not match the signature algorithm")]
    KeyMismatch,

    #[error("malformed certificate")]
    MalformedCertificate,

    #[error("no cryptographic provider")]
    ProviderUnavailable,
}

impl From<ProviderError> for VerificationFailure {
    fn from(value: ProviderError) -> Self {
        match value {
            ProviderError::Unavailable => VerificationFailure::ProviderUnavailable,
            ProviderError::UnsupportedAlgorithm(_) => VerificationFailure::UnsupportedAlgorithm,
            ProviderError::KeyMismatch | ProviderError::InvalidKey(_) => VerificationFailure::KeyMismatch,
            _ => VerificationFailure::InvalidSignature,
        }
    }
}

/// A chain link failed; `position` is the 0-based index of the certificate whose signature was checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Chain verification failed at position {position}: {reason}")]
pub struct ChainVerificationError {
    pub position: usize,
    pub reason: VerificationFailure,
}

/// PKCS#12 codec errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    DerError(#[from] der::Error),

    #[error("Invalid PFX version")]
    InvalidVersion,

    #[error("Unsupported ContentType")]
    UnsupportedContentType,

    #[error("Unsupported certificate type")]
    UnsupportedCertificateType,

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error("Invalid length")]
    InvalidLength,

    #[error("Invalid parameters")]
    InvalidParameters,

    #[error("Unsupported encryption scheme")]
    UnsupportedEncryptionScheme,

    #[error("{0}")]
    Pkcs5Error(String),

    #[error("Integrity check failed, the password is probably wrong")]
    MacError(#[from] MacError),

    #[error("Invalid private key")]
    InvalidPrivateKey,
}

#[derive(Debug, thiserror::Error)]
pub enum KeystoreAccessError {
    #[error("Alias not found: {0}")]
    AliasNotFound(String),

    #[error("Entry '{alias}' is not a {expected} entry")]
    WrongEntryType { alias: String, expected: &'static str },

    #[error("Operation '{operation}' is not supported by the {format} format")]
    UnsupportedOperation {
        format: &'static str,
        operation: &'static str,
    },

    #[error("The {format} format cannot hold the secret key '{alias}'")]
    UnsupportedEntry { format: &'static str, alias: String },

    #[error("Certificate chain for '{0}' is empty")]
    EmptyChain(String),

    #[error("Certificate chain for '{alias}' is invalid")]
    InvalidChain {
        alias: String,
        #[source]
        source: ChainVerificationError,
    },

    #[error("Keystore password is incorrect")]
    WrongPassword,

    #[error("No backend registered for the {0} format")]
    NoBackend(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Password(#[from] EncryptedMaterialError),
}

#[derive(Debug, thiserror::Error)]
pub enum FormatConversionError {
    #[error("Unsupported target format: {0}")]
    UnsupportedTarget(String),

    #[error("The {format} format lacks the '{capability}' capability")]
    MissingCapability {
        format: &'static str,
        capability: &'static str,
    },

    #[error(transparent)]
    Access(#[from] KeystoreAccessError),

    #[error(transparent)]
    Encrypted(#[from] EncryptedMaterialError),
}

/// Crate-wide error for operations spanning several categories
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    PemDecode(#[from] PemDecodeError),

    #[error(transparent)]
    PemShape(#[from] PemShapeError),

    #[error(transparent)]
    EncryptedMaterial(#[from] EncryptedMaterialError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    CertificateBuild(#[from] CertificateBuildError),

    #[error(transparent)]
    ChainVerification(#[from] ChainVerificationError),

    #[error(transparent)]
    KeystoreAccess(#[from] KeystoreAccessError),

    #[error(transparent)]
    FormatConversion(#[from] FormatConversionError),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid public key")]
    InvalidPublicKey,
}
