use std::fmt;

use der::{
    Decode, Encode, Sequence,
    asn1::{AnyRef, BitStringRef, ObjectIdentifier},
};
use x509_cert::spki::AlgorithmIdentifierRef;

use crate::{error::CertificateError, keychain::PublicKey};

/// X.509 certificate wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pub(crate) data: Vec<u8>,
    pub(crate) subject: String,
    pub(crate) issuer: String,
}

/// Outer certificate structure with the TBS part kept as raw encoded bytes
#[derive(Sequence)]
struct RawCertificate<'a> {
    tbs_certificate: AnyRef<'a>,
    signature_algorithm: AlgorithmIdentifierRef<'a>,
    signature: BitStringRef<'a>,
}

/// The signed content of a certificate, as needed to check its signature
pub(crate) struct SignedParts {
    pub tbs: Vec<u8>,
    pub algorithm: ObjectIdentifier,
    pub signature: Vec<u8>,
}

impl Certificate {
    /// Create certificate from DER encoding
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)?;
        Ok(Self {
            data: der.to_vec(),
            subject: cert.subject.to_string(),
            issuer: cert.issuer.to_string(),
        })
    }

    /// Get certificate subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get certificate issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Get certificate data in DER encoding
    pub fn as_der(&self) -> &[u8] {
        &self.data
    }

    /// Subject public key info of this certificate
    pub fn public_key(&self) -> Result<PublicKey, CertificateError> {
        let cert = x509_cert::Certificate::from_der(&self.data)?;
        let spki = &cert.tbs_certificate.subject_public_key_info;
        Ok(PublicKey {
            data: spki.to_der()?,
            oid: spki.algorithm.oid,
        })
    }

    /// Returns `Some(true)` if the key usage extension allows signing certificates,
    /// `Some(false)` if it is present without that bit and `None` if there is no key usage extension.
    pub fn can_sign_certificates(&self) -> Result<Option<bool>, CertificateError> {
        let (_, cert) = x509_parser::parse_x509_certificate(&self.data)?;
        let key_usage = cert.key_usage().map_err(x509_parser::nom::Err::Error)?;
        Ok(key_usage.map(|ku| ku.value.key_cert_sign()))
    }

    pub(crate) fn signed_parts(&self) -> Result<SignedParts, CertificateError> {
        let raw = RawCertificate::from_der(&self.data)?;
        Ok(SignedParts {
            tbs: raw.tbs_certificate.to_der()?,
            algorithm: raw.signature_algorithm.oid,
            signature: raw.signature.raw_bytes().to_vec(),
        })
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("data", &"<X.509>")
            .field("subject", &self.subject)
            .field("issuer", &self.issuer)
            .finish()
    }
}
