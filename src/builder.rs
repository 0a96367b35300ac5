//!
//! X.509 v3 certificate builder
//!
use std::{
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use der::{
    DateTime, Decode, Encode,
    asn1::{BitString, GeneralizedTime, OctetString, UtcTime},
    oid::ObjectIdentifier,
};
use sha1::{Digest, Sha1};
use x509_cert::{
    TbsCertificate, Version,
    ext::{
        Extension,
        pkix::{AuthorityKeyIdentifier, BasicConstraints, KeyUsage, KeyUsages, SubjectKeyIdentifier},
    },
    name::Name,
    serial_number::SerialNumber,
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    time::{Time, Validity},
};

use crate::{
    cert::Certificate,
    error::CertificateBuildError,
    keychain::{KeyPair, PrivateKey},
    oid,
    provider::{self, SignatureAlgorithm},
    verify::verify_chain,
};

type Result<T> = std::result::Result<T, CertificateBuildError>;

const DEFAULT_VALIDITY_DAYS: i64 = 365;
const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Certificate builder.
///
/// Without a signer the certificate is self-issued and signed with the subject's own key.
/// With a signer the issuer name is taken from the signer's leaf certificate, the
/// certificate is signed with the signer's key and the signer's chain is appended to the output.
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    ca: bool,
    subject: Option<String>,
    issuer: Option<String>,
    validity_days: i64,
    signature_algorithm: Option<SignatureAlgorithm>,
    signer: Option<(PrivateKey, Vec<Certificate>)>,
}

impl Default for CertificateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CertificateBuilder {
    /// Builder for an end-entity certificate
    pub fn new() -> Self {
        Self {
            ca: false,
            subject: None,
            issuer: None,
            validity_days: DEFAULT_VALIDITY_DAYS,
            signature_algorithm: None,
            signer: None,
        }
    }

    /// Builder for a CA certificate
    pub fn ca() -> Self {
        Self { ca: true, ..Self::new() }
    }

    /// Subject distinguished name, e.g. `CN=Root CA,O=Example`
    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_owned());
        self
    }

    /// Issuer distinguished name of a self-issued certificate. Ignored when a signer is set
    pub fn issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(issuer.to_owned());
        self
    }

    /// Validity period in days, starting now. Default is 365
    pub fn validity_days(mut self, days: i64) -> Self {
        self.validity_days = days;
        self
    }

    /// Signature algorithm. Default is derived from the signing key
    pub fn signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = Some(algorithm);
        self
    }

    /// Sign with `key`, whose certificate is the first element of `chain`
    pub fn signed_by(mut self, key: PrivateKey, chain: Vec<Certificate>) -> Self {
        self.signer = Some((key, chain));
        self
    }

    /// Build a certificate for `key_pair`.
    ///
    /// Returns the new certificate followed by the signer's chain. The result is checked
    /// with [verify_chain] before it is returned.
    pub fn build(&self, key_pair: &KeyPair) -> Result<Vec<Certificate>> {
        let subject_str = self.subject.as_deref().ok_or(CertificateBuildError::MissingSubject)?;
        let subject = parse_name(subject_str)?;

        if self.validity_days <= 0 {
            return Err(CertificateBuildError::InvalidValidity(self.validity_days));
        }

        let spki = SubjectPublicKeyInfoOwned::from_der(key_pair.public_key().as_der())?;

        let mut extensions = vec![
            extension(
                oid::BASIC_CONSTRAINTS_OID,
                true,
                &BasicConstraints {
                    ca: self.ca,
                    path_len_constraint: None,
                },
            )?,
            extension(oid::KEY_USAGE_OID, true, &self.key_usage())?,
            extension(
                oid::SUBJECT_KEY_IDENTIFIER_OID,
                false,
                &SubjectKeyIdentifier(OctetString::new(key_identifier(&spki))?),
            )?,
        ];

        let (signing_key, issuer, signer_chain) = match &self.signer {
            Some((key, chain)) => {
                let leaf = chain.first().ok_or(CertificateBuildError::MissingIssuerCertificate)?;
                let leaf = x509_cert::Certificate::from_der(leaf.as_der())?;

                extensions.push(extension(
                    oid::AUTHORITY_KEY_IDENTIFIER_OID,
                    false,
                    &AuthorityKeyIdentifier {
                        key_identifier: Some(OctetString::new(key_identifier(
                            &leaf.tbs_certificate.subject_public_key_info,
                        ))?),
                        authority_cert_issuer: None,
                        authority_cert_serial_number: None,
                    },
                )?);

                (key, leaf.tbs_certificate.subject, Some(chain))
            }
            None => {
                let issuer = match self.issuer.as_deref() {
                    Some(issuer) => parse_name(issuer)?,
                    None => subject.clone(),
                };
                (key_pair.private_key(), issuer, None)
            }
        };

        let algorithm = match self.signature_algorithm {
            Some(algorithm) => algorithm,
            None => SignatureAlgorithm::for_key(signing_key.oid())
                .ok_or_else(|| CertificateBuildError::UnsupportedAlgorithm(signing_key.oid().to_string()))?,
        };

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let lifetime = u64::try_from(self.validity_days)
            .ok()
            .and_then(|days| days.checked_mul(SECONDS_PER_DAY))
            .and_then(|secs| now.checked_add(Duration::from_secs(secs)))
            .ok_or(CertificateBuildError::InvalidValidity(self.validity_days))?;

        let signature_algorithm = AlgorithmIdentifierOwned {
            oid: algorithm.oid(),
            parameters: None,
        };

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number: random_serial()?,
            signature: signature_algorithm.clone(),
            issuer,
            validity: Validity {
                not_before: to_time(now)?,
                not_after: to_time(lifetime)?,
            },
            subject,
            subject_public_key_info: spki,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        };

        let tbs = tbs_certificate.to_der()?;
        let signature = provider::require()
            .and_then(|p| p.sign(signing_key, algorithm, &tbs))
            .map_err(CertificateBuildError::Signing)?;

        let cert = x509_cert::Certificate {
            tbs_certificate,
            signature_algorithm,
            signature: BitString::from_bytes(&signature)?,
        };

        let cert = Certificate::from_der(&cert.to_der()?)?;
        log::debug!("Built certificate for {}, issued by {}", cert.subject(), cert.issuer());

        let chain: Vec<Certificate> = std::iter::once(cert)
            .chain(signer_chain.into_iter().flatten().cloned())
            .collect();
        verify_chain(&chain)?;

        Ok(chain)
    }

    fn key_usage(&self) -> KeyUsage {
        let mut usages = KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment;
        if self.ca {
            usages |= KeyUsages::KeyCertSign;
        }
        KeyUsage(usages)
    }
}

fn parse_name(name: &str) -> Result<Name> {
    Name::from_str(name).map_err(|e| CertificateBuildError::InvalidName {
        name: name.to_owned(),
        reason: e.to_string(),
    })
}

fn extension<T: Encode>(extn_id: ObjectIdentifier, critical: bool, value: &T) -> Result<Extension> {
    Ok(Extension {
        extn_id,
        critical,
        extn_value: OctetString::new(value.to_der()?)?,
    })
}

/// SHA-1 over the subject public key bits (RFC 5280, section 4.2.1.2, method 1)
fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

/// Positive, non-zero 64-bit serial number
fn random_serial() -> Result<SerialNumber> {
    let value = rand::random::<u64>().max(1);
    let bytes = value.to_be_bytes();
    let serial = if bytes[0] & 0x80 != 0 {
        let mut v = Vec::with_capacity(9);
        v.push(0);
        v.extend_from_slice(&bytes);
        v
    } else {
        bytes.to_vec()
    };
    Ok(SerialNumber::new(&serial)?)
}

/// UTCTime through 2049, GeneralizedTime from 2050 on (RFC 5280, section 4.1.2.5)
fn to_time(since_epoch: Duration) -> Result<Time> {
    let dt = DateTime::from_unix_duration(since_epoch)?;
    if dt.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_date_time(dt)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_date_time(dt)))
    }
}

#[cfg(all(test, feature = "software-provider"))]
mod tests {
    use super::*;
    use crate::{provider::KeyAlgorithm, verify::is_self_signed};

    fn key_pair(algorithm: KeyAlgorithm) -> KeyPair {
        provider::require().unwrap().generate_key_pair(algorithm).unwrap()
    }

    #[test]
    fn test_self_signed_ca() {
        let pair = key_pair(KeyAlgorithm::EcP256);
        let chain = CertificateBuilder::ca().subject("CN=Root CA").build(&pair).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].subject(), "CN=Root CA");
        assert_eq!(chain[0].issuer(), "CN=Root CA");
        assert!(is_self_signed(&chain[0]));
        assert_eq!(chain[0].can_sign_certificates().unwrap(), Some(true));
        assert_eq!(&chain[0].public_key().unwrap(), pair.public_key());
    }

    #[test]
    fn test_signed_by_issuer() {
        let root_pair = key_pair(KeyAlgorithm::Ed25519);
        let root = CertificateBuilder::ca().subject("CN=Root CA").build(&root_pair).unwrap();

        let leaf_pair = key_pair(KeyAlgorithm::EcP256);
        let chain = CertificateBuilder::new()
            .subject("CN=server")
            .issuer("CN=ignored")
            .signed_by(root_pair.private_key().clone(), root.clone())
            .build(&leaf_pair)
            .unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].issuer(), "CN=Root CA");
        assert_eq!(chain[1], root[0]);
        assert_eq!(chain[0].can_sign_certificates().unwrap(), Some(false));
        assert!(!is_self_signed(&chain[0]));
    }

    #[test]
    fn test_explicit_issuer_without_signer() {
        let pair = key_pair(KeyAlgorithm::EcP256);
        let chain = CertificateBuilder::new()
            .subject("CN=leaf")
            .issuer("CN=someone else")
            .build(&pair)
            .unwrap();
        assert_eq!(chain[0].issuer(), "CN=someone else");
        assert!(!is_self_signed(&chain[0]));
    }

    #[test]
    fn test_build_errors() {
        let pair = key_pair(KeyAlgorithm::EcP256);

        assert!(matches!(
            CertificateBuilder::new().build(&pair),
            Err(CertificateBuildError::MissingSubject)
        ));
        assert!(matches!(
            CertificateBuilder::new().subject("CN=leaf").validity_days(0).build(&pair),
            Err(CertificateBuildError::InvalidValidity(0))
        ));
        assert!(matches!(
            CertificateBuilder::new().subject("not a name").build(&pair),
            Err(CertificateBuildError::InvalidName { .. })
        ));
        assert!(matches!(
            CertificateBuilder::new()
                .subject("CN=leaf")
                .signed_by(pair.private_key().clone(), Vec::new())
                .build(&pair),
            Err(CertificateBuildError::MissingIssuerCertificate)
        ));
        assert!(matches!(
            CertificateBuilder::new()
                .subject("CN=leaf")
                .signature_algorithm(SignatureAlgorithm::Ed25519)
                .build(&pair),
            Err(CertificateBuildError::Signing(_))
        ));
    }

    #[test]
    fn test_wrong_signer_key_fails_verification() {
        let root_pair = key_pair(KeyAlgorithm::EcP256);
        let root = CertificateBuilder::ca().subject("CN=Root CA").build(&root_pair).unwrap();

        let other_pair = key_pair(KeyAlgorithm::EcP256);
        let result = CertificateBuilder::new()
            .subject("CN=server")
            .signed_by(other_pair.private_key().clone(), root)
            .build(&other_pair);

        assert!(matches!(result, Err(CertificateBuildError::Verification(e)) if e.position == 0));
    }
}
