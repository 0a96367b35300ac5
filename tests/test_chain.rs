#![cfg(feature = "software-provider")]

mod common;

use keystore_toolkit::{
    Certificate, CertificateBuilder, is_self_signed,
    error::VerificationFailure,
    provider::KeyAlgorithm,
    reconstruct, verify_chain,
};

use crate::common::{key_pair, pki};

#[test]
fn test_built_certificates_are_self_signed() {
    let subjects = ["CN=Root CA", "CN=Device 42,O=Example,C=DE", "CN=Test,OU=Unit"];

    for (subject, days) in subjects.into_iter().zip([1, 365, 36500]) {
        for algorithm in [KeyAlgorithm::EcP256, KeyAlgorithm::Ed25519] {
            let pair = key_pair(algorithm);
            let chain = CertificateBuilder::new()
                .subject(subject)
                .validity_days(days)
                .build(&pair)
                .unwrap();

            assert_eq!(chain.len(), 1);
            assert_eq!(chain[0].subject(), chain[0].issuer());
            assert!(is_self_signed(&chain[0]));
        }
    }
}

#[test]
fn test_issued_certificate_is_not_self_signed() {
    let pki = pki();
    assert!(is_self_signed(&pki.root[0]));
    assert!(!is_self_signed(&pki.intermediate[0]));
    assert!(!is_self_signed(&pki.leaf[0]));
}

#[test]
fn test_self_issued_without_own_signature() {
    let pki = pki();
    let other = key_pair(KeyAlgorithm::EcP256);

    // names its own subject as issuer but is signed with the root key
    let cert = CertificateBuilder::new()
        .subject("CN=Root CA")
        .signed_by(pki.root_key.private_key().clone(), pki.root.clone())
        .build(&other)
        .unwrap();

    assert_eq!(cert[0].subject(), cert[0].issuer());
    assert!(!is_self_signed(&cert[0]));
}

#[test]
fn test_three_level_chain() {
    let pki = pki();

    assert_eq!(pki.leaf.len(), 3);
    assert_eq!(pki.leaf[1], pki.intermediate[0]);
    assert_eq!(pki.leaf[2], pki.root[0]);

    assert!(verify_chain(&pki.leaf).is_ok());
    assert!(verify_chain(&pki.leaf[1..]).is_ok());
    assert!(verify_chain(&pki.leaf[..1]).is_ok());
    assert!(verify_chain(&[]).is_ok());
}

#[test]
fn test_flipped_signature_bit() {
    let pki = pki();

    let mut der = pki.leaf[0].as_der().to_vec();
    let last = der.len() - 1;
    der[last] ^= 0x01;
    let tampered = Certificate::from_der(&der).unwrap();

    let mut chain = pki.leaf.clone();
    chain[0] = tampered;

    let err = verify_chain(&chain).unwrap_err();
    assert_eq!(err.position, 0);
    assert_eq!(err.reason, VerificationFailure::InvalidSignature);
}

#[test]
fn test_issuer_mismatch() {
    let pki = pki();
    let chain = vec![pki.leaf[0].clone(), pki.root[0].clone()];

    let err = verify_chain(&chain).unwrap_err();
    assert_eq!(err.position, 0);
    assert_eq!(err.reason, VerificationFailure::IssuerMismatch);
}

#[test]
fn test_reports_first_failing_position() {
    let pki = pki();
    let unrelated = CertificateBuilder::ca()
        .subject("CN=Root CA")
        .build(&key_pair(KeyAlgorithm::Ed25519))
        .unwrap();

    let chain = vec![pki.leaf[0].clone(), pki.intermediate[0].clone(), unrelated[0].clone()];

    let err = verify_chain(&chain).unwrap_err();
    assert_eq!(err.position, 1);
    assert_eq!(err.reason, VerificationFailure::KeyMismatch);
}

fn lookup(pool: &[Certificate]) -> impl FnMut(&str) -> Option<Certificate> + '_ {
    move |issuer| pool.iter().find(|c| c.subject() == issuer).cloned()
}

#[test]
fn test_reconstruct_full_chain() {
    let pki = pki();
    let pool = vec![pki.root[0].clone(), pki.intermediate[0].clone()];

    let chain = reconstruct(vec![pki.leaf[0].clone()], lookup(&pool));
    assert_eq!(chain, pki.leaf);

    let again = reconstruct(chain.clone(), lookup(&pool));
    assert_eq!(again, chain);
}

#[test]
fn test_reconstruct_partial_chain() {
    let pki = pki();
    let pool = vec![pki.intermediate[0].clone()];

    let chain = reconstruct(vec![pki.leaf[0].clone()], lookup(&pool));
    assert_eq!(chain, pki.leaf[..2].to_vec());

    assert_eq!(reconstruct(chain.clone(), lookup(&pool)), chain);
    assert!(reconstruct(Vec::new(), lookup(&pool)).is_empty());
}

#[test]
fn test_reconstruct_stops_on_cycle() {
    let pki = pki();
    let mut calls = 0;

    let chain = reconstruct(pki.leaf[..2].to_vec(), |_| {
        calls += 1;
        Some(pki.leaf[0].clone())
    });

    assert_eq!(chain, pki.leaf[..2].to_vec());
    assert_eq!(calls, 1);
}
