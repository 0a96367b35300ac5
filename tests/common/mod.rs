#![allow(dead_code)]

use keystore_toolkit::{
    Certificate, CertificateBuilder, KeyPair, Password,
    provider::{self, KeyAlgorithm},
};

pub const PASSWORD: &str = "changeit";

pub fn password(buf: &mut Vec<u8>) -> Password<'_> {
    buf.clear();
    buf.extend_from_slice(PASSWORD.as_bytes());
    Password::new(buf)
}

pub fn key_pair(algorithm: KeyAlgorithm) -> KeyPair {
    provider::require().unwrap().generate_key_pair(algorithm).unwrap()
}

/// Root, intermediate and leaf material, each chain leaf first
pub struct Pki {
    pub root_key: KeyPair,
    pub root: Vec<Certificate>,
    pub intermediate_key: KeyPair,
    pub intermediate: Vec<Certificate>,
    pub leaf_key: KeyPair,
    pub leaf: Vec<Certificate>,
}

pub fn pki() -> Pki {
    let root_key = key_pair(KeyAlgorithm::EcP256);
    let root = CertificateBuilder::ca()
        .subject("CN=Root CA")
        .validity_days(3650)
        .build(&root_key)
        .unwrap();

    let intermediate_key = key_pair(KeyAlgorithm::Ed25519);
    let intermediate = CertificateBuilder::ca()
        .subject("CN=Intermediate CA")
        .signed_by(root_key.private_key().clone(), root.clone())
        .build(&intermediate_key)
        .unwrap();

    let leaf_key = key_pair(KeyAlgorithm::EcP256);
    let leaf = CertificateBuilder::new()
        .subject("CN=server.example.com")
        .signed_by(intermediate_key.private_key().clone(), intermediate.clone())
        .build(&leaf_key)
        .unwrap();

    Pki {
        root_key,
        root,
        intermediate_key,
        intermediate,
        leaf_key,
        leaf,
    }
}
