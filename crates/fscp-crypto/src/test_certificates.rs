//! Test-only certificate minting.
//!
//! Builds a small RSA PKI (two independent CAs plus leaves) with `rcgen`.
//! RSA key generation dominates test time, so the CA keys and a shared leaf
//! key are created once per process.

use crate::x509::Certificate;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use std::sync::OnceLock;

/// A certificate authority usable to sign test leaves
pub struct TestCa {
    /// The CA certificate, parsed
    pub certificate: Certificate,
    /// The CA private key
    pub private_key: RsaPrivateKey,
    signer: rcgen::Certificate,
}

fn generate_rsa_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa keygen")
}

fn rcgen_key_pair(key: &RsaPrivateKey) -> rcgen::KeyPair {
    let pkcs8 = key.to_pkcs8_der().expect("pkcs8 encode");
    rcgen::KeyPair::from_der_and_sign_algo(pkcs8.as_bytes(), &rcgen::PKCS_RSA_SHA256)
        .expect("rcgen key pair")
}

fn make_ca(common_name: &str) -> TestCa {
    let private_key = generate_rsa_key();

    let mut params = rcgen::CertificateParams::new(vec![]);
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.alg = &rcgen::PKCS_RSA_SHA256;
    params.key_pair = Some(rcgen_key_pair(&private_key));
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::KeyCertSign,
        rcgen::KeyUsagePurpose::DigitalSignature,
    ];

    let signer = rcgen::Certificate::from_params(params).expect("ca params");
    let der = signer.serialize_der().expect("ca der");

    TestCa {
        certificate: Certificate::from_der(&der).expect("ca parse"),
        private_key,
        signer,
    }
}

/// The default test CA (created once per process)
pub fn test_ca() -> &'static TestCa {
    static CA: OnceLock<TestCa> = OnceLock::new();
    CA.get_or_init(|| make_ca("fscp test ca"))
}

/// A second, unrelated CA for negative trust tests
pub fn other_ca() -> &'static TestCa {
    static CA: OnceLock<TestCa> = OnceLock::new();
    CA.get_or_init(|| make_ca("fscp other ca"))
}

fn shared_leaf_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(generate_rsa_key)
}

/// Mint a leaf certificate named `common_name`, signed by `ca`.
///
/// All leaves share one RSA key to keep test runtime bounded; mint a fresh
/// key yourself where key distinctness matters.
pub fn leaf_signed_by(common_name: &str, ca: &TestCa) -> (Certificate, RsaPrivateKey) {
    let key = shared_leaf_key().clone();

    let mut params = rcgen::CertificateParams::new(vec![]);
    let mut dn = rcgen::DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.alg = &rcgen::PKCS_RSA_SHA256;
    params.key_pair = Some(rcgen_key_pair(&key));
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyEncipherment,
        rcgen::KeyUsagePurpose::KeyAgreement,
    ];

    let cert = rcgen::Certificate::from_params(params).expect("leaf params");
    let der = cert
        .serialize_der_with_signer(&ca.signer)
        .expect("leaf der");

    (Certificate::from_der(&der).expect("leaf parse"), key)
}

/// Mint a leaf signed by the default test CA
pub fn leaf(common_name: &str) -> (Certificate, RsaPrivateKey) {
    leaf_signed_by(common_name, test_ca())
}
