// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Self-signed certificate authority for the proxy trust mesh.
//!
//! The operator owns exactly one root key pair per configuration, persisted as
//! a Secret (`ca.crt`/`ca.key`) in the proxy server namespace. Leaf
//! certificates for the tunnel endpoints are issued from it and written to
//! their own Secrets by the rotation engine.
//!
//! # Security model
//!
//! - The CA private key never leaves [`SelfSigner`]; peers receive only the
//!   public certificate via [`CertificateSigner::ca_data`].
//! - A corrupt or unreadable CA Secret is a fatal, operator-actionable error.
//!   It is never regenerated in place, because doing so would silently
//!   invalidate trust for every already-provisioned peer.
//! - Serial numbers are monotonic within one process lifetime. They are
//!   seeded at load time from the highest serial observed among the CA
//!   certificate and any leaf certificates the rotation engine parses, which
//!   keeps a restarted single-writer process from re-issuing a serial.

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::PostParams;
use kube::{Api, Client};
use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};
use x509_parser::prelude::*;

use crate::constants::{CA_CERT_KEY, CA_COMMON_NAME, CA_KEY_KEY, CA_VALIDITY_DAYS};

/// Organization name embedded in every issued certificate subject.
const ORGANIZATION: &str = "proxmesh";

/// CA errors.
#[derive(Debug, Error)]
pub enum CaError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Certificate generation failed
    #[error("certificate generation failed: {0}")]
    CertificateGeneration(String),

    /// Certificate or key parsing error
    #[error("certificate parsing error: {0}")]
    Parse(String),

    /// The CA is present but unusable for signing
    #[error("signing failed: {0}")]
    Signing(String),

    /// The persisted CA secret cannot be used. Deliberately fatal: the CA is
    /// never regenerated over an existing secret.
    #[error("CA secret {namespace}/{name} is unusable: {reason}")]
    CorruptCa {
        namespace: String,
        name: String,
        reason: String,
    },

    /// Kubernetes API failure while reading or persisting the CA secret
    #[error("failed to access CA secret {namespace}/{name}")]
    SecretAccess {
        #[source]
        source: kube::Error,
        namespace: String,
        name: String,
    },
}

/// Result type for CA operations.
pub type Result<T, E = CaError> = std::result::Result<T, E>;

/// A signed leaf certificate and its freshly generated private key.
#[derive(Clone, Debug)]
pub struct CertificatePair {
    /// PEM-encoded leaf certificate
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: String,
}

impl CertificatePair {
    /// Parse the pair's certificate metadata.
    pub fn info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.cert_pem)
    }
}

/// Subject identity for a signing request.
#[derive(Clone, Debug)]
pub struct SubjectConfig {
    /// Subject common name
    pub common_name: String,
    /// DNS and IP Subject Alternative Names
    pub sans: Vec<String>,
}

/// An extension hook applied to the certificate template before signing,
/// e.g. [`with_client_auth`].
pub type ExtensionFn = fn(&mut CertificateParams);

/// Force the extended key usage to TLS client authentication.
pub fn with_client_auth(params: &mut CertificateParams) {
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
}

/// Capability interface for issuing leaf certificates.
///
/// Production code uses [`SelfSigner`]; tests substitute a recording double.
/// Raw private-key material never crosses this boundary: `ca_data` exposes
/// only the public certificate.
pub trait CertificateSigner: Send + Sync {
    /// Issue a leaf certificate for `subject`, valid for `validity` from now,
    /// applying each extension hook to the template before signing.
    fn sign(
        &mut self,
        subject: &SubjectConfig,
        validity: ::time::Duration,
        extensions: &[ExtensionFn],
    ) -> Result<CertificatePair>;

    /// The CA certificate in PEM form, for distribution to trusting peers.
    fn ca_data(&self) -> String;

    /// Whether `cert_pem` chains to the current CA certificate.
    fn verify_leaf(&self, cert_pem: &str) -> bool;

    /// Report a serial seen on an existing leaf certificate, so the in-memory
    /// counter never re-issues it.
    fn observe_serial(&mut self, serial: u64);
}

/// Parsed identity and validity metadata of a certificate.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// Subject common name
    pub common_name: String,
    /// Serial number, folded into 64 bits
    pub serial: u64,
    /// DNS and IP Subject Alternative Names
    pub sans: Vec<String>,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate.
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CaError::Parse(format!("failed to parse certificate: {e}")))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let serial = cert
            .raw_serial()
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        let mut sans = Vec::new();
        if let Ok(Some(ext)) = cert.subject_alternative_name() {
            for name in &ext.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => sans.push((*dns).to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            sans.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            common_name,
            serial,
            sans,
        })
    }

    /// Whether the certificate has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: ::time::OffsetDateTime) -> bool {
        now.unix_timestamp() >= self.not_after
    }

    /// Whether the certificate expires within `window` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: ::time::OffsetDateTime, window: ::time::Duration) -> bool {
        (now + window).unix_timestamp() >= self.not_after
    }

    /// Whether every name in `required` appears in this certificate's SAN set.
    #[must_use]
    pub fn covers_sans(&self, required: &[String]) -> bool {
        required.iter().all(|san| self.sans.contains(san))
    }
}

/// Parse PEM-encoded data and return the DER bytes.
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| CaError::Parse(format!("failed to parse PEM: {e}")))?;
    Ok(pem_obj.contents().to_vec())
}

fn ip_from_bytes(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// The self-signed certificate authority.
///
/// Holds the root key pair as PEM (rcgen's `KeyPair` is not `Clone`, so the
/// key is re-loaded for each signing operation) plus the next serial to issue.
#[derive(Clone)]
pub struct SelfSigner {
    ca_cert_pem: String,
    ca_key_pem: String,
    next_serial: u64,
}

impl SelfSigner {
    /// Generate a fresh CA: a 2048-bit RSA key and a self-signed root
    /// certificate with the fixed CommonName.
    pub fn generate() -> Result<Self> {
        let ca_key_pem = generate_rsa_key_pem()?;
        let key_pair = KeyPair::from_pem(&ca_key_pem)
            .map_err(|e| CaError::KeyGeneration(format!("failed to load CA key: {e}")))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(CA_COMMON_NAME.to_string()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(ORGANIZATION.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        params.serial_number = Some(SerialNumber::from(1u64));

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + ::time::Duration::days(CA_VALIDITY_DAYS);

        let cert = params.self_signed(&key_pair).map_err(|e| {
            CaError::CertificateGeneration(format!("failed to create CA cert: {e}"))
        })?;

        Ok(Self {
            ca_cert_pem: cert.pem(),
            ca_key_pem,
            next_serial: 2,
        })
    }

    /// Load a CA from PEM material, seeding the serial counter from the CA
    /// certificate's own serial.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let _ = KeyPair::from_pem(key_pem)
            .map_err(|e| CaError::Parse(format!("failed to parse CA key: {e}")))?;
        let info = CertificateInfo::from_pem(cert_pem)?;

        Ok(Self {
            ca_cert_pem: cert_pem.to_string(),
            ca_key_pem: key_pem.to_string(),
            next_serial: info.serial.saturating_add(1),
        })
    }

    /// Read the CA Secret, or generate and persist a new CA when the Secret
    /// does not exist.
    ///
    /// Creation is a create-or-adopt pattern, not a lock: when the create
    /// races with another writer and loses with AlreadyExists, the winner's
    /// CA is re-read and adopted instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`CaError::CorruptCa`] when the Secret exists but cannot be
    /// parsed. This is fatal and requires operator intervention; the CA is
    /// never regenerated in place.
    pub async fn load_or_generate(client: &Client, namespace: &str, name: &str) -> Result<Self> {
        let api: Api<Secret> = Api::namespaced(client.clone(), namespace);

        match api.get_opt(name).await.map_err(|e| CaError::SecretAccess {
            source: e,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })? {
            Some(secret) => Self::from_secret(&secret, namespace, name),
            None => {
                info!(
                    namespace = %namespace,
                    name = %name,
                    "CA secret not found, provisioning a new self-signed CA"
                );
                let signer = Self::generate()?;

                let mut data = BTreeMap::new();
                data.insert(
                    CA_CERT_KEY.to_string(),
                    ByteString(signer.ca_cert_pem.clone().into_bytes()),
                );
                data.insert(
                    CA_KEY_KEY.to_string(),
                    ByteString(signer.ca_key_pem.clone().into_bytes()),
                );
                let secret = Secret {
                    metadata: ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    data: Some(data),
                    ..Default::default()
                };

                match api.create(&PostParams::default(), &secret).await {
                    Ok(_) => Ok(signer),
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {
                        // Lost the create race; adopt the winner's CA.
                        warn!(
                            namespace = %namespace,
                            name = %name,
                            "CA secret was created concurrently, adopting the existing CA"
                        );
                        let existing =
                            api.get(name).await.map_err(|e| CaError::SecretAccess {
                                source: e,
                                namespace: namespace.to_string(),
                                name: name.to_string(),
                            })?;
                        Self::from_secret(&existing, namespace, name)
                    }
                    Err(e) => Err(CaError::SecretAccess {
                        source: e,
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }),
                }
            }
        }
    }

    fn from_secret(secret: &Secret, namespace: &str, name: &str) -> Result<Self> {
        let corrupt = |reason: String| CaError::CorruptCa {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason,
        };

        let data = secret
            .data
            .as_ref()
            .ok_or_else(|| corrupt("secret has no data".to_string()))?;
        let cert_pem = data
            .get(CA_CERT_KEY)
            .ok_or_else(|| corrupt(format!("missing key {CA_CERT_KEY}")))
            .and_then(|b| {
                String::from_utf8(b.0.clone()).map_err(|e| corrupt(format!("{CA_CERT_KEY}: {e}")))
            })?;
        let key_pem = data
            .get(CA_KEY_KEY)
            .ok_or_else(|| corrupt(format!("missing key {CA_KEY_KEY}")))
            .and_then(|b| {
                String::from_utf8(b.0.clone()).map_err(|e| corrupt(format!("{CA_KEY_KEY}: {e}")))
            })?;

        Self::from_pem(&cert_pem, &key_pem).map_err(|e| corrupt(e.to_string()))
    }

    /// The CA private key in PEM form. Crate-internal: only the CA
    /// persistence path may see it.
    pub(crate) fn ca_key_pem(&self) -> &str {
        &self.ca_key_pem
    }

    /// The serial the next signed certificate will carry.
    #[must_use]
    pub fn next_serial(&self) -> u64 {
        self.next_serial
    }

    fn load_key_pair(&self) -> Result<KeyPair> {
        KeyPair::from_pem(&self.ca_key_pem)
            .map_err(|e| CaError::Signing(format!("failed to load CA key: {e}")))
    }
}

impl CertificateSigner for SelfSigner {
    fn sign(
        &mut self,
        subject: &SubjectConfig,
        validity: ::time::Duration,
        extensions: &[ExtensionFn],
    ) -> Result<CertificatePair> {
        let leaf_key = KeyPair::generate()
            .map_err(|e| CaError::KeyGeneration(format!("failed to generate leaf key: {e}")))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(subject.common_name.clone()),
        );
        dn.push(
            DnType::OrganizationName,
            DnValue::Utf8String(ORGANIZATION.to_string()),
        );
        params.distinguished_name = dn;

        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + validity;
        params.serial_number = Some(SerialNumber::from(self.next_serial));

        params.subject_alt_names = subject
            .sans
            .iter()
            .map(|san| {
                if let Ok(ip) = san.parse::<std::net::IpAddr>() {
                    Ok(SanType::IpAddress(ip))
                } else {
                    Ia5String::try_from(san.clone())
                        .map(SanType::DnsName)
                        .map_err(|e| {
                            CaError::CertificateGeneration(format!(
                                "invalid DNS name '{san}': {e}"
                            ))
                        })
                }
            })
            .collect::<Result<Vec<_>>>()?;

        for extension in extensions {
            extension(&mut params);
        }

        let ca_key = self.load_key_pair()?;
        let issuer = Issuer::from_ca_cert_pem(&self.ca_cert_pem, &ca_key)
            .map_err(|e| CaError::Signing(format!("failed to build issuer: {e}")))?;

        let cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| CaError::CertificateGeneration(format!("failed to sign leaf: {e}")))?;

        self.next_serial += 1;

        Ok(CertificatePair {
            cert_pem: cert.pem(),
            key_pem: leaf_key.serialize_pem(),
        })
    }

    fn ca_data(&self) -> String {
        self.ca_cert_pem.clone()
    }

    fn verify_leaf(&self, cert_pem: &str) -> bool {
        let Ok(leaf_der) = parse_pem(cert_pem) else {
            return false;
        };
        let Ok(ca_der) = parse_pem(&self.ca_cert_pem) else {
            return false;
        };
        let Ok((_, leaf)) = X509Certificate::from_der(&leaf_der) else {
            return false;
        };
        let Ok((_, ca)) = X509Certificate::from_der(&ca_der) else {
            return false;
        };
        leaf.verify_signature(Some(ca.public_key())).is_ok()
    }

    fn observe_serial(&mut self, serial: u64) {
        if serial >= self.next_serial {
            self.next_serial = serial.saturating_add(1);
        }
    }
}

/// Generate a 2048-bit RSA private key, PKCS#8 PEM encoded.
///
/// rcgen cannot generate RSA keys itself, only use them, so the key comes
/// from the `rsa` crate and is handed over as PEM.
fn generate_rsa_key_pem() -> Result<String> {
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPrivateKey;

    let mut rng = rand::rngs::OsRng;
    let key = RsaPrivateKey::new(&mut rng, 2048)
        .map_err(|e| CaError::KeyGeneration(format!("failed to generate RSA key: {e}")))?;
    key.to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| CaError::KeyGeneration(format!("failed to encode RSA key: {e}")))
}

#[cfg(test)]
#[path = "ca_tests.rs"]
mod ca_tests;
