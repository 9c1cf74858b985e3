// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `rotation.rs`

use super::*;
use crate::ca::{CaError, CertificateInfo, CertificatePair, CertificateSigner, SubjectConfig};

fn info(not_before: i64, not_after: i64, sans: &[&str]) -> CertificateInfo {
    CertificateInfo {
        not_before,
        not_after,
        common_name: "proxy-server".to_string(),
        serial: 7,
        sans: sans.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn at(unix: i64) -> ::time::OffsetDateTime {
    ::time::OffsetDateTime::from_unix_timestamp(unix).expect("valid timestamp")
}

const DAY: i64 = 24 * 60 * 60;

#[test]
fn san_set_matches_policy() {
    let sans = required_sans(
        &["foo".to_string()],
        Some("example.com"),
        "proxy-entrypoint",
        "proxy-ns",
    );

    let mut expected = vec![
        "127.0.0.1".to_string(),
        "localhost".to_string(),
        "example.com".to_string(),
        "foo".to_string(),
        "proxy-entrypoint.proxy-ns".to_string(),
        "proxy-entrypoint.proxy-ns.svc".to_string(),
    ];
    expected.sort();

    assert_eq!(sans, expected);
}

#[test]
fn san_set_without_entrypoint_is_loopback_only() {
    let sans = required_sans(&[], None, "proxy-entrypoint", "proxy-ns");

    assert!(sans.contains(&"127.0.0.1".to_string()));
    assert!(sans.contains(&"localhost".to_string()));
    assert!(sans.contains(&"proxy-entrypoint.proxy-ns".to_string()));
    assert!(sans.contains(&"proxy-entrypoint.proxy-ns.svc".to_string()));
    assert_eq!(sans.len(), 4);
}

#[test]
fn san_set_deduplicates() {
    // "localhost" as an additional SAN must not appear twice
    let sans = required_sans(
        &["localhost".to_string()],
        Some("localhost"),
        "svc",
        "ns",
    );
    let occurrences = sans.iter().filter(|s| s.as_str() == "localhost").count();
    assert_eq!(occurrences, 1);
}

#[test]
fn missing_secret_needs_rotation() {
    let policy = RotationPolicy::default();
    assert!(rotation_needed(None, &[], &policy, at(0)));
}

#[test]
fn valid_cert_needs_no_rotation() {
    let policy = RotationPolicy::default();
    let stored = StoredCert {
        info: info(0, 180 * DAY, &["localhost", "127.0.0.1"]),
        chains_to_ca: true,
    };
    // Day 10 of 180, everything covered
    assert!(!rotation_needed(
        Some(&stored),
        &["localhost".to_string()],
        &policy,
        at(10 * DAY)
    ));
}

#[test]
fn expired_cert_needs_rotation() {
    let policy = RotationPolicy::default();
    let stored = StoredCert {
        info: info(0, 180 * DAY, &["localhost"]),
        chains_to_ca: true,
    };
    assert!(rotation_needed(
        Some(&stored),
        &["localhost".to_string()],
        &policy,
        at(181 * DAY)
    ));
}

#[test]
fn cert_inside_renewal_window_needs_rotation() {
    let policy = RotationPolicy::default();
    let stored = StoredCert {
        info: info(0, 180 * DAY, &["localhost"]),
        chains_to_ca: true,
    };
    // Day 155 of 180: 25 days left, inside the 30-day window
    assert!(rotation_needed(
        Some(&stored),
        &["localhost".to_string()],
        &policy,
        at(155 * DAY)
    ));
    // Day 149: 31 days left, still outside
    assert!(!rotation_needed(
        Some(&stored),
        &["localhost".to_string()],
        &policy,
        at(149 * DAY)
    ));
}

#[test]
fn cert_from_stale_ca_needs_rotation() {
    let policy = RotationPolicy::default();
    let stored = StoredCert {
        info: info(0, 180 * DAY, &["localhost"]),
        chains_to_ca: false,
    };
    assert!(rotation_needed(
        Some(&stored),
        &["localhost".to_string()],
        &policy,
        at(DAY)
    ));
}

#[test]
fn cert_missing_a_required_san_needs_rotation() {
    let policy = RotationPolicy::default();
    let stored = StoredCert {
        info: info(0, 180 * DAY, &["localhost", "127.0.0.1"]),
        chains_to_ca: true,
    };
    // The entrypoint hostname was added to the configuration after issuance
    assert!(rotation_needed(
        Some(&stored),
        &["localhost".to_string(), "proxy.example.com".to_string()],
        &policy,
        at(DAY)
    ));
}

#[test]
fn usage_profiles_map_to_extensions() {
    assert!(UsageProfile::ServerAuth.extensions().is_empty());
    assert_eq!(UsageProfile::ClientAuth.extensions().len(), 1);
}

#[test]
fn policy_from_days() {
    let policy = RotationPolicy::from_days(90, 15);
    assert_eq!(policy.validity.whole_days(), 90);
    assert_eq!(policy.renew_before.whole_days(), 15);
}

#[test]
fn default_policy_matches_constants() {
    let policy = RotationPolicy::default();
    assert_eq!(policy.validity.whole_days(), 180);
    assert_eq!(policy.renew_before.whole_days(), 30);
}

/// Recording double for the signer capability seam.
#[derive(Default)]
struct StubSigner {
    requests: Vec<(String, Vec<String>, usize)>,
    observed: Vec<u64>,
}

impl CertificateSigner for StubSigner {
    fn sign(
        &mut self,
        subject: &SubjectConfig,
        _validity: ::time::Duration,
        extensions: &[crate::ca::ExtensionFn],
    ) -> std::result::Result<CertificatePair, CaError> {
        self.requests.push((
            subject.common_name.clone(),
            subject.sans.clone(),
            extensions.len(),
        ));
        Ok(CertificatePair {
            cert_pem: "stub-cert".to_string(),
            key_pem: "stub-key".to_string(),
        })
    }

    fn ca_data(&self) -> String {
        "stub-ca".to_string()
    }

    fn verify_leaf(&self, _cert_pem: &str) -> bool {
        true
    }

    fn observe_serial(&mut self, serial: u64) {
        self.observed.push(serial);
    }
}

#[test]
fn signer_seam_accepts_a_test_double() {
    let mut stub = StubSigner::default();
    let subject = SubjectConfig {
        common_name: "proxy-client".to_string(),
        sans: vec!["localhost".to_string()],
    };

    let pair = stub
        .sign(
            &subject,
            ::time::Duration::days(1),
            UsageProfile::ClientAuth.extensions(),
        )
        .expect("stub should sign");
    assert_eq!(pair.cert_pem, "stub-cert");

    stub.observe_serial(9);
    assert_eq!(stub.observed, vec![9]);

    let (cn, sans, extension_count) = &stub.requests[0];
    assert_eq!(cn, "proxy-client");
    assert_eq!(sans, &vec!["localhost".to_string()]);
    // The client-auth profile carries exactly one extension hook
    assert_eq!(*extension_count, 1);
}

#[test]
fn signer_trait_is_object_safe() {
    let stub: Box<dyn CertificateSigner> = Box::new(StubSigner::default());
    assert_eq!(stub.ca_data(), "stub-ca");
}
