// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate rotation for the tunnel endpoints.
//!
//! Each rotation target is a (namespace, secret name, SAN set, usage profile)
//! tuple backed by the shared self-signed CA. A target's Secret is re-issued
//! whenever it is missing, no longer chains to the current CA, has expired,
//! is inside the renewal window, or no longer covers the required SAN set.
//! Secrets are only ever overwritten, never deleted.
//!
//! Rotation is idempotent: a pass that aborts part-way leaves valid targets
//! untouched and the next pass re-derives everything from scratch.

use anyhow::{Context as AnyhowContext, Result};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::PostParams;
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::ca::{
    with_client_auth, CertificateInfo, CertificateSigner, ExtensionFn, SubjectConfig,
};
use crate::constants::{
    DEFAULT_CERT_VALIDITY_DAYS, DEFAULT_RENEW_BEFORE_DAYS, TLS_CERT_KEY, TLS_KEY_KEY,
};
use crate::labels::{K8S_MANAGED_BY, K8S_PART_OF, MANAGED_BY_CONTROLLER, PART_OF_PROXMESH};
use crate::metrics::record_certificate_signed;

/// Validity and proactive-renewal settings for issued leaf certificates.
#[derive(Clone, Debug)]
pub struct RotationPolicy {
    /// Lifetime of newly issued certificates.
    pub validity: ::time::Duration,
    /// A certificate inside this window before `NotAfter` is re-issued ahead
    /// of expiry.
    pub renew_before: ::time::Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            validity: ::time::Duration::days(DEFAULT_CERT_VALIDITY_DAYS),
            renew_before: ::time::Duration::days(DEFAULT_RENEW_BEFORE_DAYS),
        }
    }
}

impl RotationPolicy {
    /// Build a policy from day counts, as configured on the command line.
    #[must_use]
    pub fn from_days(validity_days: i64, renew_before_days: i64) -> Self {
        Self {
            validity: ::time::Duration::days(validity_days),
            renew_before: ::time::Duration::days(renew_before_days),
        }
    }
}

/// Extended key usage profile of a rotation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageProfile {
    /// TLS server authentication (the rcgen template default).
    ServerAuth,
    /// TLS client authentication, forced via an extension hook.
    ClientAuth,
}

impl UsageProfile {
    /// Extension hooks applied to the signing template for this profile.
    #[must_use]
    pub fn extensions(self) -> &'static [ExtensionFn] {
        match self {
            UsageProfile::ServerAuth => &[],
            UsageProfile::ClientAuth => &[with_client_auth],
        }
    }
}

/// One certificate Secret to keep present, valid and chained to the CA.
#[derive(Clone, Debug)]
pub struct RotationTarget {
    /// Namespace of the target Secret
    pub namespace: String,
    /// Name of the target Secret
    pub secret_name: String,
    /// Subject common name for issued certificates
    pub common_name: String,
    /// Required SAN set
    pub sans: Vec<String>,
    /// Extended key usage profile
    pub usage: UsageProfile,
}

/// Compute the required SAN set for a target.
///
/// The policy is identical for the proxy-server, agent-server and
/// proxy-client targets: the configured additional SANs, the loopback
/// identities, the resolved entrypoint address (which for a `Hostname`
/// entrypoint is the literal hostname value), and the stable in-cluster
/// Service identities.
#[must_use]
pub fn required_sans(
    additional: &[String],
    entrypoint_address: Option<&str>,
    service_name: &str,
    namespace: &str,
) -> Vec<String> {
    let mut sans: Vec<String> = additional.to_vec();
    sans.push("127.0.0.1".to_string());
    sans.push("localhost".to_string());
    if let Some(address) = entrypoint_address {
        sans.push(address.to_string());
    }
    sans.push(format!("{service_name}.{namespace}"));
    sans.push(format!("{service_name}.{namespace}.svc"));

    sans.sort();
    sans.dedup();
    sans
}

/// Parsed state of an existing target Secret's certificate.
#[derive(Clone, Debug)]
pub struct StoredCert {
    /// Parsed certificate metadata
    pub info: CertificateInfo,
    /// Whether the certificate chains to the current CA
    pub chains_to_ca: bool,
}

/// Decide whether a target must be re-issued.
///
/// `stored` is `None` when the Secret is absent or its certificate does not
/// parse; both mean the stored pair has failed validation and a fresh one is
/// signed.
#[must_use]
pub fn rotation_needed(
    stored: Option<&StoredCert>,
    required: &[String],
    policy: &RotationPolicy,
    now: ::time::OffsetDateTime,
) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    if !stored.chains_to_ca {
        return true;
    }
    if stored.info.is_expired(now) || stored.info.expires_within(now, policy.renew_before) {
        return true;
    }
    !stored.info.covers_sans(required)
}

/// Guarantee that the target Secret holds a valid certificate pair, signing a
/// fresh one when needed.
///
/// Returns `true` when a new certificate was issued and written.
///
/// # Errors
///
/// Returns an error when signing fails or the Secret cannot be read/written.
pub async fn ensure_target(
    client: &Client,
    signer: &mut dyn CertificateSigner,
    policy: &RotationPolicy,
    target: &RotationTarget,
    now: ::time::OffsetDateTime,
) -> Result<bool> {
    let api: Api<Secret> = Api::namespaced(client.clone(), &target.namespace);

    let existing = api
        .get_opt(&target.secret_name)
        .await
        .with_context(|| {
            format!(
                "failed to read certificate secret {}/{}",
                target.namespace, target.secret_name
            )
        })?;

    let stored = existing.as_ref().and_then(|secret| {
        let cert_pem = secret
            .data
            .as_ref()
            .and_then(|data| data.get(TLS_CERT_KEY))
            .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())?;
        match CertificateInfo::from_pem(&cert_pem) {
            Ok(info) => {
                // Feed observed serials back into the signer so a restarted
                // process never re-issues one.
                signer.observe_serial(info.serial);
                Some(StoredCert {
                    chains_to_ca: signer.verify_leaf(&cert_pem),
                    info,
                })
            }
            Err(e) => {
                warn!(
                    namespace = %target.namespace,
                    secret = %target.secret_name,
                    error = %e,
                    "Stored certificate does not parse, re-issuing"
                );
                None
            }
        }
    });

    if !rotation_needed(stored.as_ref(), &target.sans, policy, now) {
        debug!(
            namespace = %target.namespace,
            secret = %target.secret_name,
            "Certificate is valid, no rotation needed"
        );
        return Ok(false);
    }

    let subject = SubjectConfig {
        common_name: target.common_name.clone(),
        sans: target.sans.clone(),
    };
    let pair = signer
        .sign(&subject, policy.validity, target.usage.extensions())
        .with_context(|| {
            format!(
                "failed to sign certificate for {}/{}",
                target.namespace, target.secret_name
            )
        })?;

    let mut data = BTreeMap::new();
    data.insert(
        TLS_CERT_KEY.to_string(),
        ByteString(pair.cert_pem.into_bytes()),
    );
    data.insert(
        TLS_KEY_KEY.to_string(),
        ByteString(pair.key_pem.into_bytes()),
    );

    let mut labels = BTreeMap::new();
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLER.to_string());
    labels.insert(K8S_PART_OF.to_string(), PART_OF_PROXMESH.to_string());

    let mut desired = Secret {
        metadata: ObjectMeta {
            name: Some(target.secret_name.clone()),
            namespace: Some(target.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(data),
        ..Default::default()
    };

    match existing {
        Some(live) => {
            desired.metadata.resource_version = live.metadata.resource_version;
            api.replace(&target.secret_name, &PostParams::default(), &desired)
                .await
                .with_context(|| {
                    format!(
                        "failed to update certificate secret {}/{}",
                        target.namespace, target.secret_name
                    )
                })?;
            info!(
                namespace = %target.namespace,
                secret = %target.secret_name,
                "Rotated certificate secret"
            );
        }
        None => {
            api.create(&PostParams::default(), &desired)
                .await
                .with_context(|| {
                    format!(
                        "failed to create certificate secret {}/{}",
                        target.namespace, target.secret_name
                    )
                })?;
            info!(
                namespace = %target.namespace,
                secret = %target.secret_name,
                "Created certificate secret"
            );
        }
    }

    record_certificate_signed(&target.secret_name);
    Ok(true)
}

#[cfg(test)]
#[path = "rotation_tests.rs"]
mod rotation_tests;
