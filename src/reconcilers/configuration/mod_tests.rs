// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the configuration reconciler orchestration helpers.

use super::*;
use crate::ca::CaError;
use crate::crd::{
    Condition, ManagedProxyConfiguration, ManagedProxyConfigurationSpec,
    ManagedProxyConfigurationStatus, ProxyAgentSpec, ProxyServerSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

fn config_with_conditions(conditions: Vec<Condition>) -> ManagedProxyConfiguration {
    ManagedProxyConfiguration {
        metadata: ObjectMeta {
            name: Some("cluster-proxy".to_string()),
            ..Default::default()
        },
        spec: ManagedProxyConfigurationSpec {
            proxy_server: ProxyServerSpec {
                image: "ghcr.io/proxmesh/tunnel-server:v0.4.1".to_string(),
                ..Default::default()
            },
            proxy_agent: ProxyAgentSpec {
                image: "ghcr.io/proxmesh/tunnel-agent:v0.4.1".to_string(),
                ..Default::default()
            },
            authentication: None,
        },
        status: Some(ManagedProxyConfigurationStatus {
            conditions,
            last_observed_generation: Some(1),
        }),
    }
}

fn condition(r#type: &str, status: &str) -> Condition {
    Condition {
        r#type: r#type.to_string(),
        status: status.to_string(),
        reason: None,
        message: None,
        last_transition_time: None,
    }
}

#[test]
fn all_true_conditions_mean_ready() {
    let config = config_with_conditions(vec![
        condition("ProxyServerDeployed", "True"),
        condition("ProxyServerSecretSigned", "True"),
        condition("AgentServerSecretSigned", "True"),
    ]);
    assert!(is_ready(&config));
}

#[test]
fn any_false_condition_means_not_ready() {
    let config = config_with_conditions(vec![
        condition("ProxyServerDeployed", "True"),
        condition("ProxyServerSecretSigned", "False"),
        condition("AgentServerSecretSigned", "True"),
    ]);
    assert!(!is_ready(&config));
}

#[test]
fn missing_status_means_not_ready() {
    let mut config = config_with_conditions(vec![]);
    config.status = None;
    assert!(!is_ready(&config));

    // An empty condition list is also not ready
    let config = config_with_conditions(vec![]);
    assert!(!is_ready(&config));
}

#[test]
fn entrypoint_pending_errors_are_classified() {
    let err: anyhow::Error = entrypoint::EntrypointNotReady {
        namespace: "ns".to_string(),
        name: "lb".to_string(),
    }
    .into();
    assert_eq!(classify_error(&err.context("step 3")), "entrypoint_pending");
}

#[test]
fn ca_errors_are_classified() {
    let err: anyhow::Error = CaError::Signing("CA unusable".to_string()).into();
    assert_eq!(classify_error(&err.context("step 4")), "ca_error");
}

#[test]
fn other_errors_default_to_api_error() {
    let err = anyhow::anyhow!("connection refused");
    assert_eq!(classify_error(&err), "api_error");
}

#[test]
fn kind_label_matches_crd_kind() {
    assert_eq!(kind_label(), "ManagedProxyConfiguration");
}
