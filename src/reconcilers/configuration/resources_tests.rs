// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `resources.rs`

use super::*;
use crate::crd::{
    AuthenticationSpec, DumpSpec, ManagedProxyConfiguration, ManagedProxyConfigurationSpec,
    NodePlacement, ProxyAgentSpec, ProxyServerSpec, SecretNames,
};
use crate::labels::{CA_CHECKSUM_ANNOTATION, K8S_INSTANCE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

const CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nZmFrZQ==\n-----END CERTIFICATE-----\n";

fn test_config() -> ManagedProxyConfiguration {
    ManagedProxyConfiguration {
        metadata: ObjectMeta {
            name: Some("cluster-proxy".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: ManagedProxyConfigurationSpec {
            proxy_server: ProxyServerSpec {
                image: "ghcr.io/proxmesh/tunnel-server:v0.4.1".to_string(),
                replicas: Some(3),
                namespace: Some("proxy-ns".to_string()),
                ..Default::default()
            },
            proxy_agent: ProxyAgentSpec {
                image: "ghcr.io/proxmesh/tunnel-agent:v0.4.1".to_string(),
                ..Default::default()
            },
            authentication: None,
        },
        status: None,
    }
}

#[test]
fn labels_identify_the_instance() {
    let labels = build_labels(&test_config());
    assert_eq!(labels.get(K8S_INSTANCE), Some(&"cluster-proxy".to_string()));
    assert_eq!(
        labels.get("app.kubernetes.io/managed-by"),
        Some(&"ManagedProxyConfiguration".to_string())
    );
}

#[test]
fn namespace_uses_configured_name() {
    let ns = build_namespace(&test_config());
    assert_eq!(ns.metadata.name.as_deref(), Some("proxy-ns"));
}

#[test]
fn service_account_lives_in_proxy_namespace() {
    let sa = build_service_account(&test_config());
    assert_eq!(sa.metadata.name.as_deref(), Some("cluster-proxy"));
    assert_eq!(sa.metadata.namespace.as_deref(), Some("proxy-ns"));
}

#[test]
fn cluster_service_is_cluster_ip_with_both_ports() {
    let service = build_cluster_service(&test_config());
    assert_eq!(service.metadata.name.as_deref(), Some("proxy-entrypoint"));

    let spec = service.spec.expect("service spec");
    assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));

    let ports = spec.ports.expect("service ports");
    let port_numbers: Vec<i32> = ports.iter().map(|p| p.port).collect();
    assert!(port_numbers.contains(&8090));
    assert!(port_numbers.contains(&8091));
}

#[test]
fn load_balancer_service_exposes_agent_port_only() {
    let service = build_entrypoint_load_balancer(&test_config(), "proxy-agent-entrypoint");

    let spec = service.spec.expect("service spec");
    assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));

    let ports = spec.ports.expect("service ports");
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, 8091);
}

#[test]
fn ca_dump_secret_carries_public_cert_only() {
    let secret = build_ca_dump_secret(&test_config(), CA_PEM);
    assert_eq!(secret.metadata.name.as_deref(), Some("cluster-proxy-ca"));

    let data = secret.data.expect("secret data");
    assert!(data.contains_key("ca.crt"));
    assert!(!data.contains_key("ca.key"), "private key must never be dumped");
    assert!(!data.contains_key("tls.key"));
}

#[test]
fn deployment_matches_spec() {
    let deployment = build_deployment(&test_config(), CA_PEM);
    assert_eq!(deployment.metadata.name.as_deref(), Some("cluster-proxy"));
    assert_eq!(deployment.metadata.namespace.as_deref(), Some("proxy-ns"));

    let spec = deployment.spec.expect("deployment spec");
    assert_eq!(spec.replicas, Some(3));

    let pod_spec = spec.template.spec.expect("pod spec");
    assert_eq!(pod_spec.containers.len(), 1);
    assert_eq!(
        pod_spec.service_account_name.as_deref(),
        Some("cluster-proxy")
    );

    let container = &pod_spec.containers[0];
    assert_eq!(
        container.image.as_deref(),
        Some("ghcr.io/proxmesh/tunnel-server:v0.4.1")
    );

    // Cert mounts are referenced through fixed CLI flags
    let args = container.args.as_ref().expect("container args");
    assert!(args.contains(&"--server-cert=/etc/proxmesh/server/tls.crt".to_string()));
    assert!(args.contains(&"--server-key=/etc/proxmesh/server/tls.key".to_string()));
    assert!(args.contains(&"--cluster-cert=/etc/proxmesh/agent/tls.crt".to_string()));
    assert!(args.contains(&"--server-ca-cert=/etc/proxmesh/ca/ca.crt".to_string()));
    assert!(args.contains(&"--server-port=8090".to_string()));
    assert!(args.contains(&"--agent-port=8091".to_string()));

    let volumes = pod_spec.volumes.expect("volumes");
    let secret_names: Vec<_> = volumes
        .iter()
        .filter_map(|v| v.secret.as_ref().and_then(|s| s.secret_name.clone()))
        .collect();
    assert!(secret_names.contains(&"cluster-proxy-ca".to_string()));
    assert!(secret_names.contains(&"proxy-server-tls".to_string()));
    assert!(secret_names.contains(&"agent-server-tls".to_string()));
}

#[test]
fn deployment_respects_custom_secret_names() {
    let mut config = test_config();
    config.spec.authentication = Some(AuthenticationSpec {
        signer: None,
        dump: Some(DumpSpec {
            secrets: SecretNames {
                signing_proxy_server_secret_name: Some("my-server-cert".to_string()),
                signing_agent_server_secret_name: Some("my-agent-cert".to_string()),
                signing_proxy_client_secret_name: None,
            },
        }),
    });

    let deployment = build_deployment(&config, CA_PEM);
    let pod_spec = deployment
        .spec
        .expect("deployment spec")
        .template
        .spec
        .expect("pod spec");
    let secret_names: Vec<_> = pod_spec
        .volumes
        .expect("volumes")
        .iter()
        .filter_map(|v| v.secret.as_ref().and_then(|s| s.secret_name.clone()))
        .collect();

    assert!(secret_names.contains(&"my-server-cert".to_string()));
    assert!(secret_names.contains(&"my-agent-cert".to_string()));
}

#[test]
fn deployment_appends_additional_args() {
    let mut config = test_config();
    config.spec.proxy_server.additional_args =
        Some(vec!["--keepalive-time=1h".to_string()]);

    let deployment = build_deployment(&config, CA_PEM);
    let args = deployment
        .spec
        .expect("deployment spec")
        .template
        .spec
        .expect("pod spec")
        .containers[0]
        .args
        .clone()
        .expect("args");
    assert!(args.contains(&"--keepalive-time=1h".to_string()));
}

#[test]
fn deployment_carries_ca_checksum_annotation() {
    let deployment = build_deployment(&test_config(), CA_PEM);
    let annotations = deployment
        .spec
        .expect("deployment spec")
        .template
        .metadata
        .expect("template metadata")
        .annotations
        .expect("template annotations");

    assert_eq!(
        annotations.get(CA_CHECKSUM_ANNOTATION),
        Some(&ca_checksum(CA_PEM))
    );
}

#[test]
fn ca_checksum_is_stable_and_distinct() {
    assert_eq!(ca_checksum(CA_PEM), ca_checksum(CA_PEM));
    assert_ne!(ca_checksum(CA_PEM), ca_checksum("other"));
    // hex sha-256
    assert_eq!(ca_checksum(CA_PEM).len(), 64);
}

#[test]
fn deployment_applies_node_placement() {
    let mut config = test_config();
    let mut selector = BTreeMap::new();
    selector.insert("node-role".to_string(), "infra".to_string());
    config.spec.proxy_server.node_placement = Some(NodePlacement {
        node_selector: Some(selector),
        tolerations: None,
    });

    let deployment = build_deployment(&config, CA_PEM);
    let pod_spec = deployment
        .spec
        .expect("deployment spec")
        .template
        .spec
        .expect("pod spec");
    assert_eq!(
        pod_spec
            .node_selector
            .expect("node selector")
            .get("node-role"),
        Some(&"infra".to_string())
    );
}

#[test]
fn portforward_role_grants_portforward_create() {
    let role = build_portforward_role(&test_config());
    assert_eq!(
        role.metadata.name.as_deref(),
        Some("cluster-proxy-portforward")
    );

    let rules = role.rules.expect("role rules");
    assert!(rules.iter().any(|rule| {
        rule.resources
            .as_ref()
            .is_some_and(|r| r.contains(&"pods/portforward".to_string()))
            && rule.verbs.contains(&"create".to_string())
    }));
}

#[test]
fn portforward_binding_targets_service_account() {
    let binding = build_portforward_role_binding(&test_config());
    assert_eq!(binding.role_ref.kind, "Role");
    assert_eq!(binding.role_ref.name, "cluster-proxy-portforward");

    let subjects = binding.subjects.expect("subjects");
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].kind, "ServiceAccount");
    assert_eq!(subjects[0].name, "cluster-proxy");
    assert_eq!(subjects[0].namespace.as_deref(), Some("proxy-ns"));
}
