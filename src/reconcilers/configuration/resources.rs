// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Builders for the Kubernetes objects deployed per configuration.
//!
//! Everything here is a pure function from the configuration (plus the CA
//! certificate) to a desired object; the applier decides whether anything is
//! written. The proxy server pod template carries a checksum of the CA
//! certificate so pods roll when the trust anchor changes.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::constants::{
    AGENT_CERT_MOUNT_PATH, AGENT_SERVER_PORT, CA_CERT_KEY, CA_DUMP_SECRET_SUFFIX, CA_MOUNT_PATH,
    CONTAINER_NAME_PROXY_SERVER, HEALTH_PORT, LIVENESS_FAILURE_THRESHOLD,
    LIVENESS_INITIAL_DELAY_SECS, LIVENESS_PERIOD_SECS, LIVENESS_TIMEOUT_SECS, PROXY_SERVER_PORT,
    READINESS_FAILURE_THRESHOLD, READINESS_INITIAL_DELAY_SECS, READINESS_PERIOD_SECS,
    READINESS_TIMEOUT_SECS, SERVER_CERT_MOUNT_PATH, TLS_CERT_KEY, TLS_KEY_KEY,
};
use crate::labels::{
    CA_CHECKSUM_ANNOTATION, COMPONENT_PROXY_SERVER, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY,
    K8S_NAME, K8S_PART_OF, MANAGED_BY_CONTROLLER, PART_OF_PROXMESH, APP_NAME_PROXY_SERVER,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, HTTPGetAction, PodSpec, PodTemplateSpec, Probe, SecretVolumeSource,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::rbac::v1::{PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Labels applied to every object produced for a configuration.
#[must_use]
pub fn build_labels(config: &ManagedProxyConfiguration) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(K8S_NAME.to_string(), APP_NAME_PROXY_SERVER.to_string());
    labels.insert(K8S_INSTANCE.to_string(), config.name_any());
    labels.insert(K8S_COMPONENT.to_string(), COMPONENT_PROXY_SERVER.to_string());
    labels.insert(K8S_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLER.to_string());
    labels.insert(K8S_PART_OF.to_string(), PART_OF_PROXMESH.to_string());
    labels
}

/// The target namespace object.
#[must_use]
pub fn build_namespace(config: &ManagedProxyConfiguration) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The ServiceAccount the proxy server runs as.
#[must_use]
pub fn build_service_account(config: &ManagedProxyConfiguration) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(config.name_any()),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// The stable cluster-internal ClusterIP Service.
///
/// Created at most once; the applier never updates Services, so the
/// cluster-internal address referenced in certificate SANs stays valid.
#[must_use]
pub fn build_cluster_service(config: &ManagedProxyConfiguration) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(config.in_cluster_service_name().to_string()),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(build_labels(config)),
            ports: Some(vec![
                ServicePort {
                    name: Some("proxy-server".to_string()),
                    port: i32::from(PROXY_SERVER_PORT),
                    target_port: Some(IntOrString::Int(i32::from(PROXY_SERVER_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some("agent-server".to_string()),
                    port: i32::from(AGENT_SERVER_PORT),
                    target_port: Some(IntOrString::Int(i32::from(AGENT_SERVER_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The LoadBalancer Service for the `LoadBalancerService` entrypoint type.
#[must_use]
pub fn build_entrypoint_load_balancer(
    config: &ManagedProxyConfiguration,
    name: &str,
) -> Service {
    let annotations = config
        .spec
        .proxy_server
        .entrypoint
        .as_ref()
        .and_then(|e| e.load_balancer_service.as_ref())
        .and_then(|lb| lb.annotations.clone());

    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            annotations,
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(build_labels(config)),
            ports: Some(vec![ServicePort {
                name: Some("agent-server".to_string()),
                port: i32::from(AGENT_SERVER_PORT),
                target_port: Some(IntOrString::Int(i32::from(AGENT_SERVER_PORT))),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Name of the applied Secret distributing the CA certificate.
#[must_use]
pub fn ca_dump_secret_name(config: &ManagedProxyConfiguration) -> String {
    format!("{}{CA_DUMP_SECRET_SUFFIX}", config.name_any())
}

/// The CA distribution Secret. Carries the public certificate only; the
/// private key stays inside the signer's own Secret.
#[must_use]
pub fn build_ca_dump_secret(config: &ManagedProxyConfiguration, ca_pem: &str) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(
        CA_CERT_KEY.to_string(),
        ByteString(ca_pem.as_bytes().to_vec()),
    );

    Secret {
        metadata: ObjectMeta {
            name: Some(ca_dump_secret_name(config)),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Hex SHA-256 of the CA certificate, stamped onto the pod template so pods
/// roll when the trust anchor changes.
#[must_use]
pub fn ca_checksum(ca_pem: &str) -> String {
    let digest = Sha256::digest(ca_pem.as_bytes());
    format!("{digest:x}")
}

/// The proxy server Deployment.
///
/// The tunnel server binary is external; it consumes the produced cert
/// Secrets as mounted files referenced through fixed CLI flags.
#[must_use]
pub fn build_deployment(config: &ManagedProxyConfiguration, ca_pem: &str) -> Deployment {
    let name = config.name_any();
    let namespace = config.proxy_server_namespace().to_string();
    let labels = build_labels(config);
    let replicas = config.proxy_server_replicas();

    let mut args = vec![
        format!("--server-port={PROXY_SERVER_PORT}"),
        format!("--agent-port={AGENT_SERVER_PORT}"),
        format!("--health-port={HEALTH_PORT}"),
        format!("--server-count={replicas}"),
        format!("--server-ca-cert={CA_MOUNT_PATH}/{CA_CERT_KEY}"),
        format!("--server-cert={SERVER_CERT_MOUNT_PATH}/{TLS_CERT_KEY}"),
        format!("--server-key={SERVER_CERT_MOUNT_PATH}/{TLS_KEY_KEY}"),
        format!("--cluster-ca-cert={CA_MOUNT_PATH}/{CA_CERT_KEY}"),
        format!("--cluster-cert={AGENT_CERT_MOUNT_PATH}/{TLS_CERT_KEY}"),
        format!("--cluster-key={AGENT_CERT_MOUNT_PATH}/{TLS_KEY_KEY}"),
    ];
    if let Some(additional) = &config.spec.proxy_server.additional_args {
        args.extend(additional.iter().cloned());
    }

    let volume_mounts = vec![
        VolumeMount {
            name: "ca-cert".to_string(),
            mount_path: CA_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
        VolumeMount {
            name: "server-cert".to_string(),
            mount_path: SERVER_CERT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
        VolumeMount {
            name: "agent-cert".to_string(),
            mount_path: AGENT_CERT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        },
    ];

    let volumes = vec![
        Volume {
            name: "ca-cert".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(ca_dump_secret_name(config)),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "server-cert".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(config.proxy_server_secret_name().to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: "agent-cert".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(config.agent_server_secret_name().to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    let container = Container {
        name: CONTAINER_NAME_PROXY_SERVER.to_string(),
        image: Some(config.spec.proxy_server.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(args),
        ports: Some(vec![
            ContainerPort {
                name: Some("proxy-server".to_string()),
                container_port: i32::from(PROXY_SERVER_PORT),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("agent-server".to_string()),
                container_port: i32::from(AGENT_SERVER_PORT),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("health".to_string()),
                container_port: i32::from(HEALTH_PORT),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
        ]),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(i32::from(HEALTH_PORT)),
                ..Default::default()
            }),
            initial_delay_seconds: Some(LIVENESS_INITIAL_DELAY_SECS),
            period_seconds: Some(LIVENESS_PERIOD_SECS),
            timeout_seconds: Some(LIVENESS_TIMEOUT_SECS),
            failure_threshold: Some(LIVENESS_FAILURE_THRESHOLD),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/healthz".to_string()),
                port: IntOrString::Int(i32::from(HEALTH_PORT)),
                ..Default::default()
            }),
            initial_delay_seconds: Some(READINESS_INITIAL_DELAY_SECS),
            period_seconds: Some(READINESS_PERIOD_SECS),
            timeout_seconds: Some(READINESS_TIMEOUT_SECS),
            failure_threshold: Some(READINESS_FAILURE_THRESHOLD),
            ..Default::default()
        }),
        volume_mounts: Some(volume_mounts),
        ..Default::default()
    };

    let placement = config.spec.proxy_server.node_placement.as_ref();
    let mut template_annotations = BTreeMap::new();
    template_annotations.insert(CA_CHECKSUM_ANNOTATION.to_string(), ca_checksum(ca_pem));

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: Some(template_annotations),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    service_account_name: Some(config.name_any()),
                    node_selector: placement.and_then(|p| p.node_selector.clone()),
                    tolerations: placement.and_then(|p| p.tolerations.clone()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Name shared by the port-forward Role and RoleBinding.
#[must_use]
pub fn portforward_role_name(config: &ManagedProxyConfiguration) -> String {
    format!("{}-portforward", config.name_any())
}

/// Role granting port-forward access to the proxy server pods, needed only
/// for the `PortForward` entrypoint type.
#[must_use]
pub fn build_portforward_role(config: &ManagedProxyConfiguration) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(portforward_role_name(config)),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods/portforward".to_string()]),
                verbs: vec!["create".to_string()],
                ..Default::default()
            },
        ]),
    }
}

/// RoleBinding attaching the port-forward Role to the proxy ServiceAccount.
#[must_use]
pub fn build_portforward_role_binding(config: &ManagedProxyConfiguration) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(portforward_role_name(config)),
            namespace: Some(config.proxy_server_namespace().to_string()),
            labels: Some(build_labels(config)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: portforward_role_name(config),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: config.name_any(),
            namespace: Some(config.proxy_server_namespace().to_string()),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
