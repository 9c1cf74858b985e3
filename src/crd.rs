// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for the proxy mesh.
//!
//! This module defines the `ManagedProxyConfiguration` resource, the single
//! declarative object that drives the operator. One configuration describes
//! the desired proxy-server placement, how remote agents reach it (the
//! entrypoint), and the self-signed authentication mesh that secures the
//! tunnel.
//!
//! # Example: a port-forward configuration
//!
//! ```yaml
//! apiVersion: proxy.proxmesh.io/v1alpha1
//! kind: ManagedProxyConfiguration
//! metadata:
//!   name: cluster-proxy
//! spec:
//!   proxyServer:
//!     image: ghcr.io/proxmesh/tunnel-server:v0.4.1
//!     replicas: 3
//!     namespace: proxy-ns
//!     entrypoint:
//!       type: PortForward
//!   proxyAgent:
//!     image: ghcr.io/proxmesh/tunnel-agent:v0.4.1
//!   authentication:
//!     signer:
//!       type: SelfSigned
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{
    DEFAULT_AGENT_SERVER_SECRET_NAME, DEFAULT_IN_CLUSTER_SERVICE_NAME,
    DEFAULT_PROXY_CLIENT_SECRET_NAME, DEFAULT_PROXY_SERVER_NAMESPACE,
    DEFAULT_PROXY_SERVER_REPLICAS, DEFAULT_PROXY_SERVER_SECRET_NAME,
};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition, e.g. `ProxyServerDeployed`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// How remote proxy agents reach the proxy server from outside the hub cluster.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub enum EntrypointType {
    /// A fixed, externally resolvable hostname provided by the operator of the hub.
    Hostname,
    /// A `LoadBalancer` Service whose provisioned ingress IP is the entrypoint.
    LoadBalancerService,
    /// No external address; agents connect through the Kubernetes
    /// port-forward API. This is the default.
    #[default]
    PortForward,
}

/// Literal hostname entrypoint value.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntrypointHostname {
    /// The externally resolvable hostname agents dial, e.g. "proxy.example.com".
    pub value: String,
}

/// LoadBalancer Service entrypoint settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntrypointLoadBalancerService {
    /// Name of the LoadBalancer Service to create in the proxy server namespace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Additional annotations placed on the LoadBalancer Service, e.g. for
    /// cloud-provider specific load balancer classes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// The externally reachable address/method by which agents reach the proxy server.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServerEntrypoint {
    /// Entrypoint type. Exactly one of `hostname` or `loadBalancerService`
    /// should be set for the matching type; `PortForward` needs neither.
    pub r#type: EntrypointType,

    /// Hostname settings, required when type is `Hostname`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<EntrypointHostname>,

    /// LoadBalancer Service settings, used when type is `LoadBalancerService`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_service: Option<EntrypointLoadBalancerService>,

    /// Port agents dial on the entrypoint address. Defaults to the agent
    /// tunnel port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

/// Scheduling constraints for proxy pods.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    /// Node labels the pods must be scheduled onto.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Tolerations applied to the pod spec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<k8s_openapi::api::core::v1::Toleration>>,
}

/// Desired state of the proxy server deployment on the hub.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyServerSpec {
    /// Tunnel server container image.
    pub image: String,

    /// Number of proxy server replicas. Defaults to 3.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Namespace the proxy server and its secrets are deployed into.
    /// Defaults to "proxmesh-system".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Name of the cluster-internal ClusterIP Service fronting the proxy
    /// server. Created once and never updated, so the in-cluster address
    /// stays stable. Defaults to "proxy-entrypoint".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_cluster_service_name: Option<String>,

    /// How agents reach the proxy server from outside the hub cluster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<ProxyServerEntrypoint>,

    /// Scheduling constraints for the proxy server pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_placement: Option<NodePlacement>,

    /// Extra command-line arguments appended to the tunnel server invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_args: Option<Vec<String>>,
}

/// Desired state of the proxy agents installed on managed sites.
///
/// The agent deployment itself is installed out of band; this block is
/// consumed by that installer and recorded here so one configuration object
/// describes the whole mesh.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyAgentSpec {
    /// Tunnel agent container image.
    pub image: String,

    /// Number of agent replicas per managed site.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Scheduling constraints for agent pods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_placement: Option<NodePlacement>,

    /// Extra command-line arguments appended to the tunnel agent invocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_args: Option<Vec<String>>,
}

/// Supported signer backends.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub enum SignerType {
    /// Certificates are issued by a self-signed CA owned by this operator.
    #[default]
    SelfSigned,
}

/// Self-signed signer settings.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelfSignedSpec {
    /// Additional Subject Alternative Names folded into every signed server
    /// and client certificate, on top of the computed in-cluster and
    /// entrypoint identities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_sans: Option<Vec<String>>,
}

/// Signer configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignerSpec {
    /// Signer backend type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<SignerType>,

    /// Self-signed signer settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_signed: Option<SelfSignedSpec>,
}

/// Names of the Secrets that hold each signed certificate pair.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretNames {
    /// Secret holding the proxy-server serving certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_proxy_server_secret_name: Option<String>,

    /// Secret holding the agent-server serving certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_agent_server_secret_name: Option<String>,

    /// Secret holding the proxy-client (client-auth) certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_proxy_client_secret_name: Option<String>,
}

/// Where signed certificate pairs are dumped.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DumpSpec {
    /// Secret names for the signed certificate pairs.
    #[serde(default)]
    pub secrets: SecretNames,
}

/// Authentication settings for the proxy mesh.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Signer configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer: Option<SignerSpec>,

    /// Certificate dump targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump: Option<DumpSpec>,
}

/// `ManagedProxyConfiguration` status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManagedProxyConfigurationStatus {
    /// Observed conditions, recomputed from live state every pass.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// The `metadata.generation` most recently acted upon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_observed_generation: Option<i64>,
}

/// `ManagedProxyConfiguration` declares the desired proxy topology and
/// authentication mesh for one hub.
///
/// The controller resolves the entrypoint address, keeps the self-signed
/// trust mesh rotated, applies the proxy server workload, and reports
/// progress through status conditions. The resource is cluster-scoped;
/// each distinct configuration reconciles independently.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "proxy.proxmesh.io",
    version = "v1alpha1",
    kind = "ManagedProxyConfiguration",
    shortname = "mpc",
    doc = "ManagedProxyConfiguration describes the proxy server placement, agent entrypoint and self-signed certificate mesh for one multi-site tunnel hub."
)]
#[kube(status = "ManagedProxyConfigurationStatus")]
#[serde(rename_all = "camelCase")]
pub struct ManagedProxyConfigurationSpec {
    /// Proxy server placement and entrypoint.
    pub proxy_server: ProxyServerSpec,

    /// Proxy agent settings, consumed by the out-of-band agent installer.
    pub proxy_agent: ProxyAgentSpec,

    /// Authentication mesh settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthenticationSpec>,
}

impl ManagedProxyConfiguration {
    /// Namespace the proxy server and its secrets live in.
    #[must_use]
    pub fn proxy_server_namespace(&self) -> &str {
        self.spec
            .proxy_server
            .namespace
            .as_deref()
            .unwrap_or(DEFAULT_PROXY_SERVER_NAMESPACE)
    }

    /// Desired proxy server replica count.
    #[must_use]
    pub fn proxy_server_replicas(&self) -> i32 {
        self.spec
            .proxy_server
            .replicas
            .unwrap_or(DEFAULT_PROXY_SERVER_REPLICAS)
    }

    /// Name of the stable cluster-internal Service.
    #[must_use]
    pub fn in_cluster_service_name(&self) -> &str {
        self.spec
            .proxy_server
            .in_cluster_service_name
            .as_deref()
            .unwrap_or(DEFAULT_IN_CLUSTER_SERVICE_NAME)
    }

    /// Entrypoint type, defaulting to `PortForward` when unset.
    #[must_use]
    pub fn entrypoint_type(&self) -> EntrypointType {
        self.spec
            .proxy_server
            .entrypoint
            .as_ref()
            .map(|e| e.r#type.clone())
            .unwrap_or_default()
    }

    /// Additional SANs configured on the self-signed signer.
    #[must_use]
    pub fn additional_sans(&self) -> Vec<String> {
        self.spec
            .authentication
            .as_ref()
            .and_then(|a| a.signer.as_ref())
            .and_then(|s| s.self_signed.as_ref())
            .and_then(|s| s.additional_sans.clone())
            .unwrap_or_default()
    }

    /// Name of the Secret holding the proxy-server serving certificate.
    #[must_use]
    pub fn proxy_server_secret_name(&self) -> &str {
        self.dump_secret_name(|s| s.signing_proxy_server_secret_name.as_deref())
            .unwrap_or(DEFAULT_PROXY_SERVER_SECRET_NAME)
    }

    /// Name of the Secret holding the agent-server serving certificate.
    #[must_use]
    pub fn agent_server_secret_name(&self) -> &str {
        self.dump_secret_name(|s| s.signing_agent_server_secret_name.as_deref())
            .unwrap_or(DEFAULT_AGENT_SERVER_SECRET_NAME)
    }

    /// Name of the Secret holding the proxy-client certificate.
    #[must_use]
    pub fn proxy_client_secret_name(&self) -> &str {
        self.dump_secret_name(|s| s.signing_proxy_client_secret_name.as_deref())
            .unwrap_or(DEFAULT_PROXY_CLIENT_SECRET_NAME)
    }

    fn dump_secret_name<'a>(
        &'a self,
        pick: impl Fn(&'a SecretNames) -> Option<&'a str>,
    ) -> Option<&'a str> {
        self.spec
            .authentication
            .as_ref()
            .and_then(|a| a.dump.as_ref())
            .and_then(|d| pick(&d.secrets))
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
