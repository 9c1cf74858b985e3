// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the proxmesh operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the proxmesh CRDs
pub const API_GROUP: &str = "proxy.proxmesh.io";

/// API version for the proxmesh CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "proxy.proxmesh.io/v1alpha1";

/// Kind name for the `ManagedProxyConfiguration` resource
pub const KIND_MANAGED_PROXY_CONFIGURATION: &str = "ManagedProxyConfiguration";

// ============================================================================
// Proxy Server Constants
// ============================================================================

/// Port the proxy server listens on for proxy-client (hub side) connections
pub const PROXY_SERVER_PORT: u16 = 8090;

/// Port the proxy server listens on for agent tunnel connections
pub const AGENT_SERVER_PORT: u16 = 8091;

/// Port the proxy server exposes its health endpoint on
pub const HEALTH_PORT: u16 = 8092;

/// Default namespace the proxy server is deployed into
pub const DEFAULT_PROXY_SERVER_NAMESPACE: &str = "proxmesh-system";

/// Default cluster-internal Service name for the proxy server
pub const DEFAULT_IN_CLUSTER_SERVICE_NAME: &str = "proxy-entrypoint";

/// Default replica count for the proxy server deployment
pub const DEFAULT_PROXY_SERVER_REPLICAS: i32 = 3;

/// Default name of the LoadBalancer Service created for the
/// `LoadBalancerService` entrypoint type
pub const DEFAULT_LB_SERVICE_NAME: &str = "proxy-agent-entrypoint";

/// Container name for the tunnel server
pub const CONTAINER_NAME_PROXY_SERVER: &str = "proxy-server";

// ============================================================================
// Certificate Constants
// ============================================================================

/// CommonName of the self-signed root certificate
pub const CA_COMMON_NAME: &str = "proxmesh-self-signer";

/// Name suffix of the Secret that persists the CA key pair
pub const CA_SECRET_SUFFIX: &str = "-self-signer";

/// Name suffix of the applied Secret that distributes the CA certificate
pub const CA_DUMP_SECRET_SUFFIX: &str = "-ca";

/// Name suffix of the legacy agent-client certificate Secret, used only when
/// the cluster lacks the certificates.k8s.io/v1 CSR API
pub const LEGACY_AGENT_CLIENT_SECRET_SUFFIX: &str = "-agent-client";

/// Default name for the proxy-server leaf certificate Secret
pub const DEFAULT_PROXY_SERVER_SECRET_NAME: &str = "proxy-server-tls";

/// Default name for the agent-server leaf certificate Secret
pub const DEFAULT_AGENT_SERVER_SECRET_NAME: &str = "agent-server-tls";

/// Default name for the proxy-client leaf certificate Secret
pub const DEFAULT_PROXY_CLIENT_SECRET_NAME: &str = "proxy-client-tls";

/// Default leaf certificate validity in days
pub const DEFAULT_CERT_VALIDITY_DAYS: i64 = 180;

/// Default number of days before expiry at which a certificate is re-issued
pub const DEFAULT_RENEW_BEFORE_DAYS: i64 = 30;

/// Validity of the self-signed root certificate in days (10 years)
pub const CA_VALIDITY_DAYS: i64 = 3650;

/// Secret key holding a PEM certificate chain
pub const TLS_CERT_KEY: &str = "tls.crt";

/// Secret key holding a PEM private key
pub const TLS_KEY_KEY: &str = "tls.key";

/// Secret key holding the CA certificate
pub const CA_CERT_KEY: &str = "ca.crt";

/// Secret key holding the CA private key
pub const CA_KEY_KEY: &str = "ca.key";

// ============================================================================
// Certificate Mount Paths
// ============================================================================

/// Mount path for the CA certificate inside the proxy server pod
pub const CA_MOUNT_PATH: &str = "/etc/proxmesh/ca";

/// Mount path for the proxy-server certificate pair
pub const SERVER_CERT_MOUNT_PATH: &str = "/etc/proxmesh/server";

/// Mount path for the agent-server certificate pair
pub const AGENT_CERT_MOUNT_PATH: &str = "/etc/proxmesh/agent";

// ============================================================================
// Kubernetes Health Check Constants
// ============================================================================

/// Liveness probe initial delay (wait for the tunnel server to start)
pub const LIVENESS_INITIAL_DELAY_SECS: i32 = 10;

/// Liveness probe period (how often to check)
pub const LIVENESS_PERIOD_SECS: i32 = 10;

/// Liveness probe timeout
pub const LIVENESS_TIMEOUT_SECS: i32 = 5;

/// Liveness probe failure threshold
pub const LIVENESS_FAILURE_THRESHOLD: i32 = 3;

/// Readiness probe initial delay
pub const READINESS_INITIAL_DELAY_SECS: i32 = 5;

/// Readiness probe period
pub const READINESS_PERIOD_SECS: i32 = 5;

/// Readiness probe timeout
pub const READINESS_TIMEOUT_SECS: i32 = 3;

/// Readiness probe failure threshold
pub const READINESS_FAILURE_THRESHOLD: i32 = 3;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue duration once the configuration is fully reconciled (5 minutes)
pub const READY_REQUEUE_DURATION_SECS: u64 = 300;

/// Maximum number of attempts for an optimistic-concurrency conflict before
/// the ensure() call gives up
pub const MAX_CONFLICT_RETRIES: u32 = 5;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for the Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Field manager name used for API writes
pub const FIELD_MANAGER: &str = "proxmesh-controller";

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Default port for the Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;
