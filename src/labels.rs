// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across the reconciler.
//!
//! This module defines standard Kubernetes labels and proxmesh-specific labels
//! and annotations to ensure consistency across all resources created by the
//! controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture (e.g., "proxy-server")
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` indicating this resource is part of proxmesh
pub const PART_OF_PROXMESH: &str = "proxmesh";

/// Component value for the tunnel server
pub const COMPONENT_PROXY_SERVER: &str = "proxy-server";

/// Application name for proxy server resources
pub const APP_NAME_PROXY_SERVER: &str = "proxy-server";

/// Value for `app.kubernetes.io/managed-by` on resources owned by this controller
pub const MANAGED_BY_CONTROLLER: &str = "ManagedProxyConfiguration";

// ============================================================================
// Proxmesh-Specific Annotations
// ============================================================================

/// Annotation carrying the configuration generation that produced a resource.
/// A live object whose annotation matches the configuration's generation is
/// considered up to date and is not rewritten.
pub const CONFIG_GENERATION_ANNOTATION: &str = "proxy.proxmesh.io/config-generation";

/// Annotation carrying a checksum of the CA certificate on the proxy server
/// pod template, so pods roll when the trust anchor changes
pub const CA_CHECKSUM_ANNOTATION: &str = "proxy.proxmesh.io/ca-checksum";
