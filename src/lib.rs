// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Proxmesh - Cluster Proxy Mesh Operator for Kubernetes
//!
//! Proxmesh is a Kubernetes operator written in Rust that establishes and
//! maintains a private certificate-trust mesh and the control-plane resources
//! for a multi-hop, mutually-authenticated tunnel between a central hub and
//! remote managed sites.
//!
//! ## Overview
//!
//! This library provides the core functionality for the proxmesh operator,
//! including:
//!
//! - The `ManagedProxyConfiguration` Custom Resource Definition
//! - A self-signed certificate authority and per-target rotation engine
//! - A generation-tracked, idempotent resource applier
//! - The level-triggered reconciliation loop and status aggregation
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`ca`] - Self-signed CA: load-or-generate, leaf signing, verification
//! - [`rotation`] - Certificate rotation targets and policy
//! - [`reconcilers`] - Reconciliation logic and the generation-tracked applier
//! - [`context`] - Shared controller context and operator settings
//! - [`events`] - Batched Kubernetes Event publishing
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use proxmesh::crd::{ManagedProxyConfigurationSpec, ProxyAgentSpec, ProxyServerSpec};
//!
//! let spec = ManagedProxyConfigurationSpec {
//!     proxy_server: ProxyServerSpec {
//!         image: "ghcr.io/proxmesh/tunnel-server:v0.4.1".to_string(),
//!         replicas: Some(3),
//!         ..Default::default()
//!     },
//!     proxy_agent: ProxyAgentSpec {
//!         image: "ghcr.io/proxmesh/tunnel-agent:v0.4.1".to_string(),
//!         ..Default::default()
//!     },
//!     authentication: None,
//! };
//! ```

pub mod ca;
pub mod constants;
pub mod context;
pub mod crd;
pub mod events;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod rotation;
pub mod status_reasons;
