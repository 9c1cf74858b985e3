// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared types and imports for `ManagedProxyConfiguration` reconciliation.
//!
//! This module provides common type re-exports and shared utilities
//! used across the configuration reconciliation modules.

#![allow(clippy::wildcard_imports)]

// Re-export commonly used types from parent modules
pub use crate::context::Context;
pub use crate::crd::{
    Condition, EntrypointType, ManagedProxyConfiguration, ManagedProxyConfigurationStatus,
};
pub use crate::status_reasons::{
    CONDITION_AGENT_SERVER_SECRET_SIGNED, CONDITION_PROXY_SERVER_DEPLOYED,
    CONDITION_PROXY_SERVER_SECRET_SIGNED, REASON_NOT_YET_DEPLOYED, REASON_NOT_YET_SIGNED,
    REASON_SUCCESSFULLY_DEPLOYED, REASON_SUCCESSFULLY_SIGNED, STATUS_FALSE, STATUS_TRUE,
};

// Re-export commonly used Kubernetes types
pub use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Namespace, Secret, Service, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

// Re-export kube-rs types
pub use kube::{
    api::{Patch, PatchParams, PostParams},
    client::Client,
    Api, ResourceExt,
};

// Re-export common utilities
pub use anyhow::{Context as AnyhowContext, Result};
pub use chrono::Utc;
pub use serde_json::json;
pub use std::sync::Arc;
pub use tracing::{debug, error, info, warn};
