// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Condition types and reason strings reported on
//! `ManagedProxyConfiguration` status.
//!
//! Reasons are fixed CamelCase strings; the per-condition message carries the
//! variable detail (replica count or expiry timestamp).

/// Condition: the proxy server Deployment exists.
pub const CONDITION_PROXY_SERVER_DEPLOYED: &str = "ProxyServerDeployed";

/// Condition: the proxy-server serving certificate Secret is signed.
pub const CONDITION_PROXY_SERVER_SECRET_SIGNED: &str = "ProxyServerSecretSigned";

/// Condition: the agent-server serving certificate Secret is signed.
pub const CONDITION_AGENT_SERVER_SECRET_SIGNED: &str = "AgentServerSecretSigned";

/// Reason: the Deployment has not been observed yet.
pub const REASON_NOT_YET_DEPLOYED: &str = "NotYetDeployed";

/// Reason: the Deployment exists.
pub const REASON_SUCCESSFULLY_DEPLOYED: &str = "SuccessfullyDeployed";

/// Reason: the certificate Secret has not been observed yet.
pub const REASON_NOT_YET_SIGNED: &str = "NotYetSigned";

/// Reason: the certificate Secret holds a signed certificate.
pub const REASON_SUCCESSFULLY_SIGNED: &str = "SuccessfullySigned";

/// Condition status: the observation holds.
pub const STATUS_TRUE: &str = "True";

/// Condition status: the observation does not hold.
pub const STATUS_FALSE: &str = "False";

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
