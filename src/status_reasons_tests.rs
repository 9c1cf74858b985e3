// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons.rs`

use super::*;

#[test]
fn condition_types_are_stable() {
    // These strings are part of the external status contract
    assert_eq!(CONDITION_PROXY_SERVER_DEPLOYED, "ProxyServerDeployed");
    assert_eq!(CONDITION_PROXY_SERVER_SECRET_SIGNED, "ProxyServerSecretSigned");
    assert_eq!(CONDITION_AGENT_SERVER_SECRET_SIGNED, "AgentServerSecretSigned");
}

#[test]
fn reasons_are_stable() {
    assert_eq!(REASON_NOT_YET_DEPLOYED, "NotYetDeployed");
    assert_eq!(REASON_SUCCESSFULLY_DEPLOYED, "SuccessfullyDeployed");
    assert_eq!(REASON_NOT_YET_SIGNED, "NotYetSigned");
    assert_eq!(REASON_SUCCESSFULLY_SIGNED, "SuccessfullySigned");
}
