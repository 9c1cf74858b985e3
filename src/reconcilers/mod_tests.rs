// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `reconcilers/mod.rs`

use super::conditions_equal;
use crate::crd::Condition;

fn condition(r#type: &str, status: &str, reason: &str, message: &str, time: &str) -> Condition {
    Condition {
        r#type: r#type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(time.to_string()),
    }
}

#[test]
fn identical_conditions_are_equal() {
    let a = vec![condition("Ready", "True", "Done", "ok", "t1")];
    let b = vec![condition("Ready", "True", "Done", "ok", "t1")];
    assert!(conditions_equal(&a, &b));
}

#[test]
fn transition_time_differences_are_ignored() {
    let a = vec![condition("Ready", "True", "Done", "ok", "2025-01-01T00:00:00Z")];
    let b = vec![condition("Ready", "True", "Done", "ok", "2025-06-01T12:34:56Z")];
    assert!(conditions_equal(&a, &b));
}

#[test]
fn status_change_is_detected() {
    let a = vec![condition("Ready", "True", "Done", "ok", "t")];
    let b = vec![condition("Ready", "False", "Done", "ok", "t")];
    assert!(!conditions_equal(&a, &b));
}

#[test]
fn message_change_is_detected() {
    let a = vec![condition("Ready", "True", "Done", "3 replicas", "t")];
    let b = vec![condition("Ready", "True", "Done", "1 replica", "t")];
    assert!(!conditions_equal(&a, &b));
}

#[test]
fn reason_change_is_detected() {
    let a = vec![condition("Ready", "True", "NotYetSigned", "m", "t")];
    let b = vec![condition("Ready", "True", "SuccessfullySigned", "m", "t")];
    assert!(!conditions_equal(&a, &b));
}

#[test]
fn length_change_is_detected() {
    let a = vec![condition("Ready", "True", "Done", "ok", "t")];
    let b = vec![
        condition("Ready", "True", "Done", "ok", "t"),
        condition("Signed", "True", "Done", "ok", "t"),
    ];
    assert!(!conditions_equal(&a, &b));
}

#[test]
fn empty_lists_are_equal() {
    assert!(conditions_equal(&[], &[]));
}
