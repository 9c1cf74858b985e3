// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the configuration controller.
//!
//! The context carries the Kubernetes client, the operator settings built at
//! startup (no package-level mutable state), the event publisher, and the
//! in-memory CA cache.
//!
//! The CA cache is the single place where the SelfSigner's serial counter
//! lives between passes. It is guarded by a mutex so that signing — the only
//! operation that mutates the CA — is serialized within this single-writer
//! process.

use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::ca::{CaError, SelfSigner};
use crate::constants::{ERROR_REQUEUE_DURATION_SECS, READY_REQUEUE_DURATION_SECS};
use crate::events::EventPublisher;
use crate::rotation::RotationPolicy;

/// Operator settings, constructed once in `main` from the command line and
/// passed by reference through the context.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Leaf certificate validity and renewal window
    pub rotation: RotationPolicy,
    /// Requeue interval once the configuration is fully reconciled
    pub ready_requeue: Duration,
    /// Requeue interval while progressing or after errors
    pub error_requeue: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rotation: RotationPolicy::default(),
            ready_requeue: Duration::from_secs(READY_REQUEUE_DURATION_SECS),
            error_requeue: Duration::from_secs(ERROR_REQUEUE_DURATION_SECS),
        }
    }
}

/// Shared context passed to the controller.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Operator settings
    pub settings: Settings,

    /// Event publisher for batched create/update notifications
    pub publisher: Arc<dyn EventPublisher>,

    /// In-memory CA cache keyed by "namespace/secret-name"
    signers: Arc<Mutex<HashMap<String, SelfSigner>>>,
}

impl Context {
    /// Create a new context.
    #[must_use]
    pub fn new(client: Client, settings: Settings, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            client,
            settings,
            publisher,
            signers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the CA for the given Secret, loading or generating it on first
    /// use. Returns a clone; callers that sign must hand the signer back via
    /// [`Context::store_signer`] so the serial counter survives the pass.
    pub async fn signer_for(&self, namespace: &str, name: &str) -> Result<SelfSigner, CaError> {
        let key = format!("{namespace}/{name}");

        let mut cache = self.signers.lock().await;
        if let Some(signer) = cache.get(&key) {
            return Ok(signer.clone());
        }

        let signer = SelfSigner::load_or_generate(&self.client, namespace, name).await?;
        cache.insert(key, signer.clone());
        Ok(signer)
    }

    /// Store a signer back after signing, keeping the advanced serial counter.
    pub async fn store_signer(&self, namespace: &str, name: &str, signer: SelfSigner) {
        let key = format!("{namespace}/{name}");
        self.signers.lock().await.insert(key, signer);
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
