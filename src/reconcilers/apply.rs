// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generation-tracked idempotent apply for Kubernetes resources.
//!
//! [`ensure`] guarantees that a live object of the desired kind/namespace/name
//! exists and, once the configuration's generation exceeds what is currently
//! applied, matches the desired object. The applied generation is stamped as
//! an annotation on every object, so update decisions are independent of each
//! resource's own version counter.
//!
//! Two exceptions shape the algorithm:
//!
//! - Bare `Service` objects are created once and never updated, preserving a
//!   stable cluster-internal address.
//! - An optimistic-concurrency conflict re-runs the whole fetch/compare/update
//!   sequence inside a bounded loop with jittered backoff.
//!
//! Calling `ensure` twice at the same generation is a no-op the second time.

use anyhow::{bail, Context as AnyhowContext, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, info, warn};

use crate::constants::MAX_CONFLICT_RETRIES;
use crate::labels::CONFIG_GENERATION_ANNOTATION;
use crate::reconcilers::retry::conflict_backoff;

/// Outcome of an [`ensure`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    /// The object was created this call
    pub created: bool,
    /// The object was updated this call
    pub updated: bool,
}

impl Applied {
    /// Whether the call wrote anything.
    #[must_use]
    pub fn changed(self) -> bool {
        self.created || self.updated
    }
}

/// Read the applied generation annotation from live object metadata.
///
/// A missing or unparseable annotation counts as generation 0, so objects
/// created before the annotation existed are updated on the next bump.
#[must_use]
pub fn applied_generation(meta: &ObjectMeta) -> i64 {
    meta.annotations
        .as_ref()
        .and_then(|annotations| annotations.get(CONFIG_GENERATION_ANNOTATION))
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Stamp the generation annotation onto a desired object.
pub(crate) fn stamp_generation<T: ResourceExt>(desired: &mut T, generation: i64) {
    desired
        .annotations_mut()
        .insert(CONFIG_GENERATION_ANNOTATION.to_string(), generation.to_string());
}

/// Whether `T` is a bare `Service`, which is never updated after creation.
pub(crate) fn is_service<T: Resource<DynamicType = ()>>() -> bool {
    T::kind(&()) == "Service"
}

/// Ensure a namespaced resource exists and matches `desired` at `generation`.
///
/// # Errors
///
/// Returns an error when the desired object has no name/namespace, the API
/// rejects a write with anything other than the tolerated races, or the
/// conflict retry budget is exhausted.
pub async fn ensure<T>(client: &Client, generation: i64, desired: &T) -> Result<Applied>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = desired
        .meta()
        .namespace
        .clone()
        .ok_or_else(|| anyhow::anyhow!("resource must have a namespace"))?;
    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    ensure_with_api(&api, generation, desired).await
}

/// Ensure a cluster-scoped resource (e.g. a Namespace) exists and matches
/// `desired` at `generation`.
///
/// # Errors
///
/// Same contract as [`ensure`].
pub async fn ensure_cluster_scoped<T>(
    client: &Client,
    generation: i64,
    desired: &T,
) -> Result<Applied>
where
    T: Resource<DynamicType = (), Scope = ClusterResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let api: Api<T> = Api::all(client.clone());
    ensure_with_api(&api, generation, desired).await
}

async fn ensure_with_api<T>(api: &Api<T>, generation: i64, desired: &T) -> Result<Applied>
where
    T: Resource<DynamicType = ()>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("resource must have a name"))?;
    let kind = T::kind(&()).to_string();

    let mut desired = desired.clone();
    stamp_generation(&mut desired, generation);

    let mut backoff = conflict_backoff();

    for attempt in 1..=MAX_CONFLICT_RETRIES {
        match api.get_opt(&name).await.with_context(|| {
            format!("failed to fetch {kind} {name}")
        })? {
            None => {
                // A resourceVersion copied from a since-deleted object must
                // not leak into the create
                desired.meta_mut().resource_version = None;
                match api.create(&PostParams::default(), &desired).await {
                    Ok(_) => {
                        info!(kind = %kind, name = %name, generation, "Created resource");
                        return Ok(Applied {
                            created: true,
                            updated: false,
                        });
                    }
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {
                        // Benign create race: another writer got there first.
                        // Re-fetch and fall through to the generation compare.
                        debug!(kind = %kind, name = %name, "Create lost a race, re-fetching");
                        continue;
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("failed to create {kind} {name}"))
                    }
                }
            }
            Some(live) => {
                // Bare Services keep their first-applied spec so the
                // cluster-internal address never churns.
                if is_service::<T>() {
                    debug!(kind = %kind, name = %name, "Service exists, skipping update");
                    return Ok(Applied::default());
                }

                let current_generation = applied_generation(live.meta());
                if generation <= current_generation {
                    debug!(
                        kind = %kind,
                        name = %name,
                        generation,
                        current_generation,
                        "Live object is up to date"
                    );
                    return Ok(Applied::default());
                }

                desired.meta_mut().resource_version = live.meta().resource_version.clone();
                match api.replace(&name, &PostParams::default(), &desired).await {
                    Ok(_) => {
                        info!(
                            kind = %kind,
                            name = %name,
                            generation,
                            current_generation,
                            "Updated resource"
                        );
                        return Ok(Applied {
                            created: false,
                            updated: true,
                        });
                    }
                    Err(kube::Error::Api(ae)) if ae.code == 409 => {
                        warn!(
                            kind = %kind,
                            name = %name,
                            attempt,
                            "Update conflict, re-running ensure"
                        );
                        if let Some(delay) = backoff.next_backoff() {
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("failed to update {kind} {name}"))
                    }
                }
            }
        }
    }

    bail!("giving up on {kind} {name} after {MAX_CONFLICT_RETRIES} update conflicts")
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod apply_tests;
