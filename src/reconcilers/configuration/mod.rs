// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ManagedProxyConfiguration` reconciliation logic.
//!
//! The reconciler is level-triggered: every pass re-derives all desired and
//! observed state from scratch, which keeps the loop resilient to missed
//! watch events. Steps run in a strict order — namespace → entrypoint →
//! certificate rotation → resource apply → status — and every step is
//! independently idempotent, so an aborted pass is safely retried as a whole.
//!
//! ## Module Structure
//!
//! - [`entrypoint`] - Entrypoint address resolution
//! - [`resources`] - Desired-object builders
//! - [`status_helpers`] - Status aggregation and updates
//! - [`types`] - Shared types and imports

// Submodules
pub mod entrypoint;
pub mod resources;
pub mod status_helpers;
pub mod types;

use entrypoint::resolve_entrypoint;
use resources::{
    build_ca_dump_secret, build_cluster_service, build_deployment, build_namespace,
    build_portforward_role, build_portforward_role_binding, build_service_account,
};
use status_helpers::refresh_status;
#[allow(clippy::wildcard_imports)]
use types::*;

use crate::ca::CaError;
use crate::constants::{
    CA_SECRET_SUFFIX, KIND_MANAGED_PROXY_CONFIGURATION, LEGACY_AGENT_CLIENT_SECRET_SUFFIX,
};
use crate::events::{actions, reasons};
use crate::metrics::{record_resource_created, record_resource_updated};
use crate::reconcilers::apply::{self, Applied};
use crate::rotation::{ensure_target, required_sans, RotationTarget, UsageProfile};
use kube::runtime::events::EventType;
use kube::Resource as KubeResource;

/// Error category for metrics, derived from the error chain.
#[must_use]
pub fn classify_error(err: &anyhow::Error) -> &'static str {
    if err
        .chain()
        .any(|cause| cause.downcast_ref::<entrypoint::EntrypointNotReady>().is_some())
    {
        return "entrypoint_pending";
    }
    if err.chain().any(|cause| cause.downcast_ref::<CaError>().is_some()) {
        return "ca_error";
    }
    "api_error"
}

/// Whether the cluster serves the certificates.k8s.io/v1 CSR API.
///
/// The legacy agent-client certificate target is rotated only when it does
/// not; on a transient discovery failure the API is assumed present so no
/// spurious legacy certificates are issued.
async fn cluster_supports_csr_v1(client: &Client) -> bool {
    match client
        .list_api_group_resources("certificates.k8s.io/v1")
        .await
    {
        Ok(list) => list
            .resources
            .iter()
            .any(|resource| resource.kind == "CertificateSigningRequest"),
        Err(e) => {
            debug!(error = %e, "CSR API discovery failed, assuming v1 support");
            true
        }
    }
}

/// Run certificate rotation for every required target, sequentially.
///
/// A failure on any target aborts the remaining targets for this pass; the
/// next pass retries all of them from scratch, which is safe because rotation
/// is idempotent. Returns the number of certificates signed and the CA
/// certificate for distribution.
async fn ensure_rotation(
    ctx: &Context,
    config: &ManagedProxyConfiguration,
    entrypoint_address: Option<&str>,
) -> Result<(usize, String)> {
    let namespace = config.proxy_server_namespace();
    let ca_secret_name = format!("{}{CA_SECRET_SUFFIX}", config.name_any());

    let mut signer = ctx.signer_for(namespace, &ca_secret_name).await?;

    let sans = required_sans(
        &config.additional_sans(),
        entrypoint_address,
        config.in_cluster_service_name(),
        namespace,
    );

    let mut targets = vec![
        RotationTarget {
            namespace: namespace.to_string(),
            secret_name: config.proxy_server_secret_name().to_string(),
            common_name: "proxy-server".to_string(),
            sans: sans.clone(),
            usage: UsageProfile::ServerAuth,
        },
        RotationTarget {
            namespace: namespace.to_string(),
            secret_name: config.agent_server_secret_name().to_string(),
            common_name: "agent-server".to_string(),
            sans: sans.clone(),
            usage: UsageProfile::ServerAuth,
        },
        RotationTarget {
            namespace: namespace.to_string(),
            secret_name: config.proxy_client_secret_name().to_string(),
            common_name: "proxy-client".to_string(),
            sans: sans.clone(),
            usage: UsageProfile::ClientAuth,
        },
    ];

    if !cluster_supports_csr_v1(&ctx.client).await {
        info!("Cluster lacks certificates.k8s.io/v1, rotating legacy agent-client certificate");
        targets.push(RotationTarget {
            namespace: namespace.to_string(),
            secret_name: format!("{}{LEGACY_AGENT_CLIENT_SECRET_SUFFIX}", config.name_any()),
            common_name: "proxy-agent".to_string(),
            sans,
            usage: UsageProfile::ClientAuth,
        });
    }

    let now = ::time::OffsetDateTime::now_utc();
    let mut signed = 0;
    let mut result = Ok(());
    for target in &targets {
        match ensure_target(&ctx.client, &mut signer, &ctx.settings.rotation, target, now).await {
            Ok(true) => signed += 1,
            Ok(false) => {}
            Err(e) => {
                // No partial success: remaining targets wait for the retry.
                result = Err(e.context(format!(
                    "certificate rotation aborted at secret {}",
                    target.secret_name
                )));
                break;
            }
        }
    }

    // The serial counter must survive the pass even when rotation aborted
    // part-way, so the signer is stored back before the error propagates.
    let ca_data = crate::ca::CertificateSigner::ca_data(&signer);
    ctx.store_signer(namespace, &ca_secret_name, signer).await;
    result?;

    Ok((signed, ca_data))
}

/// Build and apply the desired resource set, batching notifications.
async fn deploy_resources(
    ctx: &Context,
    config: &ManagedProxyConfiguration,
    generation: i64,
    ca_pem: &str,
) -> Result<(Vec<String>, Vec<String>)> {
    let client = &ctx.client;
    let mut created = Vec::new();
    let mut updated = Vec::new();

    let mut track = |kind: &str, name: String, applied: Applied| {
        if applied.created {
            record_resource_created(kind);
            created.push(format!("{kind} {name}"));
        }
        if applied.updated {
            record_resource_updated(kind);
            updated.push(format!("{kind} {name}"));
        }
    };

    let service_account = build_service_account(config);
    let applied = apply::ensure(client, generation, &service_account).await?;
    track("ServiceAccount", service_account.name_any(), applied);

    let service = build_cluster_service(config);
    let applied = apply::ensure(client, generation, &service).await?;
    track("Service", service.name_any(), applied);

    let ca_dump = build_ca_dump_secret(config, ca_pem);
    let applied = apply::ensure(client, generation, &ca_dump).await?;
    track("Secret", ca_dump.name_any(), applied);

    let deployment = build_deployment(config, ca_pem);
    let applied = apply::ensure(client, generation, &deployment).await?;
    track("Deployment", deployment.name_any(), applied);

    // Port-forward RBAC exists only for the PortForward entrypoint type
    if config.entrypoint_type() == EntrypointType::PortForward {
        let role = build_portforward_role(config);
        let applied = apply::ensure(client, generation, &role).await?;
        track("Role", role.name_any(), applied);

        let binding = build_portforward_role_binding(config);
        let applied = apply::ensure(client, generation, &binding).await?;
        track("RoleBinding", binding.name_any(), applied);
    }

    Ok((created, updated))
}

/// Reconcile one `ManagedProxyConfiguration`.
///
/// Per pass, strictly ordered: ensure the namespace, resolve the entrypoint,
/// rotate every certificate target, apply the resource set, refresh status.
/// There is no terminal state; "done" is live state already matching desired
/// state, re-verified every pass.
///
/// # Errors
///
/// Returns an error when any step fails; the enclosing controller requeues
/// with backoff. A missing configuration never reaches this function (the
/// watch drops it), and a deleted configuration is left alone.
pub async fn reconcile_configuration(
    ctx: Arc<Context>,
    config: ManagedProxyConfiguration,
) -> Result<()> {
    let name = config.name_any();
    let namespace = config.proxy_server_namespace().to_string();
    let generation = config.metadata.generation.unwrap_or(0);

    info!("Reconciling ManagedProxyConfiguration: {}", name);
    debug!(
        name = %name,
        namespace = %namespace,
        generation,
        "Starting configuration reconciliation"
    );

    // No finalizer: produced secrets and workloads outlive the configuration
    // deliberately, so deletion needs no cleanup pass.
    if config.metadata.deletion_timestamp.is_some() {
        debug!(name = %name, "Configuration is being deleted, nothing to do");
        return Ok(());
    }

    // Step 2: the target namespace (tolerates the create race like any apply)
    let ns = build_namespace(&config);
    apply::ensure_cluster_scoped(&ctx.client, generation, &ns)
        .await
        .with_context(|| format!("failed to ensure namespace {namespace}"))?;

    // Step 3: resolve the externally reachable address
    let entrypoint_address = resolve_entrypoint(&ctx.client, &config, generation).await?;
    debug!(
        name = %name,
        entrypoint = ?entrypoint_address,
        "Resolved entrypoint"
    );

    // Step 4: rotate every certificate target against the current CA
    let (signed, ca_pem) = ensure_rotation(&ctx, &config, entrypoint_address.as_deref()).await?;
    if signed > 0 {
        info!(name = %name, signed, "Rotated certificate secrets");
    }

    // Step 5: apply the resource set and batch the notifications
    let (created, updated) = deploy_resources(&ctx, &config, generation, &ca_pem).await?;

    let config_ref = KubeResource::object_ref(&config, &());
    if !created.is_empty() {
        ctx.publisher
            .publish(
                &config_ref,
                EventType::Normal,
                reasons::RESOURCES_CREATED,
                actions::RECONCILE,
                Some(format!("Created: {}", created.join(", "))),
            )
            .await;
    }
    if !updated.is_empty() {
        ctx.publisher
            .publish(
                &config_ref,
                EventType::Normal,
                reasons::RESOURCES_UPDATED,
                actions::RECONCILE,
                Some(format!("Updated: {}", updated.join(", "))),
            )
            .await;
    }
    if signed > 0 {
        ctx.publisher
            .publish(
                &config_ref,
                EventType::Normal,
                reasons::CERTIFICATES_SIGNED,
                actions::RECONCILE,
                Some(format!("Signed {signed} certificate secret(s)")),
            )
            .await;
    }

    // Step 6: recompute conditions; written only on change or after writes
    let resources_changed = signed > 0 || !created.is_empty() || !updated.is_empty();
    refresh_status(&ctx.client, &config, resources_changed).await?;

    debug!(name = %name, "Reconciliation complete");
    Ok(())
}

/// Whether every reported condition is True, used to pick the requeue
/// interval.
#[must_use]
pub fn is_ready(config: &ManagedProxyConfiguration) -> bool {
    config
        .status
        .as_ref()
        .is_some_and(|status| {
            !status.conditions.is_empty()
                && status.conditions.iter().all(|c| c.status == STATUS_TRUE)
        })
}

/// Resource kind label used in metrics.
#[must_use]
pub fn kind_label() -> &'static str {
    KIND_MANAGED_PROXY_CONFIGURATION
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
