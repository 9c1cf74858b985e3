// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Entrypoint address resolution.
//!
//! The entrypoint is the externally reachable address agents dial. `Hostname`
//! resolves to the literal configured value; `LoadBalancerService` creates the
//! LoadBalancer Service on first use and reads the provisioned ingress IP;
//! `PortForward` has no external address at all, so certificates carry only
//! the loopback and in-cluster identities.
//!
//! Resolution runs before rotation and resource deployment. An unprovisioned
//! load balancer aborts the pass with [`EntrypointNotReady`], which is safe to
//! retry because nothing downstream has executed yet.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::constants::DEFAULT_LB_SERVICE_NAME;
use crate::reconcilers::apply;

/// The LoadBalancer Service exists but the cloud provider has not yet
/// provisioned an ingress address. Retryable.
#[derive(Debug, thiserror::Error)]
#[error("load balancer ingress for service {namespace}/{name} is not yet provisioned")]
pub struct EntrypointNotReady {
    /// Namespace of the LoadBalancer Service
    pub namespace: String,
    /// Name of the LoadBalancer Service
    pub name: String,
}

/// Name of the LoadBalancer Service for the entrypoint, honoring the
/// configured override.
#[must_use]
pub fn load_balancer_service_name(config: &ManagedProxyConfiguration) -> String {
    config
        .spec
        .proxy_server
        .entrypoint
        .as_ref()
        .and_then(|e| e.load_balancer_service.as_ref())
        .and_then(|lb| lb.name.clone())
        .unwrap_or_else(|| DEFAULT_LB_SERVICE_NAME.to_string())
}

/// Resolve the externally reachable entrypoint address.
///
/// Returns `None` for the `PortForward` entrypoint type, which has no
/// external address.
///
/// # Errors
///
/// Returns [`EntrypointNotReady`] (wrapped) while a LoadBalancer ingress is
/// still being provisioned, or an error when the configuration is missing the
/// data its entrypoint type requires.
pub async fn resolve_entrypoint(
    client: &Client,
    config: &ManagedProxyConfiguration,
    generation: i64,
) -> Result<Option<String>> {
    match config.entrypoint_type() {
        EntrypointType::PortForward => Ok(None),
        EntrypointType::Hostname => {
            let hostname = config
                .spec
                .proxy_server
                .entrypoint
                .as_ref()
                .and_then(|e| e.hostname.as_ref())
                .map(|h| h.value.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "entrypoint type Hostname requires spec.proxyServer.entrypoint.hostname"
                    )
                })?;
            debug!(hostname = %hostname, "Resolved hostname entrypoint");
            Ok(Some(hostname))
        }
        EntrypointType::LoadBalancerService => {
            let namespace = config.proxy_server_namespace().to_string();
            let name = load_balancer_service_name(config);

            // Services are created once and never updated, so this is a
            // create-if-absent through the regular applier.
            let desired = super::resources::build_entrypoint_load_balancer(config, &name);
            apply::ensure(client, generation, &desired)
                .await
                .with_context(|| {
                    format!("failed to ensure load balancer service {namespace}/{name}")
                })?;

            let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
            let live = api.get(&name).await.with_context(|| {
                format!("failed to read load balancer service {namespace}/{name}")
            })?;

            let ingress_ip = live
                .status
                .as_ref()
                .and_then(|status| status.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .and_then(|ingress| ingress.first())
                .and_then(|entry| entry.ip.clone());

            match ingress_ip {
                Some(ip) => {
                    debug!(namespace = %namespace, name = %name, ip = %ip, "Resolved load balancer entrypoint");
                    Ok(Some(ip))
                }
                None => Err(EntrypointNotReady { namespace, name }.into()),
            }
        }
    }
}

#[cfg(test)]
#[path = "entrypoint_tests.rs"]
mod entrypoint_tests;
