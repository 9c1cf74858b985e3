// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status aggregation for `ManagedProxyConfiguration` resources.
//!
//! The current state is re-derived from live objects every pass: the
//! Deployment's scale subresource answers "deployed?", and the two
//! server-side certificate Secrets answer "signed?" with their expiry
//! timestamps. Conditions are a pure mapping from that state, and the status
//! subresource is written only when the conditions actually changed (ignoring
//! transition times) or when this pass modified resources.

#[allow(clippy::wildcard_imports)]
use super::types::*;
use crate::ca::CertificateInfo;
use crate::constants::TLS_CERT_KEY;
use crate::reconcilers::conditions_equal;

/// Live state observed for one configuration.
#[derive(Clone, Debug, Default)]
pub struct CurrentState {
    /// Whether the proxy server Deployment exists
    pub deployed: bool,
    /// Replica count from the scale subresource, when deployed
    pub replicas: Option<i32>,
    /// Expiry of the proxy-server certificate, RFC3339, when signed
    pub proxy_server_expiry: Option<String>,
    /// Expiry of the agent-server certificate, RFC3339, when signed
    pub agent_server_expiry: Option<String>,
}

/// Read live state for the configuration.
///
/// NotFound on any object means "not yet there" rather than an error; a
/// certificate Secret that exists but cannot be parsed is a fatal error
/// requiring operator intervention.
pub(super) async fn get_current_state(
    client: &Client,
    config: &ManagedProxyConfiguration,
) -> Result<CurrentState> {
    let namespace = config.proxy_server_namespace();
    let name = config.name_any();

    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let (deployed, replicas) = match deploy_api.get_scale(&name).await {
        Ok(scale) => (true, scale.spec.and_then(|s| s.replicas)),
        Err(kube::Error::Api(ae)) if ae.code == 404 => (false, None),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("failed to read scale of deployment {namespace}/{name}"))
        }
    };

    let proxy_server_expiry =
        secret_expiry(client, namespace, config.proxy_server_secret_name()).await?;
    let agent_server_expiry =
        secret_expiry(client, namespace, config.agent_server_secret_name()).await?;

    Ok(CurrentState {
        deployed,
        replicas,
        proxy_server_expiry,
        agent_server_expiry,
    })
}

/// Expiry timestamp of the certificate stored in a Secret, or `None` when the
/// Secret does not exist yet.
async fn secret_expiry(client: &Client, namespace: &str, name: &str) -> Result<Option<String>> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let Some(secret) = api
        .get_opt(name)
        .await
        .with_context(|| format!("failed to read certificate secret {namespace}/{name}"))?
    else {
        return Ok(None);
    };

    let cert_pem = secret
        .data
        .as_ref()
        .and_then(|data| data.get(TLS_CERT_KEY))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .ok_or_else(|| {
            anyhow::anyhow!("certificate secret {namespace}/{name} has no usable {TLS_CERT_KEY}")
        })?;

    let info = CertificateInfo::from_pem(&cert_pem)
        .with_context(|| format!("failed to parse certificate in secret {namespace}/{name}"))?;

    let expiry = chrono::DateTime::from_timestamp(info.not_after, 0)
        .map(|ts| ts.to_rfc3339())
        .ok_or_else(|| {
            anyhow::anyhow!("certificate in secret {namespace}/{name} has an invalid NotAfter")
        })?;

    Ok(Some(expiry))
}

/// Pure mapping from observed state to the three reported conditions.
#[must_use]
pub fn get_conditions(state: &CurrentState) -> Vec<Condition> {
    let now = Utc::now().to_rfc3339();

    let deployed = if state.deployed {
        Condition {
            r#type: CONDITION_PROXY_SERVER_DEPLOYED.to_string(),
            status: STATUS_TRUE.to_string(),
            reason: Some(REASON_SUCCESSFULLY_DEPLOYED.to_string()),
            message: Some(format!(
                "Proxy server deployed with {} replicas",
                state.replicas.unwrap_or(0)
            )),
            last_transition_time: Some(now.clone()),
        }
    } else {
        Condition {
            r#type: CONDITION_PROXY_SERVER_DEPLOYED.to_string(),
            status: STATUS_FALSE.to_string(),
            reason: Some(REASON_NOT_YET_DEPLOYED.to_string()),
            message: Some("Proxy server deployment not found".to_string()),
            last_transition_time: Some(now.clone()),
        }
    };

    let signed_condition = |r#type: &str, expiry: &Option<String>| match expiry {
        Some(expiry) => Condition {
            r#type: r#type.to_string(),
            status: STATUS_TRUE.to_string(),
            reason: Some(REASON_SUCCESSFULLY_SIGNED.to_string()),
            message: Some(format!("Certificate is signed, expires {expiry}")),
            last_transition_time: Some(now.clone()),
        },
        None => Condition {
            r#type: r#type.to_string(),
            status: STATUS_FALSE.to_string(),
            reason: Some(REASON_NOT_YET_SIGNED.to_string()),
            message: Some("Certificate secret not found".to_string()),
            last_transition_time: Some(now.clone()),
        },
    };

    vec![
        deployed,
        signed_condition(CONDITION_PROXY_SERVER_SECRET_SIGNED, &state.proxy_server_expiry),
        signed_condition(CONDITION_AGENT_SERVER_SECRET_SIGNED, &state.agent_server_expiry),
    ]
}

/// Recompute conditions from live state and write the status subresource,
/// suppressing the write when nothing changed and this pass modified nothing.
pub(super) async fn refresh_status(
    client: &Client,
    config: &ManagedProxyConfiguration,
    resources_changed: bool,
) -> Result<()> {
    let state = get_current_state(client, config).await?;
    let conditions = get_conditions(&state);

    let current = config
        .status
        .as_ref()
        .map(|status| status.conditions.as_slice())
        .unwrap_or_default();

    if !resources_changed && conditions_equal(current, &conditions) {
        debug!(
            name = %config.name_any(),
            "Status unchanged, skipping patch"
        );
        return Ok(());
    }

    let status = ManagedProxyConfigurationStatus {
        conditions,
        last_observed_generation: config.metadata.generation,
    };

    let api: Api<ManagedProxyConfiguration> = Api::all(client.clone());
    api.patch_status(
        &config.name_any(),
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": status })),
    )
    .await
    .with_context(|| format!("failed to patch status of {}", config.name_any()))?;

    debug!(name = %config.name_any(), "Patched status");
    Ok(())
}

#[cfg(test)]
#[path = "status_helpers_tests.rs"]
mod status_helpers_tests;
