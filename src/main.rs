// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use proxmesh::{
    constants::{FIELD_MANAGER, TOKIO_WORKER_THREADS},
    context::{Context, Settings},
    crd::ManagedProxyConfiguration,
    events::KubeEventPublisher,
    metrics::{record_error, record_reconciliation_error, record_reconciliation_success},
    reconcilers::configuration::{classify_error, is_ready, kind_label},
    reconcilers::reconcile_configuration,
    rotation::RotationPolicy,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

/// Command-line options for the operator binary.
///
/// All tunables live here; there is no package-level mutable state. Values
/// flow into [`Settings`] once at startup.
#[derive(Debug, Parser)]
#[command(name = "proxmesh", about = "Cluster proxy mesh operator for Kubernetes")]
struct Args {
    /// Validity of issued leaf certificates, in days
    #[arg(long, default_value_t = proxmesh::constants::DEFAULT_CERT_VALIDITY_DAYS)]
    cert_validity_days: i64,

    /// Days before expiry at which certificates are proactively re-issued
    #[arg(long, default_value_t = proxmesh::constants::DEFAULT_RENEW_BEFORE_DAYS)]
    renew_before_days: i64,
}

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("proxmesh-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging with custom format
    //
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Example: RUST_LOG=debug cargo run
    //
    // Respects RUST_LOG_FORMAT environment variable for output format
    // Example: RUST_LOG_FORMAT=json cargo run
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting proxmesh operator");
    debug!(
        cert_validity_days = args.cert_validity_days,
        renew_before_days = args.renew_before_days,
        "Parsed command line"
    );

    // Initialize Kubernetes client
    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let settings = Settings {
        rotation: RotationPolicy::from_days(args.cert_validity_days, args.renew_before_days),
        ..Default::default()
    };
    let publisher = Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER));
    let ctx = Arc::new(Context::new(client.clone(), settings, publisher));

    info!("Starting ManagedProxyConfiguration controller");
    run_configuration_controller(client, ctx).await
}

/// Run the `ManagedProxyConfiguration` controller.
///
/// The controller guarantees at most one in-flight reconcile per distinct
/// configuration name; distinct configurations reconcile independently.
async fn run_configuration_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    let api = Api::<ManagedProxyConfiguration>::all(client);

    Controller::new(api, Config::default())
        .run(reconcile_configuration_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    // Controllers should never exit on their own
    error!("CRITICAL: ManagedProxyConfiguration controller exited unexpectedly");
    anyhow::bail!("ManagedProxyConfiguration controller exited unexpectedly")
}

/// Reconcile wrapper for `ManagedProxyConfiguration`.
async fn reconcile_configuration_wrapper(
    config: Arc<ManagedProxyConfiguration>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    debug!(
        name = %config.name_any(),
        generation = ?config.metadata.generation,
        "Reconcile wrapper called for ManagedProxyConfiguration"
    );

    let started = Instant::now();
    match reconcile_configuration(ctx.clone(), (*config).clone()).await {
        Ok(()) => {
            record_reconciliation_success(kind_label(), started.elapsed());
            info!(
                "Successfully reconciled ManagedProxyConfiguration: {}",
                config.name_any()
            );

            if is_ready(&config) {
                // Everything converged; check back at the slow cadence so
                // certificate renewal windows are still noticed in time
                debug!("Configuration ready, requeueing in 5 minutes");
                Ok(Action::requeue(ctx.settings.ready_requeue))
            } else {
                // Still converging (e.g. load balancer provisioning), check
                // more frequently
                debug!("Configuration not ready, requeueing in 30 seconds");
                Ok(Action::requeue(ctx.settings.error_requeue))
            }
        }
        Err(e) => {
            record_reconciliation_error(kind_label(), started.elapsed());
            record_error(kind_label(), classify_error(&e));
            error!("Failed to reconcile ManagedProxyConfiguration: {:#}", e);
            Err(e.into())
        }
    }
}

/// Error policy for the controller.
fn error_policy(
    _resource: Arc<ManagedProxyConfiguration>,
    _err: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    Action::requeue(ctx.settings.error_requeue)
}
