use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use shipment_sync::config::ShipmentSyncConfig;
use shipment_sync::engine::{EngineSignal, WorkflowStepHandler};
use shipment_sync::observability::SyncMetrics;
use shipment_sync::registration::ShipmentRegistrar;
use shipment_sync::storage::{InMemoryShipmentStore, ShipmentStore};
use shipment_sync::telemetry::init_telemetry;
use shipment_sync::workflows::step_map::{self, STEP_STATUS_TABLE};
use shipment_sync::{ShipmentId, StatusSynchronizer, StepNotification, TrackingIdAllocator};

#[derive(Parser)]
#[command(name = "shipment-sync")]
#[command(about = "Keep shipment records in step with workflow engine progress")]
struct Cli {
    /// Configuration file (defaults to ./shipment-sync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List workflow steps and the status each one applies
    Steps,
    /// Register a new shipment and print its tracking identifier
    Create,
    /// Apply one workflow step notification
    Sync {
        /// Workflow step identifier, e.g. task_UpdateStatusReceived
        #[arg(long)]
        step: String,
        /// Workflow run identifier driving the update
        #[arg(long)]
        run_id: String,
        /// Workflow execution identifier
        #[arg(long)]
        execution_id: Option<String>,
        /// Shipment id variable; parsed as JSON, falls back to a string
        #[arg(long)]
        shipment_id: Option<String>,
        /// Full variable bag as a JSON object
        #[arg(long, default_value = "{}")]
        variables: String,
    },
    /// Print a stored shipment
    Show {
        /// Internal shipment id
        id: i64,
    },
    /// Walk one shipment through create, receive, redelivery and delivery in memory
    Demo,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = ShipmentSyncConfig::load_env_file();
    let config = match &cli.config {
        Some(path) => ShipmentSyncConfig::load_from(path)?,
        None => ShipmentSyncConfig::load()?,
    };
    init_telemetry(&config.observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        let metrics = Arc::new(SyncMetrics::new());
        let result = match cli.command {
            Commands::Steps => steps_command(),
            Commands::Create => {
                let store = open_store(&config).await?;
                create_command(store, &config, metrics.clone()).await
            }
            Commands::Sync {
                step,
                run_id,
                execution_id,
                shipment_id,
                variables,
            } => {
                let store = open_store(&config).await?;
                let mut notification = StepNotification::new(step, run_id);
                notification.execution_id = execution_id;
                notification.variables = serde_json::from_str(&variables)
                    .context("--variables must be a JSON object")?;
                if let Some(raw) = shipment_id {
                    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                    notification
                        .variables
                        .insert(config.workflow.shipment_variable.clone(), value);
                }
                sync_command(store, &config, metrics.clone(), notification).await
            }
            Commands::Show { id } => {
                let store = open_store(&config).await?;
                show_command(store, id).await
            }
            Commands::Demo => demo_command(&config, metrics.clone()).await,
        };

        if config.observability.metrics_enabled {
            metrics.log_stats();
        }
        result
    })
}

async fn open_store(config: &ShipmentSyncConfig) -> Result<Arc<dyn ShipmentStore>> {
    #[cfg(feature = "database")]
    {
        if let Some(db) = &config.database {
            let store = shipment_sync::storage::SqliteShipmentStore::connect(db).await?;
            return Ok(Arc::new(store));
        }
    }
    let _ = config;
    warn!("No database available, using an in-memory store; nothing will persist");
    Ok(Arc::new(InMemoryShipmentStore::new()))
}

fn steps_command() -> Result<()> {
    println!("{:<40} STATUS", "STEP");
    for (step, status) in STEP_STATUS_TABLE {
        println!("{step:<40} {status}");
    }
    Ok(())
}

async fn create_command(
    store: Arc<dyn ShipmentStore>,
    config: &ShipmentSyncConfig,
    metrics: Arc<SyncMetrics>,
) -> Result<()> {
    let allocator = TrackingIdAllocator::new(store.clone(), &config.allocator).with_metrics(metrics);
    let registrar = ShipmentRegistrar::new(store, allocator);
    let shipment = registrar.register().await?;
    println!("{}", serde_json::to_string_pretty(&shipment)?);
    Ok(())
}

async fn sync_command(
    store: Arc<dyn ShipmentStore>,
    config: &ShipmentSyncConfig,
    metrics: Arc<SyncMetrics>,
    notification: StepNotification,
) -> Result<()> {
    let synchronizer = StatusSynchronizer::from_config(store, &config.workflow).with_metrics(metrics);
    let handler = WorkflowStepHandler::new(Arc::new(synchronizer));
    let signal = handler.handle(&notification).await;
    println!("{}", serde_json::to_string_pretty(&signal)?);

    match signal {
        EngineSignal::Complete { .. } => Ok(()),
        EngineSignal::BusinessError { error_code, .. } | EngineSignal::Failure { error_code, .. } => {
            anyhow::bail!("step {} was not applied: {}", notification.step_identifier, error_code)
        }
    }
}

async fn show_command(store: Arc<dyn ShipmentStore>, id: i64) -> Result<()> {
    match store.find_by_id(ShipmentId(id)).await? {
        Some(shipment) => {
            println!("{}", serde_json::to_string_pretty(&shipment)?);
            Ok(())
        }
        None => anyhow::bail!("shipment {id} not found"),
    }
}

async fn demo_command(config: &ShipmentSyncConfig, metrics: Arc<SyncMetrics>) -> Result<()> {
    let store: Arc<dyn ShipmentStore> = Arc::new(InMemoryShipmentStore::new());
    let allocator =
        TrackingIdAllocator::new(store.clone(), &config.allocator).with_metrics(metrics.clone());
    let registrar = ShipmentRegistrar::new(store.clone(), allocator);
    let synchronizer = StatusSynchronizer::from_config(store.clone(), &config.workflow)
        .with_metrics(metrics);
    let handler = WorkflowStepHandler::new(Arc::new(synchronizer));

    let shipment = registrar.register().await?;
    println!(
        "created shipment {} tracking {} status {}",
        shipment.id, shipment.tracking_id, shipment.status
    );

    let run_id = "demo-run";
    let steps = [
        step_map::STEP_RECEIVED,
        step_map::STEP_RECEIVED,
        step_map::STEP_DELIVERED,
    ];
    for step in steps {
        let notification = StepNotification::new(step, run_id).with_variable(
            config.workflow.shipment_variable.clone(),
            Value::from(shipment.id.value()),
        );
        let signal = handler.handle(&notification).await;
        println!("{step:<32} -> {}", serde_json::to_string(&signal)?);
    }

    if let Some(final_state) = store.find_by_id(shipment.id).await? {
        println!(
            "final status {} run {}",
            final_state.status,
            final_state.workflow_run_id.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
