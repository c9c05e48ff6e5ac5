use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for shipment-sync
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShipmentSyncConfig {
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Tracking identifier allocation
    pub allocator: AllocatorConfig,
    /// Workflow engine integration
    pub workflow: WorkflowConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
    /// Log sync counters on shutdown
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AllocatorConfig {
    /// Candidates tried before giving up with IdentifierSpaceExhausted
    pub max_attempts: u32,
    /// Width of the random decimal suffix
    pub suffix_digits: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Name of the execution variable carrying the shipment id
    pub shipment_variable: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            suffix_digits: 3,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            shipment_variable: "shipmentId".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl Default for ShipmentSyncConfig {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            allocator: AllocatorConfig::default(),
            workflow: WorkflowConfig::default(),
            database: Some(DatabaseConfig {
                url: "sqlite://shipment-sync.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            }),
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("allocator.max_attempts must be at least 1");
        }
        if !(1..=9).contains(&self.suffix_digits) {
            bail!(
                "allocator.suffix_digits must be between 1 and 9, got {}",
                self.suffix_digits
            );
        }
        Ok(())
    }
}

impl ShipmentSyncConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (shipment-sync.toml)
    /// 3. Environment variables (prefixed with SHIPMENT_SYNC_)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("shipment-sync.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_layered(path, Self::environment())
    }

    /// `SHIPMENT_SYNC_<SECTION>__<KEY>`, e.g. `SHIPMENT_SYNC_ALLOCATOR__MAX_ATTEMPTS`.
    /// Sections and keys are split by a double underscore because keys contain `_`.
    fn environment() -> Environment {
        Environment::with_prefix("SHIPMENT_SYNC")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_layered(path: &Path, environment: Environment) -> Result<Self> {
        let defaults = Config::try_from(&ShipmentSyncConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(environment);

        let config: ShipmentSyncConfig = builder.build()?.try_deserialize()?;
        config.allocator.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ShipmentSyncConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ShipmentSyncConfig::load_env_file();
        ShipmentSyncConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ShipmentSyncConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let config = config()?;
    tracing::info!(
        allocator.max_attempts = config.allocator.max_attempts,
        workflow.shipment_variable = %config.workflow.shipment_variable,
        "Configuration loaded successfully"
    );
    Ok(())
}
