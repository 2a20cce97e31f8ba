//! Seatwise
//!
//! Relationship-aware seating optimization:
//! - Guest relationship graph with typed, weighted edges
//! - Hard constraint validation and a deterministic three-part score
//! - Seeded local-search optimizer running as cancellable background jobs
//! - Per-event arrangement store with comparison, promotion and manual edits
//! - HTTP + WebSocket API for job control and live progress

pub mod api;
pub mod arrangement;
pub mod constraints;
pub mod events;
pub mod export;
pub mod graph;
pub mod jobs;
pub mod optimizer;
pub mod scoring;
pub mod service;
pub mod store;
pub mod suggest;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::events::EventBus;
use crate::optimizer::OptimizerConfig;
use crate::service::SeatingService;
use crate::store::{InMemorySeatingStore, JsonFileSeatingStore, SeatingStore};
use crate::suggest::HttpSuggester;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub storage: StorageYamlConfig,
    pub optimizer: OptimizerYamlConfig,
    /// Text-analysis collaborator; absent URL disables suggestions
    pub suggest: SuggestYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// One JSON file per event and arrangement under `data_dir`
    File,
    /// Nothing survives a restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageYamlConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "./data".into(),
        }
    }
}

/// Optimizer defaults, used for every field a request leaves unset
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerYamlConfig {
    pub table_count: u32,
    pub table_capacity: u32,
    pub max_iterations: u64,
    pub time_budget_ms: u64,
    pub candidates: usize,
    pub initial_temperature: f64,
    pub seed: Option<u64>,
    pub keep_families_together: bool,
}

impl Default for OptimizerYamlConfig {
    fn default() -> Self {
        let defaults = OptimizerConfig::default();
        Self {
            table_count: defaults.table_count,
            table_capacity: defaults.table_capacity,
            max_iterations: defaults.max_iterations,
            time_budget_ms: defaults.time_budget_ms,
            candidates: defaults.candidates,
            initial_temperature: defaults.initial_temperature,
            seed: defaults.seed,
            keep_families_together: defaults.keep_families_together,
        }
    }
}

/// Suggestion service section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SuggestYamlConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SuggestYamlConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub storage_backend: StorageBackend,
    pub data_dir: PathBuf,
    pub optimizer: OptimizerConfig,
    /// None disables relationship suggestions
    pub suggest_url: Option<String>,
    pub suggest_api_key: Option<String>,
    pub suggest_timeout_secs: u64,
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {}", var, raw);
            None
        }
    }
}

impl Config {
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let optimizer = OptimizerConfig {
            table_count: env_parse("OPTIMIZER_TABLE_COUNT").unwrap_or(yaml.optimizer.table_count),
            table_capacity: env_parse("OPTIMIZER_TABLE_CAPACITY")
                .unwrap_or(yaml.optimizer.table_capacity),
            max_iterations: env_parse("OPTIMIZER_MAX_ITERATIONS")
                .unwrap_or(yaml.optimizer.max_iterations),
            time_budget_ms: env_parse("OPTIMIZER_TIME_BUDGET_MS")
                .unwrap_or(yaml.optimizer.time_budget_ms),
            candidates: env_parse("OPTIMIZER_CANDIDATES").unwrap_or(yaml.optimizer.candidates),
            initial_temperature: yaml.optimizer.initial_temperature,
            seed: env_parse("OPTIMIZER_SEED").or(yaml.optimizer.seed),
            keep_families_together: env_parse("OPTIMIZER_KEEP_FAMILIES_TOGETHER")
                .unwrap_or(yaml.optimizer.keep_families_together),
            ..Default::default()
        };

        // An explicitly empty or "disabled" URL turns suggestions off
        let suggest_url = std::env::var("SUGGEST_URL")
            .ok()
            .or(yaml.suggest.url)
            .filter(|u| !u.trim().is_empty() && u != "disabled");

        Ok(Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(yaml.server.host),
            server_port: env_parse("SERVER_PORT").unwrap_or(yaml.server.port),
            storage_backend: env_parse("STORAGE_BACKEND").unwrap_or(yaml.storage.backend),
            data_dir: PathBuf::from(std::env::var("DATA_DIR").unwrap_or(yaml.storage.data_dir)),
            optimizer,
            suggest_url,
            suggest_api_key: std::env::var("SUGGEST_API_KEY")
                .ok()
                .or(yaml.suggest.api_key)
                .filter(|k| !k.is_empty()),
            suggest_timeout_secs: yaml.suggest.timeout_secs,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Startup
// ============================================================================

/// Build the seating service: storage backend, event bus, optional
/// suggestion client, and every stored event loaded into memory.
pub async fn build_service(config: &Config) -> Result<Arc<SeatingService>> {
    let store: Arc<dyn SeatingStore> = match config.storage_backend {
        StorageBackend::File => Arc::new(JsonFileSeatingStore::open(&config.data_dir).await?),
        StorageBackend::Memory => Arc::new(InMemorySeatingStore::new()),
    };
    let bus = Arc::new(EventBus::default());
    let mut service = SeatingService::new(store, bus, config.optimizer.clone());

    if let Some(url) = &config.suggest_url {
        let suggester = HttpSuggester::new(
            url,
            config.suggest_api_key.clone(),
            config.suggest_timeout_secs,
        )?;
        tracing::info!(url = %suggester.url(), "Relationship suggestions enabled");
        service = service.with_suggester(Arc::new(suggester));
    }

    let service = Arc::new(service);
    service
        .load_all()
        .await
        .context("Failed to load stored events")?;
    Ok(service)
}

/// Run the HTTP server until Ctrl+C.
pub async fn start_server(config: Config) -> Result<()> {
    let service = build_service(&config).await?;
    let app = api::create_router(Arc::new(api::ServerState { service }));

    let addr = format!("{}:{}", config.server_host, config.server_port);
    tracing::info!("Seatwise listening on http://{}", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// ============================================================================
// Tests
// ============================================================================
