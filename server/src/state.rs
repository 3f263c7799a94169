//! Application state for the HSSAN server
//!
//! Holds the model lifecycle handle, the class registry and the bounded
//! worker pool used for blocking inference.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use hssan::backend::{default_device, DefaultBackend};
use hssan::{ClassRegistry, InferenceEngine, LifecycleConfig, ModelState, DEFAULT_MODEL_PATH};
use tokio::sync::Semaphore;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Model artifact loaded at startup
    pub model_path: PathBuf,
    /// Maximum number of concurrent inference jobs
    pub workers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            workers: 4,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Serving network, initialized once before the listener starts
    pub model: ModelState<DefaultBackend>,
    /// Flower names
    pub classes: ClassRegistry,
    /// Preprocessing and ranking settings
    pub engine: InferenceEngine,
    /// Bounds concurrent blocking inference jobs
    pub workers: Arc<Semaphore>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let lifecycle = LifecycleConfig::new(config.model_path.clone());
        let model = ModelState::new(lifecycle, default_device());
        Self::with_model(config, model, InferenceEngine::new())
    }

    pub fn with_model(
        config: ServerConfig,
        model: ModelState<DefaultBackend>,
        engine: InferenceEngine,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config,
            model,
            classes: ClassRegistry::flowers(),
            engine,
            workers,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
