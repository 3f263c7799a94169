//! # HSSAN Flower Classifier
//!
//! A Rust library for flower species classification with a multi-branch,
//! channel-attention CNN ("HSSAN") built on the Burn framework.
//!
//! ## Features
//!
//! - **Two network variants**: a spectral-spatial network for hyperspectral
//!   cubes (3-D stem) and an RGB network for ordinary photographs (2-D stem)
//! - **Reusable blocks**: squeeze-and-excitation attention gate and an
//!   inception-style multi-branch block
//! - **Model lifecycle**: load a persisted artifact or fall back to a freshly
//!   built network, so serving never fails at startup
//! - **Inference pipeline**: image bytes in, ranked flower names out
//!
//! ## Modules
//!
//! - `model`: attention gate, multi-branch block and both network variants
//! - `lifecycle`: model state, artifact persistence and the custom layer registry
//! - `inference`: preprocessing, guarded prediction and top-k ranking
//! - `classes`: the 102 Oxford flower names
//! - `backend`: Burn backend selection
//! - `utils`: logging, errors and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hssan::backend::{default_device, DefaultBackend};
//! use hssan::{ClassRegistry, InferenceEngine, LifecycleConfig, ModelState};
//!
//! let state = ModelState::<DefaultBackend>::new(LifecycleConfig::default(), default_device());
//! state.initialize()?;
//!
//! let bytes = std::fs::read("rose.jpg")?;
//! let predictions = InferenceEngine::new().classify(&state, &ClassRegistry::flowers(), &bytes)?;
//! ```

pub mod backend;
pub mod classes;
pub mod inference;
pub mod lifecycle;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use classes::{ClassRegistry, NUM_CLASSES};
pub use inference::{rank_top_k, InferenceEngine, PredictionResult, DEFAULT_TOP_K};
pub use lifecycle::{
    load_artifact, save_artifact, LayerRegistry, LifecycleConfig, ModelState, ModelStatus,
    DEFAULT_MODEL_PATH,
};
pub use model::{HssanConfig, HssanNetwork, HssanVariant, NetworkSummary};
pub use utils::error::{HssanError, Result};
