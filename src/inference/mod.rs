//! Inference module for flower prediction
//!
//! This module provides:
//! - Image decoding and preprocessing into the network's input layout
//! - Guarded forward evaluation (shape checks, panic capture, finiteness)
//! - Top-k ranking with class names
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> decode -> RGB -> resize 224x224 -> /255 -> [1, 224, 224, 3]
//!       -> forward -> probabilities -> rank_top_k
//! ```

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{rank_top_k, InferenceEngine, PredictionResult};

/// Default number of ranked predictions per request
pub const DEFAULT_TOP_K: usize = 3;
