//! Model module for the HSSAN architecture using the Burn framework
//!
//! This module provides:
//! - The channel attention gate (squeeze-and-excitation)
//! - The multi-branch (inception-style) feature block
//! - Both network variants and their configuration
//!
//! ## Architecture
//!
//! HSSAN combines multi-scale convolution with channel attention. The
//! spectral-spatial variant consumes hyperspectral cubes through a 3-D stem;
//! the RGB variant consumes ordinary photographs through a 2-D stem. Both end
//! in the same stage/attention tail and a softmax classifier.

pub mod attention;
pub mod config;
pub mod hssan;
pub mod inception;

// Re-export main types for convenience
pub use attention::{AttentionGate, AttentionGateConfig};
pub use config::{HssanConfig, HssanVariant, LayerShape, StageConfig};
pub use hssan::{build_stage, HssanNetwork, HssanRgb, HssanSpectral, NetworkSummary};
pub use inception::{BranchConfig, MultiBranchBlock};
