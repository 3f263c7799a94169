//! Model artifact persistence
//!
//! An artifact is a single file holding a bincode envelope:
//!
//! | field          | content                                          |
//! |----------------|--------------------------------------------------|
//! | `magic`        | `b"HSSAN"`                                       |
//! | `version`      | format version, currently 1                      |
//! | `architecture` | [`ArtifactDescriptor`] as JSON text              |
//! | `weights`      | module record encoded with `BinBytesRecorder`    |
//!
//! Loading rebuilds the network from the architecture block (custom layers go
//! through the [`LayerRegistry`]), loads the weights into it and checks the
//! recorded parameter count against the rebuilt network.

use std::fs;
use std::path::Path;

use bincode::Options;
use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::registry::{CustomLayer, LayerRegistry, ATTENTION_GATE_TAG, MULTI_BRANCH_TAG};
use crate::model::{BranchConfig, HssanConfig, HssanNetwork, HssanVariant, StageConfig};
use crate::utils::error::{HssanError, Result, ResultExt};

/// Leading bytes of every artifact
pub const ARTIFACT_MAGIC: [u8; 5] = *b"HSSAN";

/// Current envelope format version
pub const ARTIFACT_VERSION: u32 = 1;

type WeightsRecorder = BinBytesRecorder<FullPrecisionSettings>;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    magic: [u8; 5],
    version: u32,
    architecture: String,
    weights: Vec<u8>,
}

fn envelope_codec() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding()
}

/// One tagged custom layer of the architecture block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerBlock {
    /// Registry tag, e.g. `"AttentionGate"`
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub config: Value,
}

impl LayerBlock {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            config,
        }
    }
}

/// Architecture block stored alongside the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub variant: HssanVariant,
    /// (height, width, channels)
    pub input_shape: [usize; 3],
    pub num_classes: usize,
    pub dropout: f64,
    pub num_params: usize,
    /// Custom layers in forward order: block, gate, block, gate, ...
    pub layers: Vec<LayerBlock>,
}

impl ArtifactDescriptor {
    /// Describe a built network
    pub fn describe<B: Backend>(network: &HssanNetwork<B>) -> Result<Self> {
        let config = network.config();
        let summary = network.summary()?;

        let mut layers = Vec::new();
        for (i, stage) in network.stage_configs().iter().enumerate() {
            layers.push(LayerBlock::new(
                MULTI_BRANCH_TAG,
                format!("stage{}_block", i + 1),
                serde_json::to_value(&stage.branches)?,
            ));
            layers.push(LayerBlock::new(
                ATTENTION_GATE_TAG,
                format!("stage{}_gate", i + 1),
                serde_json::to_value(&stage.attention)?,
            ));
        }

        Ok(Self {
            name: summary.name.to_string(),
            variant: config.variant,
            input_shape: config.input_shape(),
            num_classes: config.num_classes,
            dropout: config.dropout,
            num_params: summary.total_params,
            layers,
        })
    }

    /// Rebuild the network configuration, resolving every layer through `registry`
    pub fn network_config(&self, registry: &LayerRegistry) -> Result<HssanConfig> {
        let mut stages = Vec::new();
        let mut pending: Option<(String, BranchConfig)> = None;

        for block in &self.layers {
            match registry.resolve(block)? {
                CustomLayer::MultiBranch(branches) => {
                    if let Some((name, _)) = pending.replace((block.name.clone(), branches)) {
                        return Err(HssanError::Serialization(format!(
                            "layer '{}' is not followed by an attention gate",
                            name
                        )));
                    }
                }
                CustomLayer::Attention(attention) => {
                    let (_, branches) = pending.take().ok_or_else(|| {
                        HssanError::Serialization(format!(
                            "attention gate '{}' has no preceding multi-branch block",
                            block.name
                        ))
                    })?;
                    stages.push(StageConfig::new(branches, attention));
                }
            }
        }
        if let Some((name, _)) = pending {
            return Err(HssanError::Serialization(format!(
                "layer '{}' is not followed by an attention gate",
                name
            )));
        }

        let [height, width, channels] = self.input_shape;
        Ok(HssanConfig::new()
            .with_num_classes(self.num_classes)
            .with_variant(self.variant)
            .with_height(height)
            .with_width(width)
            .with_channels(channels)
            .with_dropout(self.dropout)
            .with_stages(stages))
    }
}

/// Write `network` to a single artifact file at `path`
pub fn save_artifact<B: Backend>(network: &HssanNetwork<B>, path: &Path) -> Result<()> {
    let descriptor = ArtifactDescriptor::describe(network)?;
    let envelope = ArtifactEnvelope {
        magic: ARTIFACT_MAGIC,
        version: ARTIFACT_VERSION,
        architecture: serde_json::to_string_pretty(&descriptor)?,
        weights: encode_weights(network)?,
    };
    let bytes = envelope_codec().serialize(&envelope)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes)?;

    info!(
        path = %path.display(),
        variant = %descriptor.variant,
        params = descriptor.num_params,
        bytes = bytes.len(),
        "saved model artifact"
    );
    Ok(())
}

/// Read an artifact written by [`save_artifact`]
///
/// Every failure is reported as [`HssanError::ArtifactLoad`] for `path`.
pub fn load_artifact<B: Backend>(
    path: &Path,
    registry: &LayerRegistry,
    device: &B::Device,
) -> Result<HssanNetwork<B>> {
    read_artifact(path, registry, device).map_err(|err| match err {
        HssanError::ArtifactLoad { .. } => err,
        other => HssanError::artifact(path, other.to_string()),
    })
}

fn read_artifact<B: Backend>(
    path: &Path,
    registry: &LayerRegistry,
    device: &B::Device,
) -> Result<HssanNetwork<B>> {
    let bytes = fs::read(path).artifact_context(path)?;
    if !bytes.starts_with(&ARTIFACT_MAGIC) {
        return Err(HssanError::artifact(path, "not an HSSAN model artifact"));
    }

    // Length prefixes can never claim more than the file holds
    let envelope: ArtifactEnvelope = envelope_codec()
        .with_limit(bytes.len() as u64)
        .deserialize(&bytes)?;
    if envelope.version != ARTIFACT_VERSION {
        return Err(HssanError::artifact(
            path,
            format!(
                "unsupported artifact version {} (expected {})",
                envelope.version, ARTIFACT_VERSION
            ),
        ));
    }

    let descriptor: ArtifactDescriptor = serde_json::from_str(&envelope.architecture)?;
    let network = descriptor.network_config(registry)?.init::<B>(device)?;
    let network = decode_weights(network, envelope.weights, device)?;

    let num_params = network.num_params();
    if num_params != descriptor.num_params {
        return Err(HssanError::artifact(
            path,
            format!(
                "architecture records {} parameters but the rebuilt network has {}",
                descriptor.num_params, num_params
            ),
        ));
    }

    debug!(
        path = %path.display(),
        variant = %descriptor.variant,
        layers = descriptor.layers.len(),
        params = num_params,
        "decoded model artifact"
    );
    Ok(network)
}

fn encode_weights<B: Backend>(network: &HssanNetwork<B>) -> Result<Vec<u8>> {
    let recorder = WeightsRecorder::default();
    let bytes = match network {
        HssanNetwork::Rgb(net) => Recorder::<B>::record(&recorder, net.clone().into_record(), ()),
        HssanNetwork::Spectral(net) => {
            Recorder::<B>::record(&recorder, net.clone().into_record(), ())
        }
    };
    bytes.map_err(|e| HssanError::Serialization(e.to_string()))
}

fn decode_weights<B: Backend>(
    network: HssanNetwork<B>,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<HssanNetwork<B>> {
    let recorder = WeightsRecorder::default();
    let weights_error = |e: burn::record::RecorderError| {
        HssanError::Serialization(format!("weights do not match the architecture: {}", e))
    };

    Ok(match network {
        HssanNetwork::Rgb(net) => {
            let record = Recorder::<B>::load(&recorder, bytes, device).map_err(weights_error)?;
            HssanNetwork::Rgb(net.load_record(record))
        }
        HssanNetwork::Spectral(net) => {
            let record = Recorder::<B>::load(&recorder, bytes, device).map_err(weights_error)?;
            HssanNetwork::Spectral(net.load_record(record))
        }
    })
}
