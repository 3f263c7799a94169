//! Model Configuration
//!
//! Hyperparameters of both HSSAN variants, and the shape algebra that decides
//! whether a configuration can actually be built.
//!
//! ## Shapes
//!
//! RGB (224 x 224 x 3):
//! ```text
//! conv 3x3 (32) + pool  -> 112 x 112 x 32
//! conv 3x3 (64) + pool  ->  56 x  56 x 64
//! stage 1               ->  56 x  56 x 288
//! pool                  ->  28 x  28 x 288
//! stage 2               ->  28 x  28 x 480
//! global pool + dense   ->  num_classes
//! ```
//!
//! Spectral-spatial (224 x 224 x 150 bands):
//! ```text
//! conv3d 5x5x5 (16) + pool3d -> 112 x 112 x 75 x 16
//! conv3d 3x3x3 (32) + pool3d ->  56 x  56 x 37 x 32
//! merge depth and channels   ->  56 x  56 x 1184
//! shared tail as above
//! ```

use burn::config::Config;
use serde::{Deserialize, Serialize};

use super::attention::AttentionGateConfig;
use super::inception::BranchConfig;
use crate::utils::error::{HssanError, Result as HssanResult};

/// Default spatial resolution expected by both variants
pub const DEFAULT_IMAGE_SIZE: usize = 224;

/// Default number of spectral bands for the hyperspectral variant
pub const DEFAULT_SPECTRAL_BANDS: usize = 150;

/// Dropout applied before the classifier
pub const DEFAULT_DROPOUT: f64 = 0.4;

/// Reduction ratio of every attention gate
pub const DEFAULT_ATTENTION_RATIO: usize = 16;

/// Filter counts of the 2-D stem (RGB variant)
pub const RGB_STEM_FILTERS: [usize; 2] = [32, 64];

/// Filter counts of the 3-D stem (spectral variant)
pub const SPECTRAL_STEM_FILTERS: [usize; 2] = [16, 32];

/// Kernel sizes of the 3-D stem
pub const SPECTRAL_STEM_KERNELS: [usize; 2] = [5, 3];

/// Stage 1 branches: 1x1, 3x3 reduce, 3x3, 5x5 reduce, 5x5, pool projection
pub const STAGE1_FILTERS: [usize; 6] = [64, 64, 128, 32, 64, 32];

/// Stage 2 branches, roughly twice as wide as stage 1
pub const STAGE2_FILTERS: [usize; 6] = [128, 96, 192, 48, 96, 64];

/// Which input representation the network consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HssanVariant {
    /// Hyperspectral cube, processed by a 3-D convolutional stem
    Spectral,
    /// Standard three-channel image
    Rgb,
}

impl std::fmt::Display for HssanVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HssanVariant::Spectral => write!(f, "spectral"),
            HssanVariant::Rgb => write!(f, "rgb"),
        }
    }
}

impl std::str::FromStr for HssanVariant {
    type Err = HssanError;

    fn from_str(s: &str) -> HssanResult<Self> {
        match s.to_lowercase().as_str() {
            "spectral" | "hyperspectral" => Ok(HssanVariant::Spectral),
            "rgb" => Ok(HssanVariant::Rgb),
            other => Err(HssanError::Config(format!("unknown variant '{}'", other))),
        }
    }
}

/// One multi-branch block followed by its attention gate
#[derive(Config, Debug, PartialEq)]
pub struct StageConfig {
    pub branches: BranchConfig,
    pub attention: AttentionGateConfig,
}

impl StageConfig {
    /// Stage whose gate covers exactly the block's concatenated output
    pub fn gated(branches: BranchConfig, ratio: usize) -> Self {
        let attention = AttentionGateConfig::new(branches.output_channels()).with_ratio(ratio);
        Self::new(branches, attention)
    }

    pub fn validate(&self) -> HssanResult<()> {
        self.branches.validate()?;
        self.attention.validate()?;

        if self.attention.filters != self.branches.output_channels() {
            return Err(HssanError::Config(format!(
                "attention gate expects {} channels but the block produces {}",
                self.attention.filters,
                self.branches.output_channels()
            )));
        }
        Ok(())
    }
}

/// The two default stages shared by both variants
pub fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::gated(
            BranchConfig::from_filters(STAGE1_FILTERS),
            DEFAULT_ATTENTION_RATIO,
        ),
        StageConfig::gated(
            BranchConfig::from_filters(STAGE2_FILTERS),
            DEFAULT_ATTENTION_RATIO,
        ),
    ]
}

/// Configuration for an HSSAN network
#[derive(Config, Debug)]
pub struct HssanConfig {
    /// Number of output classes
    #[config(default = "102")]
    pub num_classes: usize,

    /// Input representation
    #[config(default = "HssanVariant::Rgb")]
    pub variant: HssanVariant,

    /// Input height in pixels
    #[config(default = "224")]
    pub height: usize,

    /// Input width in pixels
    #[config(default = "224")]
    pub width: usize,

    /// Input channels (3 for RGB, number of bands for spectral cubes)
    #[config(default = "3")]
    pub channels: usize,

    /// Dropout rate before the classifier
    #[config(default = "0.4")]
    pub dropout: f64,

    /// Multi-branch + attention stages of the shared tail
    #[config(default = "default_stages()")]
    pub stages: Vec<StageConfig>,
}

/// Output shape of one layer, `dims` in (channels, [depth,] height, width) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerShape {
    pub name: String,
    pub dims: Vec<usize>,
}

impl LayerShape {
    fn new(name: impl Into<String>, dims: &[usize]) -> Self {
        Self {
            name: name.into(),
            dims: dims.to_vec(),
        }
    }
}

impl HssanConfig {
    /// RGB variant at the default 224 x 224 resolution
    pub fn rgb(num_classes: usize) -> Self {
        Self::new().with_num_classes(num_classes)
    }

    /// Spectral-spatial variant for 224 x 224 x 150 cubes
    pub fn spectral(num_classes: usize) -> Self {
        Self::new()
            .with_num_classes(num_classes)
            .with_variant(HssanVariant::Spectral)
            .with_channels(DEFAULT_SPECTRAL_BANDS)
    }

    /// Input shape as (height, width, channels)
    pub fn input_shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }

    /// Channels entering the first stage
    pub fn stem_channels(&self) -> usize {
        match self.variant {
            HssanVariant::Rgb => RGB_STEM_FILTERS[1],
            HssanVariant::Spectral => self.channels / 4 * SPECTRAL_STEM_FILTERS[1],
        }
    }

    /// Channels leaving the last stage
    pub fn feature_channels(&self) -> usize {
        self.stages
            .last()
            .map(|stage| stage.branches.output_channels())
            .unwrap_or_else(|| self.stem_channels())
    }

    /// Check every construction precondition
    pub fn validate(&self) -> HssanResult<()> {
        self.layer_shapes().map(|_| ())
    }

    /// Trace the output shape of every layer, failing on the first impossible one
    pub fn layer_shapes(&self) -> HssanResult<Vec<LayerShape>> {
        if self.num_classes == 0 {
            return Err(HssanError::Config("num_classes must be positive".to_string()));
        }
        if self.height == 0 || self.width == 0 || self.channels == 0 {
            return Err(HssanError::Config(format!(
                "input shape must be positive, got {:?}",
                self.input_shape()
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(HssanError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.stages.is_empty() {
            return Err(HssanError::Config("at least one stage is required".to_string()));
        }
        if self.variant == HssanVariant::Rgb && self.channels != 3 {
            return Err(HssanError::Config(format!(
                "rgb variant expects 3 channels, got {}",
                self.channels
            )));
        }

        let mut shapes = Vec::new();
        let (mut h, mut w) = (self.height, self.width);

        match self.variant {
            HssanVariant::Rgb => {
                for (i, filters) in RGB_STEM_FILTERS.iter().enumerate() {
                    shapes.push(LayerShape::new(format!("conv2d_{}", i + 1), &[*filters, h, w]));
                    (h, w) = (pooled(h, "height")?, pooled(w, "width")?);
                    shapes.push(LayerShape::new(format!("pool2d_{}", i + 1), &[*filters, h, w]));
                }
            }
            HssanVariant::Spectral => {
                let mut d = self.channels;
                shapes.push(LayerShape::new("reshape_volume", &[1, d, h, w]));
                for (i, filters) in SPECTRAL_STEM_FILTERS.iter().enumerate() {
                    shapes.push(LayerShape::new(format!("conv3d_{}", i + 1), &[*filters, d, h, w]));
                    d = pooled(d, "spectral depth")?;
                    (h, w) = (pooled(h, "height")?, pooled(w, "width")?);
                    shapes.push(LayerShape::new(format!("pool3d_{}", i + 1), &[*filters, d, h, w]));
                }
                shapes.push(LayerShape::new("merge_spectral", &[self.stem_channels(), h, w]));
            }
        }

        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate()?;
            if i > 0 {
                (h, w) = (pooled(h, "height")?, pooled(w, "width")?);
                let channels = self.stages[i - 1].branches.output_channels();
                shapes.push(LayerShape::new(format!("stage{}_pool", i), &[channels, h, w]));
            }
            let channels = stage.branches.output_channels();
            shapes.push(LayerShape::new(format!("stage{}_block", i + 1), &[channels, h, w]));
            shapes.push(LayerShape::new(format!("stage{}_gate", i + 1), &[channels, h, w]));
        }

        let features = self.feature_channels();
        shapes.push(LayerShape::new("global_pool", &[features]));
        shapes.push(LayerShape::new("dropout", &[features]));
        shapes.push(LayerShape::new("classifier", &[self.num_classes]));

        Ok(shapes)
    }
}

/// Extent after a 2-wide, stride-2 pooling window (floor)
fn pooled(extent: usize, axis: &str) -> HssanResult<usize> {
    match extent / 2 {
        0 => Err(HssanError::Config(format!(
            "input {} too small: pooling would reduce {} to zero",
            axis, extent
        ))),
        reduced => Ok(reduced),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_of<'a>(shapes: &'a [LayerShape], name: &str) -> &'a [usize] {
        &shapes.iter().find(|s| s.name == name).unwrap().dims
    }

    #[test]
    fn test_default_config_is_rgb() {
        let config = HssanConfig::new();
        assert_eq!(config.num_classes, 102);
        assert_eq!(config.variant, HssanVariant::Rgb);
        assert_eq!(config.input_shape(), [224, 224, 3]);
        assert_eq!(config.dropout, DEFAULT_DROPOUT);
        assert_eq!(config.stages.len(), 2);
    }

    #[test]
    fn test_default_stage_gates_match_blocks() {
        let stages = default_stages();
        assert_eq!(stages[0].attention.filters, 288);
        assert_eq!(stages[1].attention.filters, 480);
        assert!(stages.iter().all(|s| s.attention.ratio == DEFAULT_ATTENTION_RATIO));
        // Second stage is the heavier one
        assert!(stages[1].branches.output_channels() > stages[0].branches.output_channels());
    }

    #[test]
    fn test_rgb_shapes() {
        let shapes = HssanConfig::rgb(102).layer_shapes().unwrap();
        assert_eq!(shape_of(&shapes, "pool2d_2"), &[64, 56, 56]);
        assert_eq!(shape_of(&shapes, "stage1_gate"), &[288, 56, 56]);
        assert_eq!(shape_of(&shapes, "stage1_pool"), &[288, 28, 28]);
        assert_eq!(shape_of(&shapes, "stage2_gate"), &[480, 28, 28]);
        assert_eq!(shape_of(&shapes, "classifier"), &[102]);
    }

    #[test]
    fn test_spectral_shapes() {
        let config = HssanConfig::spectral(102);
        let shapes = config.layer_shapes().unwrap();
        assert_eq!(shape_of(&shapes, "pool3d_1"), &[16, 75, 112, 112]);
        assert_eq!(shape_of(&shapes, "pool3d_2"), &[32, 37, 56, 56]);
        assert_eq!(shape_of(&shapes, "merge_spectral"), &[37 * 32, 56, 56]);
        assert_eq!(config.stem_channels(), 1184);
    }

    #[test]
    fn test_too_small_input_rejected() {
        let config = HssanConfig::rgb(10).with_height(4).with_width(4);
        assert!(matches!(config.validate(), Err(HssanError::Config(_))));

        let config = HssanConfig::spectral(10).with_channels(3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mismatched_gate_rejected() {
        let stage = StageConfig::new(
            BranchConfig::from_filters(STAGE1_FILTERS),
            AttentionGateConfig::new(100),
        );
        let config = HssanConfig::rgb(10).with_stages(vec![stage]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_classes_rejected() {
        assert!(HssanConfig::rgb(0).validate().is_err());
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("RGB".parse::<HssanVariant>().unwrap(), HssanVariant::Rgb);
        assert_eq!(
            "spectral".parse::<HssanVariant>().unwrap(),
            HssanVariant::Spectral
        );
        assert!("lidar".parse::<HssanVariant>().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = HssanConfig::spectral(17);
        let json = serde_json::to_string(&config).unwrap();
        let restored: HssanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.variant, HssanVariant::Spectral);
        assert_eq!(restored.num_classes, 17);
        assert_eq!(restored.stages, config.stages);
    }
}
