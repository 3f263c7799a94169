//! HSSAN Network Architecture
//!
//! Both variants feed a different stem into the same tail:
//!
//! - **RGB**: two Conv2d + MaxPool2d stages
//! - **Spectral-spatial**: the band axis becomes a depth axis, two Conv3d +
//!   3-D max-pool stages learn joint spectral-spatial features, then depth and
//!   channels are merged into a single channel axis
//! - **Tail**: multi-branch block + attention gate stages (max-pool between
//!   stages), global average pooling, dropout, dense classifier, softmax
//!
//! Inputs are channels-last `[batch, height, width, channels]`, matching the
//! preprocessed image tensors; everything inside runs channels-first.

use burn::{
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig, Conv3d, Conv3dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, PaddingConfig3d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::attention::AttentionGate;
use super::config::{
    HssanConfig, HssanVariant, LayerShape, StageConfig, RGB_STEM_FILTERS, SPECTRAL_STEM_FILTERS,
    SPECTRAL_STEM_KERNELS,
};
use super::inception::MultiBranchBlock;
use crate::utils::error::Result;

/// One multi-branch block and the attention gate that follows it
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    pub block: MultiBranchBlock<B>,
    pub gate: AttentionGate<B>,
}

impl<B: Backend> Stage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.gate.forward(self.block.forward(x))
    }
}

/// Build a stage reading `in_channels` channels
///
/// Called once per entry of [`HssanConfig::stages`], so both variants share a
/// single construction path for their stages.
pub fn build_stage<B: Backend>(
    in_channels: usize,
    config: &StageConfig,
    device: &B::Device,
) -> Result<Stage<B>> {
    config.validate()?;

    Ok(Stage {
        block: config.branches.init(in_channels, device)?,
        gate: config.attention.init(device)?,
    })
}

/// Stages, global pooling and classifier shared by both variants
#[derive(Module, Debug)]
pub struct HssanTail<B: Backend> {
    pub stages: Vec<Stage<B>>,
    pub stage_pool: MaxPool2d,
    pub global_pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub classifier: Linear<B>,
    config: Ignored<HssanConfig>,
}

impl<B: Backend> HssanTail<B> {
    fn new(in_channels: usize, config: &HssanConfig, device: &B::Device) -> Result<Self> {
        let mut stages = Vec::with_capacity(config.stages.len());
        let mut channels = in_channels;
        for stage in &config.stages {
            stages.push(build_stage(channels, stage, device)?);
            channels = stage.branches.output_channels();
        }

        Ok(Self {
            stages,
            stage_pool: pool_2x2(),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            classifier: LinearConfig::new(channels, config.num_classes).init(device),
            config: Ignored(config.clone()),
        })
    }

    /// [B, C, H, W] feature map -> [B, num_classes] probabilities
    fn forward(&self, mut x: Tensor<B, 4>) -> Tensor<B, 2> {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                x = self.stage_pool.forward(x);
            }
            x = stage.forward(x);
        }

        // Global pooling: [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.dropout.forward(x);
        softmax(self.classifier.forward(x), 1)
    }
}

fn pool_2x2() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

/// 2x2x2, stride-2 max pooling over [B, C, D, H, W] (odd extents are floored)
///
/// Pairs along depth are reduced at rank 5, then each depth slice goes through
/// a regular 2x2 pool. NdArray caps tensors at six dimensions.
pub fn max_pool3d_2x<B: Backend>(x: Tensor<B, 5>) -> Tensor<B, 5> {
    let [batch, channels, depth, height, width] = x.dims();
    let (d, h, w) = (depth / 2, height / 2, width / 2);
    let (height, width) = (h * 2, w * 2);

    let x = x
        .slice([0..batch, 0..channels, 0..d * 2, 0..height, 0..width])
        .reshape([batch * channels, d, 2, height, width])
        .max_dim(2)
        .reshape([batch * channels * d, 1, height, width]);

    pool_2x2().forward(x).reshape([batch, channels, d, h, w])
}

/// 2-D convolutional stem of the RGB variant
#[derive(Module, Debug)]
pub struct RgbStem<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub relu: Relu,
}

impl<B: Backend> RgbStem<B> {
    fn new(in_channels: usize, device: &B::Device) -> Self {
        let [f1, f2] = RGB_STEM_FILTERS;
        let conv = |c_in: usize, c_out: usize| {
            Conv2dConfig::new([c_in, c_out], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device)
        };

        Self {
            conv1: conv(in_channels, f1),
            conv2: conv(f1, f2),
            pool: pool_2x2(),
            relu: Relu::new(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.pool.forward(self.relu.forward(self.conv1.forward(x)));
        self.pool.forward(self.relu.forward(self.conv2.forward(x)))
    }
}

/// 3-D convolutional stem of the spectral-spatial variant
#[derive(Module, Debug)]
pub struct SpectralStem<B: Backend> {
    pub conv1: Conv3d<B>,
    pub conv2: Conv3d<B>,
    pub relu: Relu,
}

impl<B: Backend> SpectralStem<B> {
    fn new(device: &B::Device) -> Self {
        let [f1, f2] = SPECTRAL_STEM_FILTERS;
        let [k1, k2] = SPECTRAL_STEM_KERNELS;

        Self {
            conv1: Conv3dConfig::new([1, f1], [k1, k1, k1])
                .with_padding(PaddingConfig3d::Same)
                .init(device),
            conv2: Conv3dConfig::new([f1, f2], [k2, k2, k2])
                .with_padding(PaddingConfig3d::Same)
                .init(device),
            relu: Relu::new(),
        }
    }

    /// [B, bands, H, W] -> [B, depth' * filters, H', W']
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        // Bands become the depth axis of a single-channel volume: [B, 1, D, H, W]
        let x: Tensor<B, 5> = x.unsqueeze_dim(1);

        let x = max_pool3d_2x(self.relu.forward(self.conv1.forward(x)));
        let x = max_pool3d_2x(self.relu.forward(self.conv2.forward(x)));

        // Merge depth and channels, depth-major: [B, C, D, H, W] -> [B, D * C, H, W]
        let [batch, channels, depth, height, width] = x.dims();
        x.swap_dims(1, 2)
            .reshape([batch, depth * channels, height, width])
    }
}

/// RGB variant: 224 x 224 x 3 image -> class probabilities
#[derive(Module, Debug)]
pub struct HssanRgb<B: Backend> {
    pub stem: RgbStem<B>,
    pub tail: HssanTail<B>,
}

impl<B: Backend> HssanRgb<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.tail.forward(self.stem.forward(x))
    }
}

/// Spectral-spatial variant: hyperspectral cube -> class probabilities
#[derive(Module, Debug)]
pub struct HssanSpectral<B: Backend> {
    pub stem: SpectralStem<B>,
    pub tail: HssanTail<B>,
}

impl<B: Backend> HssanSpectral<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.tail.forward(self.stem.forward(x))
    }
}

/// A constructed HSSAN network of either variant
///
/// Cloning is cheap: parameters are reference counted, so clones share weights.
#[derive(Debug, Clone)]
pub enum HssanNetwork<B: Backend> {
    Spectral(HssanSpectral<B>),
    Rgb(HssanRgb<B>),
}

impl HssanConfig {
    /// Build the network described by this configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<HssanNetwork<B>> {
        self.validate()?;

        let network = match self.variant {
            HssanVariant::Rgb => HssanNetwork::Rgb(HssanRgb {
                stem: RgbStem::new(self.channels, device),
                tail: HssanTail::new(self.stem_channels(), self, device)?,
            }),
            HssanVariant::Spectral => HssanNetwork::Spectral(HssanSpectral {
                stem: SpectralStem::new(device),
                tail: HssanTail::new(self.stem_channels(), self, device)?,
            }),
        };

        tracing::debug!(
            variant = %self.variant,
            num_classes = self.num_classes,
            params = network.num_params(),
            "built HSSAN network"
        );

        Ok(network)
    }
}

impl<B: Backend> HssanNetwork<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch, height, width, channels]
    ///
    /// # Returns
    /// * Probability tensor of shape [batch, num_classes]; every row sums to 1
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        // Channels-last -> channels-first
        let x = x.permute([0, 3, 1, 2]);

        match self {
            HssanNetwork::Spectral(net) => net.forward(x),
            HssanNetwork::Rgb(net) => net.forward(x),
        }
    }

    pub fn variant(&self) -> HssanVariant {
        match self {
            HssanNetwork::Spectral(_) => HssanVariant::Spectral,
            HssanNetwork::Rgb(_) => HssanVariant::Rgb,
        }
    }

    pub(crate) fn tail(&self) -> &HssanTail<B> {
        match self {
            HssanNetwork::Spectral(net) => &net.tail,
            HssanNetwork::Rgb(net) => &net.tail,
        }
    }

    /// Configuration this network was built from
    pub fn config(&self) -> &HssanConfig {
        &self.tail().config.0
    }

    /// Expected (height, width, channels) of a single input
    pub fn input_shape(&self) -> [usize; 3] {
        self.config().input_shape()
    }

    /// Width of the output probability vector
    pub fn num_classes(&self) -> usize {
        self.config().num_classes
    }

    /// Width of the final dense layer's weight matrix
    pub fn classifier_width(&self) -> usize {
        let [_, d_output] = self.tail().classifier.weight.dims();
        d_output
    }

    /// Total number of trainable parameters
    pub fn num_params(&self) -> usize {
        match self {
            HssanNetwork::Spectral(net) => net.num_params(),
            HssanNetwork::Rgb(net) => net.num_params(),
        }
    }

    /// Configuration of every stage, read back from the built modules
    pub fn stage_configs(&self) -> Vec<StageConfig> {
        self.tail()
            .stages
            .iter()
            .map(|stage| StageConfig::new(stage.block.config(), stage.gate.config()))
            .collect()
    }

    /// Layer-by-layer description of this network
    pub fn summary(&self) -> Result<NetworkSummary> {
        NetworkSummary::new(self.config(), self)
    }
}

/// Layer-by-layer output shapes plus the parameter count
#[derive(Debug, Clone)]
pub struct NetworkSummary {
    pub name: &'static str,
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerShape>,
    pub total_params: usize,
}

impl NetworkSummary {
    pub fn new<B: Backend>(config: &HssanConfig, network: &HssanNetwork<B>) -> Result<Self> {
        let layers = config.layer_shapes()?;

        Ok(Self {
            name: match config.variant {
                HssanVariant::Spectral => "HSSAN",
                HssanVariant::Rgb => "HSSAN_RGB",
            },
            input_shape: config.input_shape(),
            layers,
            total_params: network.num_params(),
        })
    }
}
