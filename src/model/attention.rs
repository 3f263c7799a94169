//! Channel attention gate (squeeze-and-excitation)
//!
//! The gate summarises every channel with its global spatial average, passes
//! that descriptor through a two-layer bottleneck and rescales each channel of
//! the input by the resulting sigmoid weight. Output shape equals input shape.

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use crate::utils::error::{HssanError, Result as HssanResult};

/// Configuration for an [`AttentionGate`]
#[derive(Config, Debug, PartialEq)]
pub struct AttentionGateConfig {
    /// Number of channels of the gated feature map
    pub filters: usize,

    /// Bottleneck reduction ratio
    #[config(default = "16")]
    pub ratio: usize,
}

impl AttentionGateConfig {
    /// Width of the bottleneck layer (floor division, at least one unit)
    pub fn hidden_units(&self) -> usize {
        (self.filters / self.ratio.max(1)).max(1)
    }

    /// Check the construction preconditions
    pub fn validate(&self) -> HssanResult<()> {
        if self.filters == 0 {
            return Err(HssanError::Config(
                "attention gate filters must be positive".to_string(),
            ));
        }
        if self.ratio == 0 {
            return Err(HssanError::Config(
                "attention gate ratio must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Initialize a new gate
    pub fn init<B: Backend>(&self, device: &B::Device) -> HssanResult<AttentionGate<B>> {
        self.validate()?;

        let hidden = self.hidden_units();

        Ok(AttentionGate {
            squeeze: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            excite: LinearConfig::new(self.filters, hidden).init(device),
            restore: LinearConfig::new(hidden, self.filters).init(device),
            relu: Relu::new(),
            filters: self.filters,
            ratio: self.ratio,
        })
    }
}

/// Squeeze-and-excitation channel gate
#[derive(Module, Debug)]
pub struct AttentionGate<B: Backend> {
    pub squeeze: AdaptiveAvgPool2d,
    pub excite: Linear<B>,
    pub restore: Linear<B>,
    pub relu: Relu,
    filters: usize,
    ratio: usize,
}

impl<B: Backend> AttentionGate<B> {
    /// Per-channel gate values in (0, 1)
    ///
    /// # Arguments
    /// * `x` - Feature map of shape [batch, filters, height, width]
    ///
    /// # Returns
    /// * Gate tensor of shape [batch, filters]
    pub fn scores(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, channels, _, _] = x.dims();

        // Squeeze: [B, C, H, W] -> [B, C]
        let descriptor = self.squeeze.forward(x).reshape([batch, channels]);

        // Excite: C -> C/ratio -> C
        let hidden = self.relu.forward(self.excite.forward(descriptor));
        sigmoid(self.restore.forward(hidden))
    }

    /// Rescale every channel of `x` by its gate value
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, channels, _, _] = x.dims();
        let gate = self.scores(x.clone()).reshape([batch, channels, 1, 1]);

        x.mul(gate)
    }

    /// Configuration this gate was built from
    pub fn config(&self) -> AttentionGateConfig {
        AttentionGateConfig::new(self.filters).with_ratio(self.ratio)
    }

    pub fn filters(&self) -> usize {
        self.filters
    }
}
