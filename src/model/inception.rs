//! Multi-branch (inception-style) feature block
//!
//! Four parallel paths look at the same input with different receptive
//! fields and are concatenated along the channel axis:
//!
//! | branch | path                              |
//! |--------|-----------------------------------|
//! | A      | 1x1 conv                          |
//! | B      | 1x1 reduce -> 3x3 conv            |
//! | C      | 1x1 reduce -> 5x5 conv            |
//! | D      | 3x3 max-pool (stride 1) -> 1x1 conv |
//!
//! Every path keeps the input's height and width, which is what makes the
//! concatenation valid. [`BranchConfig::validate`] rejects any pooling window
//! that would break this before a single weight is allocated.

use burn::{
    config::Config,
    module::{Ignored, Module},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::utils::error::{HssanError, Result as HssanResult};

/// Channel counts for one [`MultiBranchBlock`]
#[derive(Config, Debug, PartialEq)]
pub struct BranchConfig {
    /// Branch A output channels
    pub filters_1x1: usize,
    /// Branch B bottleneck channels
    pub filters_3x3_reduce: usize,
    /// Branch B output channels
    pub filters_3x3: usize,
    /// Branch C bottleneck channels
    pub filters_5x5_reduce: usize,
    /// Branch C output channels
    pub filters_5x5: usize,
    /// Branch D output channels
    pub pool_proj: usize,

    /// Branch D pooling window
    #[config(default = "3")]
    pub pool_kernel: usize,

    /// Branch D pooling stride, must stay 1
    #[config(default = "1")]
    pub pool_stride: usize,
}

impl BranchConfig {
    /// Build a config from the six channel counts, in the usual inception order
    pub fn from_filters(filters: [usize; 6]) -> Self {
        let [f1, f3r, f3, f5r, f5, pool] = filters;
        Self::new(f1, f3r, f3, f5r, f5, pool)
    }

    /// Number of channels produced by the concatenation
    pub fn output_channels(&self) -> usize {
        self.filters_1x1 + self.filters_3x3 + self.filters_5x5 + self.pool_proj
    }

    pub fn validate(&self) -> HssanResult<()> {
        let counts = [
            ("filters_1x1", self.filters_1x1),
            ("filters_3x3_reduce", self.filters_3x3_reduce),
            ("filters_3x3", self.filters_3x3),
            ("filters_5x5_reduce", self.filters_5x5_reduce),
            ("filters_5x5", self.filters_5x5),
            ("pool_proj", self.pool_proj),
        ];
        if let Some((name, _)) = counts.iter().find(|(_, count)| *count == 0) {
            return Err(HssanError::Config(format!(
                "multi-branch block {} must be positive",
                name
            )));
        }

        // Any other stride shrinks branch D and the concatenation would fail at runtime
        if self.pool_stride != 1 {
            return Err(HssanError::Config(format!(
                "multi-branch pooling stride must be 1 to preserve spatial size, got {}",
                self.pool_stride
            )));
        }
        if self.pool_kernel % 2 == 0 {
            return Err(HssanError::Config(format!(
                "multi-branch pooling kernel must be odd for same padding, got {}",
                self.pool_kernel
            )));
        }

        Ok(())
    }

    /// Initialize a block reading `in_channels` input channels
    pub fn init<B: Backend>(
        &self,
        in_channels: usize,
        device: &B::Device,
    ) -> HssanResult<MultiBranchBlock<B>> {
        self.validate()?;
        if in_channels == 0 {
            return Err(HssanError::Config(
                "multi-branch block needs at least one input channel".to_string(),
            ));
        }

        Ok(MultiBranchBlock {
            branch_1x1: same_conv(in_channels, self.filters_1x1, 1, device),
            branch_3x3_reduce: same_conv(in_channels, self.filters_3x3_reduce, 1, device),
            branch_3x3: same_conv(self.filters_3x3_reduce, self.filters_3x3, 3, device),
            branch_5x5_reduce: same_conv(in_channels, self.filters_5x5_reduce, 1, device),
            branch_5x5: same_conv(self.filters_5x5_reduce, self.filters_5x5, 5, device),
            branch_pool: MaxPool2dConfig::new([self.pool_kernel, self.pool_kernel])
                .with_strides([1, 1])
                .with_padding(PaddingConfig2d::Same)
                .init(),
            branch_pool_proj: same_conv(in_channels, self.pool_proj, 1, device),
            relu: Relu::new(),
            config: Ignored(self.clone()),
        })
    }
}

fn same_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_padding(PaddingConfig2d::Same)
        .init(device)
}

/// Inception-style block with four parallel branches
#[derive(Module, Debug)]
pub struct MultiBranchBlock<B: Backend> {
    pub branch_1x1: Conv2d<B>,
    pub branch_3x3_reduce: Conv2d<B>,
    pub branch_3x3: Conv2d<B>,
    pub branch_5x5_reduce: Conv2d<B>,
    pub branch_5x5: Conv2d<B>,
    pub branch_pool: MaxPool2d,
    pub branch_pool_proj: Conv2d<B>,
    pub relu: Relu,
    config: Ignored<BranchConfig>,
}

impl<B: Backend> MultiBranchBlock<B> {
    /// Forward pass through the block
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch, in_channels, height, width]
    ///
    /// # Returns
    /// * Tensor of shape [batch, out_channels, height, width]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let a = self.relu.forward(self.branch_1x1.forward(x.clone()));

        let b = self.relu.forward(self.branch_3x3_reduce.forward(x.clone()));
        let b = self.relu.forward(self.branch_3x3.forward(b));

        let c = self.relu.forward(self.branch_5x5_reduce.forward(x.clone()));
        let c = self.relu.forward(self.branch_5x5.forward(c));

        let d = self.branch_pool.forward(x);
        let d = self.relu.forward(self.branch_pool_proj.forward(d));

        Tensor::cat(vec![a, b, c, d], 1)
    }

    pub fn out_channels(&self) -> usize {
        self.config.output_channels()
    }

    /// Configuration this block was built from
    pub fn config(&self) -> BranchConfig {
        self.config.0.clone()
    }
}
