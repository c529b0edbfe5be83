//! Parallel convolution and window-transformer block.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::{
    block::{SwinBlock, SwinBlockConfig},
    window_attention::WindowMode,
};
use crate::error::ScunetResult;

#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    channels: usize,
}

impl ConvBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let conv = || {
            Conv2dConfig::new([self.channels, self.channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };

        ConvBlock {
            conv1: conv(),
            relu: Relu::new(),
            conv2: conv(),
        }
    }
}

/// Two bias-free 3x3 convolutions with a ReLU in between.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv1: Conv2d<B>,
    relu: Relu,
    conv2: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.relu.forward(x);

        self.conv2.forward(x)
    }
}

/// Configuration for [`ConvTransBlock`].
#[derive(Config, Debug)]
pub struct ConvTransBlockConfig {
    conv_dim: usize,
    trans_dim: usize,
    head_dim: usize,
    window_size: usize,
    #[config(default = "0.0")]
    drop_path: f64,
    #[config(default = "WindowMode::Plain")]
    mode: WindowMode,
    #[config(default = "None")]
    input_resolution: Option<usize>,
}

impl ConvTransBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ScunetResult<ConvTransBlock<B>> {
        let channels = self.conv_dim + self.trans_dim;
        let pointwise = || Conv2dConfig::new([channels, channels], [1, 1]).init(device);

        let trans_block = SwinBlockConfig::new(
            self.trans_dim,
            self.trans_dim,
            self.head_dim,
            self.window_size,
        )
        .with_drop_path(self.drop_path)
        .with_mode(self.mode.clone())
        .with_input_resolution(self.input_resolution)
        .init(device)?;

        Ok(ConvTransBlock {
            conv_dim: self.conv_dim,
            trans_dim: self.trans_dim,
            conv1_1: pointwise(),
            conv1_2: pointwise(),
            conv_block: ConvBlockConfig::new(self.conv_dim).init(device),
            trans_block,
        })
    }
}

/// Splits channels between a residual conv branch and a [`SwinBlock`] branch,
/// fuses them with a 1x1 convolution and adds the result to the input.
///
/// # Shapes
/// - input: `[batch, conv_dim + trans_dim, height, width]`
/// - output: same as input
#[derive(Module, Debug)]
pub struct ConvTransBlock<B: Backend> {
    conv_dim: usize,
    trans_dim: usize,
    conv1_1: Conv2d<B>,
    conv1_2: Conv2d<B>,
    conv_block: ConvBlock<B>,
    trans_block: SwinBlock<B>,
}

impl<B: Backend> ConvTransBlock<B> {
    pub fn mode(&self) -> WindowMode {
        self.trans_block.mode()
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mixed = self.conv1_1.forward(x.clone());
        let conv_x = mixed.clone().narrow(1, 0, self.conv_dim);
        let trans_x = mixed.narrow(1, self.conv_dim, self.trans_dim);

        let conv_x = self.conv_block.forward(conv_x.clone()) + conv_x;

        // The transformer branch works channels-last.
        let trans_x = self
            .trans_block
            .forward(trans_x.permute([0, 2, 3, 1]))
            .permute([0, 3, 1, 2]);

        x + self.conv1_2.forward(Tensor::cat(vec![conv_x, trans_x], 1))
    }
}
