//! Transformer block built around [`WindowAttention`].

use burn::{
    nn::{Gelu, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    prelude::*,
};
use burn_extra_ops::{DropPath, DropPathConfig};

use super::window_attention::{WindowAttention, WindowAttentionConfig, WindowMode};
use crate::error::{ScunetError, ScunetResult};

#[derive(Config, Debug)]
pub struct MlpConfig {
    in_features: usize,
    hidden_features: usize,
    out_features: usize,
}

impl MlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        Mlp {
            fc1: LinearConfig::new(self.in_features, self.hidden_features).init(device),
            act: Gelu::new(),
            fc2: LinearConfig::new(self.hidden_features, self.out_features).init(device),
        }
    }
}

/// Linear -> GELU -> Linear, applied over the last dimension.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    fc1: Linear<B>,
    act: Gelu,
    fc2: Linear<B>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward<const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let x = self.fc1.forward(x);
        let x = self.act.forward(x);

        self.fc2.forward(x)
    }
}

/// Configuration for [`SwinBlock`].
///
/// When `input_resolution` is not larger than `window_size` the whole feature
/// map fits in one window and the block falls back to [`WindowMode::Plain`].
#[derive(Config, Debug)]
pub struct SwinBlockConfig {
    input_dim: usize,
    output_dim: usize,
    head_dim: usize,
    window_size: usize,
    #[config(default = "0.0")]
    drop_path: f64,
    #[config(default = "WindowMode::Plain")]
    mode: WindowMode,
    #[config(default = "None")]
    input_resolution: Option<usize>,
}

impl SwinBlockConfig {
    pub fn effective_mode(&self) -> WindowMode {
        match self.input_resolution {
            Some(resolution) if resolution <= self.window_size => WindowMode::Plain,
            _ => self.mode.clone(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ScunetResult<SwinBlock<B>> {
        if self.input_dim != self.output_dim {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "residual block needs equal input and output dimensions, got {} and {}",
                    self.input_dim, self.output_dim
                ),
            });
        }

        let msa = WindowAttentionConfig::new(
            self.input_dim,
            self.input_dim,
            self.head_dim,
            self.window_size,
        )
        .with_mode(self.effective_mode())
        .init(device)?;

        Ok(SwinBlock {
            ln1: LayerNormConfig::new(self.input_dim).init(device),
            msa,
            // Inference only: the path is never dropped, whatever the rate.
            drop_path: DropPathConfig::new().with_drop_prob(self.drop_path).init(),
            ln2: LayerNormConfig::new(self.input_dim).init(device),
            mlp: MlpConfig::new(self.input_dim, 4 * self.input_dim, self.output_dim).init(device),
        })
    }
}

/// Pre-norm transformer block over a `[batch, height, width, channels]` grid.
///
/// `x + drop_path(msa(ln1(x)))` followed by `x + drop_path(mlp(ln2(x)))`.
#[derive(Module, Debug)]
pub struct SwinBlock<B: Backend> {
    ln1: LayerNorm<B>,
    msa: WindowAttention<B>,
    drop_path: DropPath,
    ln2: LayerNorm<B>,
    mlp: Mlp<B>,
}

impl<B: Backend> SwinBlock<B> {
    pub fn mode(&self) -> WindowMode {
        self.msa.mode()
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = x.clone();
        let x = self.msa.forward(self.ln1.forward(x));
        let x = shortcut + self.drop_path.forward(x);

        let shortcut = x.clone();
        let x = self.mlp.forward(self.ln2.forward(x));

        shortcut + self.drop_path.forward(x)
    }
}
