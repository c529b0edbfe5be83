//! # DropPath
//!
//! Stochastic depth: while training, the residual branch of a whole sample is
//! zeroed with probability `drop_prob`, and surviving samples are rescaled by
//! `1 / (1 - drop_prob)`. Outside training the module is the identity.

use burn::{prelude::*, tensor::Distribution};

/// Configuration for the [`DropPath`] module.
#[derive(Config, Debug)]
pub struct DropPathConfig {
    /// Probability of dropping a sample's branch.
    #[config(default = "0.0")]
    pub drop_prob: f64,
    /// Whether the module is in training mode.
    #[config(default = "false")]
    pub training: bool,
    /// Whether to rescale surviving samples by the keep probability.
    #[config(default = "true")]
    pub scale_by_keep: bool,
}

impl DropPathConfig {
    /// Initializes a new [`DropPath`] module.
    pub const fn init(&self) -> DropPath {
        DropPath {
            drop_prob: self.drop_prob,
            training: self.training,
            scale_by_keep: self.scale_by_keep,
        }
    }
}

/// Per-sample stochastic depth.
#[derive(Module, Clone, Debug, Default)]
pub struct DropPath {
    drop_prob: f64,
    training: bool,
    scale_by_keep: bool,
}

impl DropPath {
    /// Drop probability this module was configured with.
    pub const fn drop_prob(&self) -> f64 {
        self.drop_prob
    }

    /// # Shapes
    /// - input: `[batch_size, ...]`
    /// - output: `[batch_size, ...]`
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if !self.training || self.drop_prob == 0.0 {
            return x;
        }
        let keep_prob = 1.0 - self.drop_prob;

        // One Bernoulli draw per sample, broadcast over the remaining dims.
        let mut mask_shape = [1; D];
        mask_shape[0] = x.dims()[0];
        let keep = Tensor::random(mask_shape, Distribution::Bernoulli(keep_prob), &x.device());

        if self.scale_by_keep {
            x * keep / keep_prob
        } else {
            x * keep
        }
    }
}
