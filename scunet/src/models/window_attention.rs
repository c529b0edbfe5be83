//! # Window Multi-Head Self-Attention
//!
//! Self-attention restricted to non-overlapping `window_size x window_size`
//! windows of a `[batch, height, width, channels]` feature grid, with a learned
//! relative position bias. In [`WindowMode::Shifted`] the grid is cyclically
//! shifted by half a window before partitioning (and shifted back afterwards),
//! so successive blocks exchange information across window borders. The
//! window that receives content wrapped around from the opposite edge is
//! masked so that positions never attend across that seam.
//!
//! The mode is fixed at construction. Shifts, masks and bias indices are
//! derived from the configuration and the input shape only, never from tensor
//! values, so the forward pass traces to a static graph.
//!
//! ## Reference
//! - SCUNet: <https://arxiv.org/abs/2203.13278>
//! - Swin Transformer: <https://arxiv.org/abs/2103.14030>

use burn::{
    module::Param,
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};
use burn_extra_ops::{roll, trunc_normal};

use crate::error::{ScunetError, ScunetResult};

/// Whether attention windows are aligned to the grid or shifted by half a window.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum WindowMode {
    /// Regular windows (W-MSA).
    Plain,
    /// Windows shifted by `window_size / 2` with seam masking (SW-MSA).
    Shifted,
}

/// Configuration for [`WindowAttention`].
///
/// `head_dim` must divide `input_dim`; the number of heads is
/// `input_dim / head_dim`.
#[derive(Config, Debug)]
pub struct WindowAttentionConfig {
    input_dim: usize,
    output_dim: usize,
    head_dim: usize,
    window_size: usize,
    #[config(default = "WindowMode::Plain")]
    mode: WindowMode,
}

impl WindowAttentionConfig {
    /// Checks the divisibility and window constraints without allocating.
    pub fn validate(&self) -> ScunetResult<()> {
        if self.head_dim == 0 || self.input_dim % self.head_dim != 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "head dimension {} must divide the input dimension {}",
                    self.head_dim, self.input_dim
                ),
            });
        }
        if self.window_size == 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: "window size must be at least 1".to_string(),
            });
        }
        if self.mode == WindowMode::Shifted && self.window_size < 2 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "shifted windows need a window size of at least 2, got {}",
                    self.window_size
                ),
            });
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ScunetResult<WindowAttention<B>> {
        self.validate()?;

        let num_heads = self.input_dim / self.head_dim;
        let table_side = 2 * self.window_size - 1;

        // Stored head-major, [heads, 2*ws - 1, 2*ws - 1], as in the checkpoints.
        let relative_position_params = Param::from_tensor(trunc_normal(
            Tensor::zeros([num_heads, table_side, table_side], device),
            0.0,
            0.02,
            -2.0,
            2.0,
        ));

        let shift_size = match self.mode {
            WindowMode::Plain => 0,
            WindowMode::Shifted => self.window_size / 2,
        };

        Ok(WindowAttention {
            head_dim: self.head_dim,
            num_heads,
            window_size: self.window_size,
            shift_size,
            scale: (self.head_dim as f64).powf(-0.5),
            embedding_layer: LinearConfig::new(self.input_dim, 3 * self.input_dim)
                .with_bias(true)
                .init(device),
            relative_position_params,
            linear: LinearConfig::new(self.input_dim, self.output_dim).init(device),
        })
    }
}

/// Window-based multi-head self-attention with relative position bias.
///
/// # Shapes
/// - input: `[batch, height, width, input_dim]`, height and width divisible by
///   the window size
/// - output: `[batch, height, width, output_dim]`
#[derive(Module, Debug)]
pub struct WindowAttention<B: Backend> {
    head_dim: usize,
    num_heads: usize,
    window_size: usize,
    shift_size: usize,
    scale: f64,
    embedding_layer: Linear<B>,
    relative_position_params: Param<Tensor<B, 3>>,
    linear: Linear<B>,
}

impl<B: Backend> WindowAttention<B> {
    pub const fn mode(&self) -> WindowMode {
        if self.shift_size > 0 {
            WindowMode::Shifted
        } else {
            WindowMode::Plain
        }
    }

    pub const fn window_size(&self) -> usize {
        self.window_size
    }

    pub const fn num_heads(&self) -> usize {
        self.num_heads
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, h, w, _] = x.dims();
        self.debug_check_input(&x);
        let device = x.device();

        let windows = window_partition(self.shift(x), self.window_size);
        let mask = self.attention_mask(h / self.window_size, w / self.window_size, &device);
        let attended = self.attend(windows, mask);

        let x = window_reverse(attended, self.window_size, h, w);
        let x = self.linear.forward(x);

        self.unshift(x)
    }

    /// Softmax attention weights `[batch, num_windows, heads, ws*ws, ws*ws]`
    /// that [`forward`](Self::forward) would apply to `x`.
    pub fn attention_probs(&self, x: Tensor<B, 4>) -> Tensor<B, 5> {
        let [_, h, w, _] = x.dims();
        self.debug_check_input(&x);
        let device = x.device();

        let windows = window_partition(self.shift(x), self.window_size);
        let mask = self.attention_mask(h / self.window_size, w / self.window_size, &device);
        let (q, k, _) = self.qkv(windows);

        self.probabilities(q, k, mask)
    }

    /// Seam mask for a grid of `h_windows x w_windows` windows, or `None` in
    /// plain mode.
    pub fn attention_mask(
        &self,
        h_windows: usize,
        w_windows: usize,
        device: &B::Device,
    ) -> Option<Tensor<B, 3, Bool>> {
        (self.shift_size > 0).then(|| {
            seam_mask(
                h_windows,
                w_windows,
                self.window_size,
                self.shift_size,
                device,
            )
        })
    }

    /// Relative position bias `[heads, ws*ws, ws*ws]` gathered from the learned table.
    pub fn relative_position_bias(&self) -> Tensor<B, 3> {
        let table = self.relative_position_params.val();
        let [heads, rows, cols] = table.dims();
        let n = self.window_size * self.window_size;

        let index = relative_position_index(self.window_size);
        let index = Tensor::<B, 1, Int>::from_data(TensorData::new(index, [n * n]), &table.device());

        table
            .reshape([heads, rows * cols])
            .select(1, index)
            .reshape([heads, n, n])
    }

    fn debug_check_input(&self, x: &Tensor<B, 4>) {
        let [_, h, w, c] = x.dims();
        debug_assert!(
            h % self.window_size == 0 && w % self.window_size == 0,
            "grid {h}x{w} is not divisible by window size {}",
            self.window_size
        );
        debug_assert_eq!(
            c,
            self.num_heads * self.head_dim,
            "channel count does not match heads x head_dim"
        );
    }

    fn shift(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.shift_size == 0 {
            return x;
        }
        let shift = self.shift_size as i64;
        roll(x, &[-shift, -shift], &[1, 2])
    }

    fn unshift(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if self.shift_size == 0 {
            return x;
        }
        let shift = self.shift_size as i64;
        roll(x, &[shift, shift], &[1, 2])
    }

    /// `[batch, num_windows, ws*ws, c]` -> `[batch, num_windows, ws*ws, c]`
    fn attend(&self, windows: Tensor<B, 4>, mask: Option<Tensor<B, 3, Bool>>) -> Tensor<B, 4> {
        let [b, nw, n, c] = windows.dims();
        let (q, k, v) = self.qkv(windows);

        self.probabilities(q, k, mask)
            .matmul(v)
            .swap_dims(2, 3)
            .reshape([b, nw, n, c])
    }

    /// Splits the combined projection into q, k, v of shape
    /// `[batch, num_windows, heads, ws*ws, head_dim]`.
    fn qkv(&self, windows: Tensor<B, 4>) -> (Tensor<B, 5>, Tensor<B, 5>, Tensor<B, 5>) {
        let [b, nw, n, _] = windows.dims();
        let qkv: Tensor<B, 6> = self
            .embedding_layer
            .forward(windows)
            .reshape([b, nw, n, 3, self.num_heads, self.head_dim])
            .permute([3, 0, 1, 4, 2, 5]);

        let part = |i: usize| -> Tensor<B, 5> {
            qkv.clone()
                .narrow(0, i, 1)
                .reshape([b, nw, self.num_heads, n, self.head_dim])
        };

        (part(0), part(1), part(2))
    }

    fn probabilities(
        &self,
        q: Tensor<B, 5>,
        k: Tensor<B, 5>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 5> {
        let [b, nw, heads, n, _] = q.dims();

        let attn = (q * self.scale).matmul(k.swap_dims(3, 4));
        let attn = attn + self.relative_position_bias().reshape([1, 1, heads, n, n]);

        let attn = match mask {
            Some(mask) => attn.mask_fill(
                mask.reshape([1, nw, 1, n, n]).expand([b, nw, heads, n, n]),
                f32::NEG_INFINITY,
            ),
            None => attn,
        };

        softmax(attn, 4)
    }
}

/// `[batch, h, w, c]` -> `[batch, (h / ws) * (w / ws), ws * ws, c]`, windows in
/// row-major order.
pub fn window_partition<B: Backend>(x: Tensor<B, 4>, window_size: usize) -> Tensor<B, 4> {
    let [b, h, w, c] = x.dims();
    let (hw, ww) = (h / window_size, w / window_size);

    x.reshape([b, hw, window_size, ww, window_size, c])
        .permute([0, 1, 3, 2, 4, 5])
        .reshape([b, hw * ww, window_size * window_size, c])
}

/// Inverse of [`window_partition`].
pub fn window_reverse<B: Backend>(
    windows: Tensor<B, 4>,
    window_size: usize,
    h: usize,
    w: usize,
) -> Tensor<B, 4> {
    let [b, _, _, c] = windows.dims();
    let (hw, ww) = (h / window_size, w / window_size);

    windows
        .reshape([b, hw, ww, window_size, window_size, c])
        .permute([0, 1, 3, 2, 4, 5])
        .reshape([b, h, w, c])
}

/// Flattened index into the `[2*ws - 1, 2*ws - 1]` bias table for every
/// (query, key) pair of a window, row-major over `ws*ws x ws*ws`.
pub fn relative_position_index(window_size: usize) -> Vec<i64> {
    let ws = window_size as i64;
    let side = 2 * ws - 1;
    let n = ws * ws;

    (0..n)
        .flat_map(|q| (0..n).map(move |k| (q, k)))
        .map(|(q, k)| {
            let d_row = q / ws - k / ws + ws - 1;
            let d_col = q % ws - k % ws + ws - 1;
            d_row * side + d_col
        })
        .collect()
}

/// Boolean seam mask `[h_windows * w_windows, ws*ws, ws*ws]`, `true` where
/// attention is suppressed.
///
/// Only the last window in row-major order is masked. Inside it, with
/// `s = window_size - shift`, a query and a key are separated when they lie on
/// different sides of `s` along the row axis or along the column axis.
pub fn seam_mask<B: Backend>(
    h_windows: usize,
    w_windows: usize,
    window_size: usize,
    shift: usize,
    device: &B::Device,
) -> Tensor<B, 3, Bool> {
    let n = window_size * window_size;
    let num_windows = h_windows * w_windows;
    let s = window_size - shift;

    let mut data = vec![false; num_windows * n * n];
    let last = (num_windows - 1) * n * n;
    for q in 0..n {
        for k in 0..n {
            let across_rows = (q / window_size < s) != (k / window_size < s);
            let across_cols = (q % window_size < s) != (k % window_size < s);
            data[last + q * n + k] = across_rows || across_cols;
        }
    }

    Tensor::from_data(TensorData::new(data, [num_windows, n, n]), device)
}
