//! # Model Architectures
//!
//! - `window_attention`: shifted-window multi-head self-attention.
//! - `block`: pre-norm transformer block around the attention.
//! - `conv_trans_block`: parallel convolution and transformer branches.
//! - `scunet`: the U-Net assembling those blocks.
//! - `denoiser`: inference wrapper with normalization, tiling and fallback.

pub mod block;
pub mod conv_trans_block;
pub mod denoiser;
pub mod scunet;
pub mod window_attention;

pub use block::{Mlp, MlpConfig, SwinBlock, SwinBlockConfig};
pub use conv_trans_block::{ConvBlock, ConvBlockConfig, ConvTransBlock, ConvTransBlockConfig};
pub use denoiser::{Denoised, Denoiser, DenoiserRecord};
pub use scunet::{DownStage, Scunet, ScunetRecord, UpStage};
pub use window_attention::{WindowAttention, WindowAttentionConfig, WindowMode};
