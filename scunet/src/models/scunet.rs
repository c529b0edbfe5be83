//! # SCUNet
//!
//! Swin-Conv-UNet for blind image denoising. A three level U-Net whose stages
//! are stacks of [`ConvTransBlock`]s, joined by 2x2 strided convolutions on
//! the way down and 2x2 transposed convolutions on the way up, with additive
//! skip connections.
//!
//! ## Reference
//! - Zhang et al., "Practical Blind Denoising via Swin-Conv-UNet and Data
//!   Synthesis": <https://arxiv.org/abs/2203.13278>

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
};
use burn_extra_ops::reflect_pad;

use super::{
    conv_trans_block::{ConvTransBlock, ConvTransBlockConfig},
    window_attention::WindowMode,
};
use crate::{
    config::{ScunetConfig, PAD_MULTIPLE},
    error::{ScunetError, ScunetResult},
};

/// Encoder stage: blocks at constant width, then a stride-2 conv doubling the channels.
#[derive(Module, Debug)]
pub struct DownStage<B: Backend> {
    blocks: Vec<ConvTransBlock<B>>,
    downsample: Conv2d<B>,
}

impl<B: Backend> DownStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = forward_blocks(&self.blocks, x);
        self.downsample.forward(x)
    }
}

/// Decoder stage: a stride-2 transposed conv halving the channels, then blocks.
#[derive(Module, Debug)]
pub struct UpStage<B: Backend> {
    upsample: ConvTranspose2d<B>,
    blocks: Vec<ConvTransBlock<B>>,
}

impl<B: Backend> UpStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.upsample.forward(x);
        forward_blocks(&self.blocks, x)
    }
}

fn forward_blocks<B: Backend>(blocks: &[ConvTransBlock<B>], x: Tensor<B, 4>) -> Tensor<B, 4> {
    blocks.iter().fold(x, |x, block| block.forward(x))
}

/// Per-stage layout: channel width relative to `dim` and resolution divisor.
const STAGES: [(usize, usize); 7] = [(1, 1), (2, 2), (4, 4), (8, 8), (4, 4), (2, 2), (1, 1)];

impl ScunetConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ScunetResult<Scunet<B>> {
        self.validate()?;

        let rates = self.drop_path_rates();
        let mut offset = 0;
        let mut stages = Vec::with_capacity(STAGES.len());
        for (&depth, &(width, divisor)) in self.depths.iter().zip(STAGES.iter()) {
            let stage_rates = &rates[offset..offset + depth];
            offset += depth;
            stages.push(self.stage_blocks(
                self.dim * width,
                stage_rates,
                self.input_resolution / divisor,
                device,
            )?);
        }

        let mut stages = stages.into_iter();
        let mut next = || stages.next().unwrap_or_default();
        let (down1, down2, down3, body, up3, up2, up1) =
            (next(), next(), next(), next(), next(), next(), next());

        let dim = self.dim;
        let conv3x3 = |channels: [usize; 2]| {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device)
        };
        let down = |blocks, channels: usize| DownStage {
            blocks,
            downsample: Conv2dConfig::new([channels, 2 * channels], [2, 2])
                .with_stride([2, 2])
                .with_bias(false)
                .init(device),
        };
        let up = |blocks, channels: usize| UpStage {
            upsample: ConvTranspose2dConfig::new([2 * channels, channels], [2, 2])
                .with_stride([2, 2])
                .with_bias(false)
                .init(device),
            blocks,
        };

        tracing::debug!(
            in_nc = self.in_nc,
            dim,
            depths = ?self.depths,
            head_dim = self.head_dim,
            window_size = self.window_size,
            "initialized SCUNet"
        );

        Ok(Scunet {
            in_nc: self.in_nc,
            m_head: conv3x3([self.in_nc, dim]),
            m_down1: down(down1, dim),
            m_down2: down(down2, 2 * dim),
            m_down3: down(down3, 4 * dim),
            m_body: body,
            m_up3: up(up3, 4 * dim),
            m_up2: up(up2, 2 * dim),
            m_up1: up(up1, dim),
            m_tail: conv3x3([dim, self.in_nc]),
        })
    }

    /// Blocks of one stage with `channels` split evenly between the conv and
    /// transformer branches. Modes alternate plain, shifted, plain, ...
    fn stage_blocks<B: Backend>(
        &self,
        channels: usize,
        rates: &[f64],
        resolution: usize,
        device: &B::Device,
    ) -> ScunetResult<Vec<ConvTransBlock<B>>> {
        rates
            .iter()
            .enumerate()
            .map(|(i, &rate)| {
                let mode = if i % 2 == 0 {
                    WindowMode::Plain
                } else {
                    WindowMode::Shifted
                };
                ConvTransBlockConfig::new(
                    channels / 2,
                    channels / 2,
                    self.head_dim,
                    self.window_size,
                )
                .with_drop_path(rate)
                .with_mode(mode)
                .with_input_resolution(Some(resolution))
                .init(device)
            })
            .collect()
    }
}

/// SCUNet denoising network.
///
/// # Shapes
/// - input: `[batch, in_nc, height, width]`, any height and width for which
///   reflection padding to a multiple of 64 is possible
/// - output: same as input
#[derive(Module, Debug)]
pub struct Scunet<B: Backend> {
    in_nc: usize,
    m_head: Conv2d<B>,
    m_down1: DownStage<B>,
    m_down2: DownStage<B>,
    m_down3: DownStage<B>,
    m_body: Vec<ConvTransBlock<B>>,
    m_up3: UpStage<B>,
    m_up2: UpStage<B>,
    m_up1: UpStage<B>,
    m_tail: Conv2d<B>,
}

impl<B: Backend> Scunet<B> {
    pub const fn in_nc(&self) -> usize {
        self.in_nc
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> ScunetResult<Tensor<B, 4>> {
        let [_, channels, h, w] = x.dims();
        if channels != self.in_nc {
            return Err(ScunetError::InvalidTensorShape {
                expected: format!("{} channels", self.in_nc),
                actual: format!("{:?}", x.dims()),
            });
        }

        let x0 = pad_to_multiple(x)?;

        let x1 = self.m_head.forward(x0);
        let x2 = self.m_down1.forward(x1.clone());
        let x3 = self.m_down2.forward(x2.clone());
        let x4 = self.m_down3.forward(x3.clone());
        let x = forward_blocks(&self.m_body, x4.clone());
        let x = self.m_up3.forward(x + x4);
        let x = self.m_up2.forward(x + x3);
        let x = self.m_up1.forward(x + x2);
        let x = self.m_tail.forward(x + x1);

        Ok(x.narrow(2, 0, h).narrow(3, 0, w))
    }
}

/// Reflection-pads height and width on the bottom and right up to the next
/// multiple of [`PAD_MULTIPLE`].
fn pad_to_multiple<B: Backend>(x: Tensor<B, 4>) -> ScunetResult<Tensor<B, 4>> {
    let [_, _, h, w] = x.dims();
    let pad_h = h.next_multiple_of(PAD_MULTIPLE) - h;
    let pad_w = w.next_multiple_of(PAD_MULTIPLE) - w;

    if h == 0 || w == 0 || pad_h >= h || pad_w >= w {
        return Err(ScunetError::InvalidTensorShape {
            expected: format!(
                "height and width large enough to reflect-pad to a multiple of {PAD_MULTIPLE}"
            ),
            actual: format!("{:?}", x.dims()),
        });
    }

    let x = reflect_pad(x, 2, 0, pad_h);
    Ok(reflect_pad(x, 3, 0, pad_w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray;

    fn small_config() -> ScunetConfig {
        ScunetConfig::new()
            .with_dim(8)
            .with_head_dim(4)
            .with_window_size(4)
            .with_depths([2, 1, 1, 1, 1, 1, 2])
            .with_input_resolution(64)
    }

    #[test]
    fn test_forward_preserves_unaligned_size() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::random([1, 3, 40, 48], Distribution::Uniform(0.0, 1.0), &device);

        let output = model.forward(x).unwrap();

        assert_eq!(output.dims(), [1, 3, 40, 48]);
    }

    #[test]
    fn test_grayscale_model_accepts_one_channel() {
        let device = Default::default();
        let model = small_config()
            .with_in_nc(1)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::random([2, 1, 64, 64], Distribution::Uniform(0.0, 1.0), &device);

        assert_eq!(model.forward(x).unwrap().dims(), [2, 1, 64, 64]);
    }

    #[test]
    fn test_wrong_channel_count_is_rejected() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::zeros([1, 1, 64, 64], &device);

        assert!(matches!(
            model.forward(x),
            Err(ScunetError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn test_too_small_input_cannot_be_reflected() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device).unwrap();
        let x = Tensor::zeros([1, 3, 20, 64], &device);

        match model.forward(x) {
            Err(ScunetError::InvalidTensorShape { actual, .. }) => {
                assert!(actual.contains("20"));
            }
            _ => panic!("Expected InvalidTensorShape error"),
        }
    }

    #[test]
    fn test_stage_modes_alternate_starting_plain() {
        let model = small_config()
            .init::<TestBackend>(&Default::default())
            .unwrap();

        let modes: Vec<_> = model.m_down1.blocks.iter().map(|b| b.mode()).collect();
        assert_eq!(modes, vec![WindowMode::Plain, WindowMode::Shifted]);

        let modes: Vec<_> = model.m_up1.blocks.iter().map(|b| b.mode()).collect();
        assert_eq!(modes, vec![WindowMode::Plain, WindowMode::Shifted]);
    }

    #[test]
    fn test_deep_stages_fall_back_to_plain_windows() {
        // Resolution 32 with window 8: down3 sees 8x8 and the body 4x4.
        let config = ScunetConfig::new()
            .with_dim(8)
            .with_head_dim(4)
            .with_depths([2; 7])
            .with_input_resolution(32);
        let model = config.init::<TestBackend>(&Default::default()).unwrap();

        assert_eq!(model.m_down2.blocks[1].mode(), WindowMode::Shifted);
        assert_eq!(model.m_down3.blocks[1].mode(), WindowMode::Plain);
        assert_eq!(model.m_body[1].mode(), WindowMode::Plain);
        assert_eq!(model.m_up3.blocks[1].mode(), WindowMode::Plain);
        assert_eq!(model.m_up2.blocks[1].mode(), WindowMode::Shifted);
    }

    #[test]
    fn test_padding_reflects_bottom_and_right() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1, Int>::arange(0..40 * 60, &device)
            .float()
            .reshape([1, 1, 40, 60]);

        let padded = pad_to_multiple(x.clone()).unwrap();
        assert_eq!(padded.dims(), [1, 1, 64, 64]);

        // Row 40 mirrors row 38; column 60 mirrors column 58.
        padded
            .clone()
            .slice([0..1, 0..1, 40..41, 0..60])
            .into_data()
            .assert_eq(&x.clone().slice([0..1, 0..1, 38..39, 0..60]).into_data(), true);
        padded
            .slice([0..1, 0..1, 0..40, 60..61])
            .into_data()
            .assert_eq(&x.slice([0..1, 0..1, 0..40, 58..59]).into_data(), true);
    }
}
