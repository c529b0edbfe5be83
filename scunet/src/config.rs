//! Model configuration.
//!
//! [`ScunetConfig`] mirrors the constructor arguments of the released SCUNet
//! checkpoints and can be saved to or loaded from JSON through Burn's
//! [`Config`] trait.

use burn::prelude::*;

use crate::error::{ScunetError, ScunetResult};

/// Spatial size the network pads its input to a multiple of.
pub const PAD_MULTIPLE: usize = 64;

/// Number of stride-2 downsampling stages.
pub const DOWNSAMPLE_STAGES: u32 = 3;

/// Number of stages: three down, one body, three up.
pub const STAGE_COUNT: usize = 7;

/// Architecture hyperparameters for [`Scunet`](crate::Scunet).
#[derive(Config, Debug)]
pub struct ScunetConfig {
    /// Image channels: 1 for grayscale, 3 for color.
    #[config(default = "3")]
    pub in_nc: usize,
    /// Blocks per stage: down1, down2, down3, body, up3, up2, up1.
    #[config(default = "[2, 2, 2, 2, 2, 2, 2]")]
    pub depths: [usize; STAGE_COUNT],
    /// Channel width of the first stage.
    #[config(default = "64")]
    pub dim: usize,
    #[config(default = "32")]
    pub head_dim: usize,
    #[config(default = "8")]
    pub window_size: usize,
    /// Upper end of the stochastic depth schedule. Kept so that training
    /// configurations load unchanged; the crate is inference only and its
    /// blocks never drop paths.
    #[config(default = "0.0")]
    pub drop_path_rate: f64,
    /// Training resolution, used to disable shifting at stages where the
    /// feature map fits in one window.
    #[config(default = "256")]
    pub input_resolution: usize,
}

impl ScunetConfig {
    /// Configuration of the released `scunet_color_real_psnr` style checkpoints.
    pub fn released(in_nc: usize) -> Self {
        Self::new().with_in_nc(in_nc).with_depths([4; STAGE_COUNT])
    }

    pub fn validate(&self) -> ScunetResult<()> {
        if self.in_nc != 1 && self.in_nc != 3 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!("in_nc must be 1 or 3, got {}", self.in_nc),
            });
        }

        if self.dim < 2 || self.dim % 2 != 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!("dim must be a positive even number, got {}", self.dim),
            });
        }

        // The narrowest transformer branch has dim / 2 channels; wider ones are multiples.
        if self.head_dim == 0 || (self.dim / 2) % self.head_dim != 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "head_dim {} must divide dim / 2 = {}",
                    self.head_dim,
                    self.dim / 2
                ),
            });
        }

        let deepest = PAD_MULTIPLE / 2usize.pow(DOWNSAMPLE_STAGES);
        if self.window_size == 0 || deepest % self.window_size != 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "window_size {} must divide the body resolution {deepest}",
                    self.window_size
                ),
            });
        }

        if !(0.0..1.0).contains(&self.drop_path_rate) {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!("drop_path_rate must be in [0, 1), got {}", self.drop_path_rate),
            });
        }

        if self.input_resolution == 0 {
            return Err(ScunetError::InvalidConfiguration {
                reason: "input_resolution must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Total number of `ConvTransBlock`s.
    pub fn total_blocks(&self) -> usize {
        self.depths.iter().sum()
    }

    /// Stochastic depth rate for every block, linearly spaced from 0 to
    /// `drop_path_rate`.
    pub fn drop_path_rates(&self) -> Vec<f64> {
        let total = self.total_blocks();
        match total {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => (0..total)
                .map(|i| self.drop_path_rate * i as f64 / (total - 1) as f64)
                .collect(),
        }
    }
}

/// Configuration for [`Denoiser`](crate::Denoiser).
///
/// Images larger than `tile_size` on either side are processed as a grid of
/// `tile_size` tiles that overlap their neighbours by at least `tile_overlap`
/// pixels. Each output pixel is taken from the tile whose overlap midpoint
/// puts it furthest from a tile border.
#[derive(Config, Debug)]
pub struct DenoiserConfig {
    #[config(default = "ScunetConfig::new()")]
    pub model: ScunetConfig,
    #[config(default = "1200")]
    pub tile_size: usize,
    #[config(default = "32")]
    pub tile_overlap: usize,
}

impl DenoiserConfig {
    pub fn validate(&self) -> ScunetResult<()> {
        self.model.validate()?;

        // Every tile must survive the reflection padding to PAD_MULTIPLE.
        if self.tile_size < PAD_MULTIPLE {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "tile_size must be at least {PAD_MULTIPLE}, got {}",
                    self.tile_size
                ),
            });
        }

        if self.tile_overlap >= self.tile_size {
            return Err(ScunetError::InvalidConfiguration {
                reason: format!(
                    "tile_overlap {} must be smaller than tile_size {}",
                    self.tile_overlap, self.tile_size
                ),
            });
        }

        Ok(())
    }
}
