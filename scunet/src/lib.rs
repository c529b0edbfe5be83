//! # SCUNet for Burn
//!
//! Swin-Conv-UNet blind image denoising built on Burn, centred on a
//! shifted-window multi-head self-attention layer.
//!
//! ```no_run
//! use burn::backend::NdArray;
//! use scunet_burn::{image::load_image, DenoiserConfig, Precision, ScunetConfig};
//!
//! # fn main() -> Result<(), scunet_burn::ScunetError> {
//! let device = Default::default();
//! let config = ScunetConfig::released(3);
//! let model = scunet_burn::weights::load_record(
//!     config.init::<NdArray>(&device)?,
//!     "scunet_color.mpk".as_ref(),
//!     Precision::Full,
//!     &device,
//! )?;
//!
//! let denoiser = DenoiserConfig::new().with_model(config).build(model)?;
//! let denoised = denoiser.denoise_image(&load_image("noisy.png")?, &device)?;
//! denoised.into_image().save("clean.png").ok();
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod image;
mod models;
pub mod weights;

pub use config::*;
pub use error::{ScunetError, ScunetResult};
pub use models::*;
pub use weights::Precision;
