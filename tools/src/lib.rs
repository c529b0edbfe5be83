//! Command line tools for SCUNet.
//!
//! - `converter`: PyTorch `.pth` checkpoint to Burn record, optionally f16.
//! - `denoise`: run a converted model over an image or a directory of images.
//!
//! ```bash
//! cargo run --release --bin converter -- scunet_color_real_psnr.pth scunet_color.mpk --validate
//! cargo run --release --bin denoise -- scunet_color.mpk photos/ --output clean/
//! ```

pub mod common;
pub mod config;

pub use common::{
    collect_images, create_device, get_backend_name, init_logging, output_paths, SelectedBackend,
    SelectedDevice,
};
pub use config::{resolve_model_config, ConverterConfig};
