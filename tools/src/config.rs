//! Configuration shared by the command line tools.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::config::Config;
use scunet_burn::{Precision, ScunetConfig};
use serde::{Deserialize, Serialize};

/// Settings for one checkpoint conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Architecture of the checkpoint.
    pub model: ScunetConfig,
    /// PyTorch state dict to read.
    pub input_path: PathBuf,
    /// Burn record to write; the `.mpk` extension is enforced.
    pub output_path: PathBuf,
    /// Store weights as f16.
    #[serde(default)]
    pub half: bool,
}

impl ConverterConfig {
    pub const fn precision(&self) -> Precision {
        if self.half {
            Precision::Half
        } else {
            Precision::Full
        }
    }

    /// Path the recorder actually writes to.
    pub fn record_path(&self) -> PathBuf {
        self.output_path.with_extension("mpk")
    }
}

/// Resolves the model architecture from an optional JSON file and an
/// optional channel override. Without a file the released checkpoint layout
/// is assumed.
pub fn resolve_model_config(path: Option<&Path>, in_nc: Option<usize>) -> Result<ScunetConfig> {
    let config = match path {
        Some(path) => ScunetConfig::load(path)
            .with_context(|| format!("Failed to read model config: {}", path.display()))?,
        None => ScunetConfig::released(3),
    };
    let config = match in_nc {
        Some(in_nc) => config.with_in_nc(in_nc),
        None => config,
    };

    config
        .validate()
        .context("Invalid model configuration")?;
    Ok(config)
}
