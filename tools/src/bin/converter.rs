//! Converts a PyTorch SCUNet checkpoint into a Burn record.
//!
//! ```bash
//! # Color model, released layout
//! cargo run --bin converter -- scunet_color_real_psnr.pth scunet_color.mpk
//!
//! # Grayscale model stored as f16, checked after conversion
//! cargo run --bin converter -- scunet_gray_25.pth scunet_gray_25.mpk --in-nc 1 --half --validate
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::prelude::*;
use clap::Parser;
use scunet_burn::weights::{load_pytorch_weights, load_record, save_record};
use scunet_tools::{
    create_device, get_backend_name, init_logging, resolve_model_config, ConverterConfig,
    SelectedBackend, SelectedDevice,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PyTorch checkpoint (.pth)
    input: PathBuf,

    /// Output Burn record (.mpk)
    output: PathBuf,

    /// Model configuration (JSON); defaults to the released layout
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Image channels of the checkpoint: 1 (grayscale) or 3 (color)
    #[arg(long)]
    in_nc: Option<usize>,

    /// Store weights in half precision
    #[arg(long)]
    half: bool,

    /// Reload the record and run a smoke test
    #[arg(long)]
    validate: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Force overwrite output file
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ConverterConfig {
        model: resolve_model_config(args.config.as_deref(), args.in_nc)?,
        input_path: args.input,
        output_path: args.output,
        half: args.half,
    };

    if !config.input_path.exists() {
        anyhow::bail!(
            "Input checkpoint does not exist: {}",
            config.input_path.display()
        );
    }

    if config.record_path().exists() && !args.force {
        anyhow::bail!(
            "Output file already exists: {}. Use --force to overwrite.",
            config.record_path().display()
        );
    }

    let device = create_device();
    tracing::info!(
        backend = get_backend_name(),
        input = %config.input_path.display(),
        output = %config.record_path().display(),
        precision = ?config.precision(),
        "converting checkpoint"
    );

    let model = load_pytorch_weights::<SelectedBackend>(&config.input_path, &config.model, &device)
        .context("Failed to import PyTorch weights")?;
    save_record(model, &config.output_path, config.precision())
        .context("Failed to save converted model")?;

    if args.validate {
        validate_conversion(&config, &device)?;
    }

    tracing::info!("model conversion completed");
    Ok(())
}

/// Reloads the written record and checks that a forward pass is well formed.
fn validate_conversion(config: &ConverterConfig, device: &SelectedDevice) -> Result<()> {
    let model = config
        .model
        .init::<SelectedBackend>(device)
        .context("Failed to initialize model for validation")?;
    let model = load_record(model, &config.record_path(), config.precision(), device)
        .context("Failed to load converted model")?;
    tracing::debug!("converted model loaded");

    let in_nc = config.model.in_nc;
    let input = Tensor::<SelectedBackend, 4>::random(
        [1, in_nc, 64, 64],
        burn::tensor::Distribution::Uniform(0.0, 1.0),
        device,
    );

    let output1 = model.forward(input.clone())?;
    let output2 = model.forward(input)?;
    compare_tensors(output1.clone(), output2, 1e-6)?;

    let shape = output1.dims();
    if shape != [1, in_nc, 64, 64] {
        anyhow::bail!("Expected output shape [1, {in_nc}, 64, 64], got {shape:?}");
    }

    let min_val: f32 = output1.clone().min().into_scalar().elem();
    let max_val: f32 = output1.clone().max().into_scalar().elem();
    let mean_val: f32 = output1.mean().into_scalar().elem();
    tracing::info!(min = min_val, max = max_val, mean = mean_val, "output statistics");

    if [min_val, max_val, mean_val].iter().any(|v| !v.is_finite()) {
        anyhow::bail!("Model output contains NaN or infinite values");
    }

    if (max_val - min_val).abs() < 1e-6 {
        tracing::warn!("model output has almost no variance, the weights may not have been mapped");
    }

    tracing::info!("validation completed");
    Ok(())
}

fn compare_tensors<B: Backend, const D: usize>(
    tensor1: Tensor<B, D>,
    tensor2: Tensor<B, D>,
    tolerance: f32,
) -> Result<()> {
    let diff = (tensor1 - tensor2).abs();
    let max_diff: f32 = diff.clone().max().into_scalar().elem();
    let mean_diff: f32 = diff.mean().into_scalar().elem();

    if max_diff > tolerance {
        anyhow::bail!(
            "Repeated forward passes differ: max difference {max_diff:.6} exceeds tolerance {tolerance:.6}"
        );
    }

    tracing::debug!(max_diff, mean_diff, "forward pass is deterministic");
    Ok(())
}
