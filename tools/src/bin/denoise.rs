//! Denoises an image, or every image in a directory, with a converted model.
//!
//! ```bash
//! cargo run --release --bin denoise -- scunet_color.mpk noisy.png
//! cargo run --release --bin denoise -- scunet_gray_25.mpk scans/ --in-nc 1 --output clean/
//! ```

use std::{path::PathBuf, time::Instant};

use anyhow::{Context, Result};
use clap::Parser;
use scunet_burn::{image::load_image, weights::load_record, DenoiserConfig, Precision};
use scunet_tools::{
    collect_images, create_device, get_backend_name, init_logging, output_paths,
    resolve_model_config, SelectedBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Converted model record (.mpk)
    model: PathBuf,

    /// Image file or directory of images
    input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "denoised")]
    output: PathBuf,

    /// The record was saved in half precision
    #[arg(long)]
    half: bool,

    /// Image channels of the model: 1 (grayscale) or 3 (color)
    #[arg(long)]
    in_nc: Option<usize>,

    /// Model configuration (JSON); defaults to the released layout
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Images larger than this on either side are processed in tiles
    #[arg(long, default_value_t = 1200)]
    tile_size: usize,

    /// Minimum overlap between neighbouring tiles, in pixels
    #[arg(long, default_value_t = 32)]
    tile_overlap: usize,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let model_config = resolve_model_config(args.config.as_deref(), args.in_nc)?;
    let denoiser_config = DenoiserConfig::new()
        .with_model(model_config.clone())
        .with_tile_size(args.tile_size)
        .with_tile_overlap(args.tile_overlap);
    denoiser_config
        .validate()
        .context("Invalid tiling configuration")?;
    let precision = if args.half {
        Precision::Half
    } else {
        Precision::Full
    };

    let images = collect_images(&args.input)?;
    if images.is_empty() {
        anyhow::bail!("No images found in {}", args.input.display());
    }
    let destinations = output_paths(&images, &args.input, &args.output)?;

    let device = create_device();
    tracing::info!(
        backend = get_backend_name(),
        model = %args.model.display(),
        images = images.len(),
        "loading model"
    );

    let model = model_config
        .init::<SelectedBackend>(&device)
        .context("Failed to initialize model")?;
    let model = load_record(model, &args.model, precision, &device)
        .with_context(|| format!("Failed to load model: {}", args.model.display()))?;
    let denoiser = denoiser_config.build(model)?;

    let mut unchanged = 0;
    for (path, destination) in images.iter().zip(&destinations) {
        let start = Instant::now();
        let image = load_image(path)?;

        let denoised = denoiser
            .denoise_image(&image, &device)
            .with_context(|| format!("Failed to denoise {}", path.display()))?;
        if !denoised.is_restored() {
            unchanged += 1;
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
        denoised
            .into_image()
            .save(destination)
            .with_context(|| format!("Failed to save {}", destination.display()))?;

        tracing::info!(
            input = %path.display(),
            output = %destination.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "denoised"
        );
    }

    tracing::info!(
        processed = images.len(),
        unchanged,
        "finished"
    );
    Ok(())
}
