//! Inference wrapper around [`Scunet`]: input normalization, tiling of large
//! images, output clamping, alpha passthrough and a fallback to the untouched
//! image when the network produces garbage.

use std::ops::Range;

use burn::prelude::*;
use image::DynamicImage;

use super::scunet::Scunet;
use crate::{
    config::DenoiserConfig,
    error::{ScunetError, ScunetResult},
    image::{alpha_channel, attach_alpha, image_to_tensor, tensor_to_image},
};

impl DenoiserConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ScunetResult<Denoiser<B>> {
        self.build(self.model.init(device)?)
    }

    /// Wraps an already built (typically loaded) model with these settings.
    pub fn build<B: Backend>(&self, model: Scunet<B>) -> ScunetResult<Denoiser<B>> {
        self.validate()?;

        Ok(Denoiser {
            model,
            tile_size: self.tile_size,
            tile_overlap: self.tile_overlap,
        })
    }
}

/// Outcome of [`Denoiser::denoise_image`].
#[derive(Debug, Clone)]
pub enum Denoised {
    /// The network output.
    Restored(DynamicImage),
    /// The input, returned because the network output was not finite.
    Unchanged(DynamicImage),
}

impl Denoised {
    pub const fn is_restored(&self) -> bool {
        matches!(self, Self::Restored(_))
    }

    pub fn into_image(self) -> DynamicImage {
        match self {
            Self::Restored(image) | Self::Unchanged(image) => image,
        }
    }
}

#[derive(Module, Debug)]
pub struct Denoiser<B: Backend> {
    model: Scunet<B>,
    tile_size: usize,
    tile_overlap: usize,
}

impl<B: Backend> Denoiser<B> {
    pub const fn model(&self) -> &Scunet<B> {
        &self.model
    }

    /// Divides every entry above 1.0 by 255, leaving the rest as is.
    pub fn normalize(x: Tensor<B, 4>) -> Tensor<B, 4> {
        let above_unit = x.clone().greater_elem(1.0);
        x.clone().mask_where(above_unit, x / 255.0)
    }

    /// Runs the network in one pass and clamps the result to `[0, 1]`.
    ///
    /// Returns [`ScunetError::NonFiniteOutput`] when the raw output holds NaN
    /// or infinity; the check runs before clamping, which would hide NaN.
    pub fn forward(&self, x: Tensor<B, 4>) -> ScunetResult<Tensor<B, 4>> {
        let output = self.model.forward(Self::normalize(x))?;

        let non_finite: i64 = output
            .clone()
            .is_nan()
            .bool_or(output.clone().is_inf())
            .int()
            .sum()
            .into_scalar()
            .elem();
        if non_finite > 0 {
            return Err(ScunetError::NonFiniteOutput);
        }

        Ok(output.clamp(0.0, 1.0))
    }

    /// Like [`forward`](Self::forward), but splits inputs larger than the
    /// tile size into overlapping tiles and stitches the results.
    pub fn forward_tiled(&self, x: Tensor<B, 4>) -> ScunetResult<Tensor<B, 4>> {
        let [batch, channels, height, width] = x.dims();
        let rows = tile_spans(height, self.tile_size, self.tile_overlap);
        let cols = tile_spans(width, self.tile_size, self.tile_overlap);

        if rows.len() == 1 && cols.len() == 1 {
            return self.forward(x);
        }
        tracing::debug!(height, width, rows = rows.len(), cols = cols.len(), "denoising in tiles");

        let mut output = Tensor::zeros([batch, channels, height, width], &x.device());
        for row in &rows {
            for col in &cols {
                let tile = x.clone().slice([
                    0..batch,
                    0..channels,
                    row.read.clone(),
                    col.read.clone(),
                ]);
                let restored = self.forward(tile)?.slice([
                    0..batch,
                    0..channels,
                    row.keep_in_tile(),
                    col.keep_in_tile(),
                ]);
                output = output.slice_assign(
                    [0..batch, 0..channels, row.keep.clone(), col.keep.clone()],
                    restored,
                );
            }
        }

        Ok(output)
    }

    /// Denoises a single image, tiling it when it is larger than the tile
    /// size. An alpha channel bypasses the network and is re-attached.
    ///
    /// A non-finite network output yields [`Denoised::Unchanged`] with the
    /// original image; every other failure is returned as an error.
    pub fn denoise_image(
        &self,
        image: &DynamicImage,
        device: &B::Device,
    ) -> ScunetResult<Denoised> {
        let input = image_to_tensor::<B>(image, self.model.in_nc(), device)?;
        let alpha = alpha_channel(image);

        let restored = self
            .forward_tiled(input)
            .and_then(tensor_to_image)
            .and_then(|restored| match &alpha {
                Some(alpha) => attach_alpha(restored, alpha),
                None => Ok(restored),
            });

        settle(restored, image)
    }
}

/// One tile along an axis: the pixels fed to the network, and the sub-range
/// of them written to the output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TileSpan {
    read: Range<usize>,
    keep: Range<usize>,
}

impl TileSpan {
    fn keep_in_tile(&self) -> Range<usize> {
        self.keep.start - self.read.start..self.keep.end - self.read.start
    }
}

/// Splits `0..len` into tiles of `tile` pixels with a stride of
/// `tile - overlap`; the last tile is aligned to the end so that every tile
/// has full size. Neighbouring tiles split their shared pixels at the
/// midpoint, so the `keep` ranges partition `0..len`.
fn tile_spans(len: usize, tile: usize, overlap: usize) -> Vec<TileSpan> {
    if len <= tile {
        return vec![TileSpan {
            read: 0..len,
            keep: 0..len,
        }];
    }

    let stride = tile - overlap;
    let mut starts: Vec<usize> = (0..len - tile).step_by(stride).collect();
    starts.push(len - tile);

    let boundaries: Vec<usize> = starts
        .windows(2)
        .map(|pair| (pair[1] + pair[0] + tile) / 2)
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let keep_start = if i == 0 { 0 } else { boundaries[i - 1] };
            let keep_end = boundaries.get(i).copied().unwrap_or(len);
            TileSpan {
                read: start..start + tile,
                keep: keep_start..keep_end,
            }
        })
        .collect()
}

fn settle(restored: ScunetResult<DynamicImage>, original: &DynamicImage) -> ScunetResult<Denoised> {
    match restored {
        Ok(image) => Ok(Denoised::Restored(image)),
        Err(ScunetError::NonFiniteOutput) => {
            tracing::warn!(
                width = original.width(),
                height = original.height(),
                "denoiser produced non-finite values, returning the input unchanged"
            );
            Ok(Denoised::Unchanged(original.clone()))
        }
        Err(e) => Err(e),
    }
}
