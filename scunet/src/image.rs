//! Conversion between `image` buffers and `[1, C, H, W]` tensors in `[0, 1]`.

use std::path::Path;

use burn::tensor::{backend::Backend, DType, Tensor, TensorData};
use image::{
    buffer::ConvertBuffer, DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, Rgb,
};

use crate::error::{ScunetError, ScunetResult};

/// Opens an image file.
pub fn load_image<P: AsRef<Path>>(path: P) -> ScunetResult<DynamicImage> {
    let path = path.as_ref();
    image::open(path).map_err(|e| ScunetError::ImageProcessing {
        reason: format!("failed to open '{}': {e}", path.display()),
    })
}

/// Converts an image to a `[1, in_nc, H, W]` tensor.
///
/// Alpha is not part of the tensor; take it with [`alpha_channel`] and put
/// it back with [`attach_alpha`]. `in_nc == 1` converts to luma, `in_nc == 3`
/// to RGB.
pub fn image_to_tensor<B: Backend>(
    image: &DynamicImage,
    in_nc: usize,
    device: &B::Device,
) -> ScunetResult<Tensor<B, 4>> {
    let (width, height) = image.dimensions();
    let (height, width) = (height as usize, width as usize);

    let buf = match in_nc {
        1 => image.to_luma32f().into_raw(),
        3 => image.to_rgb32f().into_raw(),
        _ => {
            return Err(ScunetError::ImageProcessing {
                reason: format!("unsupported channel count {in_nc} (supported: 1, 3)"),
            })
        }
    };

    let data = TensorData::new(buf, [height, width, in_nc]);
    let tensor = Tensor::<B, 3>::from_data(data, device);

    Ok(tensor.permute([2, 0, 1]).unsqueeze::<4>())
}

/// The 8-bit alpha plane of `image`, or `None` when it has no alpha channel.
pub fn alpha_channel(image: &DynamicImage) -> Option<GrayImage> {
    if !image.color().has_alpha() {
        return None;
    }

    let rgba = image.to_rgba8();
    Some(GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y).0[3]])
    }))
}

/// Returns `image` with `alpha` as its alpha channel: `LumaA8` for luma
/// images, `Rgba8` otherwise.
pub fn attach_alpha(image: DynamicImage, alpha: &GrayImage) -> ScunetResult<DynamicImage> {
    if image.dimensions() != alpha.dimensions() {
        return Err(ScunetError::InvalidTensorShape {
            expected: format!("{:?}", alpha.dimensions()),
            actual: format!("{:?}", image.dimensions()),
        });
    }

    let image = if let DynamicImage::ImageLuma8(luma) = image {
        let mut with_alpha = DynamicImage::ImageLuma8(luma).into_luma_alpha8();
        for (pixel, a) in with_alpha.pixels_mut().zip(alpha.pixels()) {
            pixel.0[1] = a.0[0];
        }
        DynamicImage::ImageLumaA8(with_alpha)
    } else {
        let mut with_alpha = image.into_rgba8();
        for (pixel, a) in with_alpha.pixels_mut().zip(alpha.pixels()) {
            pixel.0[3] = a.0[0];
        }
        DynamicImage::ImageRgba8(with_alpha)
    };

    Ok(image)
}

/// Converts a `[1, C, H, W]` tensor with `C` in `{1, 3}` back to an 8-bit image.
///
/// Values outside `[0, 1]` are saturated.
pub fn tensor_to_image<B: Backend>(tensor: Tensor<B, 4>) -> ScunetResult<DynamicImage> {
    let [batch, channels, height, width] = tensor.dims();
    if batch != 1 || !matches!(channels, 1 | 3) {
        return Err(ScunetError::InvalidTensorShape {
            expected: "[1, 1 | 3, height, width]".to_string(),
            actual: format!("{:?}", tensor.dims()),
        });
    }

    let data = tensor
        .clamp(0.0, 1.0)
        .squeeze::<3>(0)
        .permute([1, 2, 0])
        .into_data()
        .convert_dtype(DType::F32)
        .to_vec::<f32>()
        .map_err(|e| ScunetError::ImageProcessing {
            reason: format!("{e:?}"),
        })?;

    let (width, height) = (width as u32, height as u32);
    let buffer_error = || ScunetError::ImageProcessing {
        reason: format!("tensor data does not fit a {width}x{height}x{channels} buffer"),
    };

    let image = if channels == 1 {
        let buffer = ImageBuffer::<Luma<f32>, _>::from_raw(width, height, data)
            .ok_or_else(buffer_error)?;
        let buffer: ImageBuffer<Luma<u8>, Vec<u8>> = buffer.convert();
        DynamicImage::ImageLuma8(buffer)
    } else {
        let buffer = ImageBuffer::<Rgb<f32>, _>::from_raw(width, height, data)
            .ok_or_else(buffer_error)?;
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> = buffer.convert();
        DynamicImage::ImageRgb8(buffer)
    };

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgba, RgbaImage};

    type TestBackend = NdArray;

    #[test]
    fn test_rgba_tensor_holds_color_only() {
        let mut rgba = RgbaImage::new(4, 2);
        rgba.put_pixel(1, 0, Rgba([255, 0, 51, 7]));
        let image = DynamicImage::ImageRgba8(rgba);

        let tensor = image_to_tensor::<TestBackend>(&image, 3, &Default::default()).unwrap();

        assert_eq!(tensor.dims(), [1, 3, 2, 4]);
        let pixel = tensor.slice([0..1, 0..3, 0..1, 1..2]).reshape([3]);
        pixel.into_data().assert_approx_eq::<f32>(
            &TensorData::from([1.0f32, 0.0, 0.2]),
            burn::tensor::Tolerance::absolute(1e-6),
        );
    }

    #[test]
    fn test_alpha_survives_tensor_round_trip() {
        let device = Default::default();
        let mut rgba = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        rgba.put_pixel(1, 0, Rgba([255, 0, 51, 7]));
        rgba.put_pixel(2, 1, Rgba([0, 0, 0, 0]));
        let image = DynamicImage::ImageRgba8(rgba);

        let alpha = alpha_channel(&image).unwrap();
        let tensor = image_to_tensor::<TestBackend>(&image, 3, &device).unwrap();
        let restored = attach_alpha(tensor_to_image(tensor).unwrap(), &alpha).unwrap();

        let restored = restored.as_rgba8().unwrap();
        assert_eq!(restored.get_pixel(1, 0).0, [255, 0, 51, 7]);
        assert_eq!(restored.get_pixel(2, 1).0[3], 0);
        assert_eq!(restored.get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_luma_output_gets_luma_alpha() {
        let luma = DynamicImage::new_luma8(2, 2);
        let alpha = GrayImage::from_pixel(2, 2, Luma([128]));

        let restored = attach_alpha(luma, &alpha).unwrap();

        let restored = restored.as_luma_alpha8().unwrap();
        assert!(restored.pixels().all(|p| p.0 == [0, 128]));
    }

    #[test]
    fn test_opaque_formats_have_no_alpha() {
        assert!(alpha_channel(&DynamicImage::new_rgb8(2, 2)).is_none());
    }

    #[test]
    fn test_mismatched_alpha_is_rejected() {
        let alpha = GrayImage::new(3, 3);

        let result = attach_alpha(DynamicImage::new_rgb8(2, 2), &alpha);

        assert!(matches!(result, Err(ScunetError::InvalidTensorShape { .. })));
    }

    #[test]
    fn test_grayscale_conversion_has_one_channel() {
        let image = DynamicImage::new_rgb8(5, 3);

        let tensor = image_to_tensor::<TestBackend>(&image, 1, &Default::default()).unwrap();

        assert_eq!(tensor.dims(), [1, 1, 3, 5]);
    }

    #[test]
    fn test_unsupported_channel_count_is_rejected() {
        let image = DynamicImage::new_rgb8(2, 2);

        let result = image_to_tensor::<TestBackend>(&image, 4, &Default::default());

        assert!(matches!(result, Err(ScunetError::ImageProcessing { .. })));
    }

    #[test]
    fn test_tensor_to_image_saturates_and_keeps_layout() {
        let device = Default::default();
        // [1, 3, 1, 2]: pixel (0,0) = (1.5, 0, -1), pixel (0,1) = (0, 1, 0)
        let tensor = Tensor::<TestBackend, 4>::from_floats([[[[1.5, 0.0]], [[0.0, 1.0]], [[-1.0, 0.0]]]], &device);

        let image = tensor_to_image(tensor).unwrap().into_rgb8();

        assert_eq!(image.dimensions(), (2, 1));
        assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 255, 0]);
    }

    #[test]
    fn test_batched_tensor_is_rejected() {
        let tensor = Tensor::<TestBackend, 4>::zeros([2, 3, 4, 4], &Default::default());

        assert!(matches!(
            tensor_to_image(tensor),
            Err(ScunetError::InvalidTensorShape { .. })
        ));
    }

    #[test]
    fn test_load_image_reports_missing_file() {
        let result = load_image("does/not/exist.png");

        match result {
            Err(ScunetError::ImageProcessing { reason }) => assert!(reason.contains("exist.png")),
            _ => panic!("Expected ImageProcessing error"),
        }
    }
}
