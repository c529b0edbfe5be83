//! # Truncated Normal Initialization
//!
//! Inverse-CDF sampling, as in `timm.layers.trunc_normal_`: draw uniformly
//! between the CDF values of the bounds, map back through `erfinv`, then clamp
//! to absorb rounding at the edges.

use burn::{prelude::*, tensor::Distribution};

use crate::erfinv::Erfinv;

/// Returns a tensor shaped like `x` with values drawn from `N(mean, std^2)`
/// truncated to `[a, b]`.
pub fn trunc_normal<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    mean: f64,
    std: f64,
    a: f64,
    b: f64,
) -> Tensor<B, D> {
    fn norm_cdf(x: f64) -> f64 {
        (1.0 + libm::erf(x / std::f64::consts::SQRT_2)) / 2.0
    }

    let lower = norm_cdf((a - mean) / std);
    let upper = norm_cdf((b - mean) / std);

    x.random_like(Distribution::Uniform(
        2.0f64.mul_add(lower, -1.0),
        2.0f64.mul_add(upper, -1.0),
    ))
    .erfinv()
    .mul_scalar(std * std::f64::consts::SQRT_2)
    .add_scalar(mean)
    .clamp(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_trunc_normal_respects_bounds() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::zeros([64, 64], &device);

        let sampled = trunc_normal(x, 0.0, 1.0, -0.5, 0.5);

        let min: f32 = sampled.clone().min().into_scalar();
        let max: f32 = sampled.max().into_scalar();
        assert!(min >= -0.5 && max <= 0.5, "sample range [{min}, {max}]");
    }

    #[test]
    fn test_trunc_normal_small_std_is_centered() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::zeros([4096], &device);

        let sampled = trunc_normal(x, 0.0, 0.02, -2.0, 2.0);

        let mean: f32 = sampled.clone().mean().into_scalar();
        let std: f32 = sampled.var(0).sqrt().into_scalar();
        assert!(mean.abs() < 2e-3, "mean {mean}");
        assert!((std - 0.02).abs() < 3e-3, "std {std}");
    }

    #[test]
    fn test_trunc_normal_degenerate_range_hits_bounds_without_nan() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::zeros([256], &device);

        // Both CDF values saturate, so the uniform draw spans the closed [-1, 1].
        let sampled = trunc_normal(x, 0.0, 0.02, -100.0, 100.0);

        let nan: i64 = sampled.clone().is_nan().int().sum().into_scalar().elem();
        assert_eq!(nan, 0);
        let max: f32 = sampled.abs().max().into_scalar();
        assert!(max <= 100.0);
    }
}
