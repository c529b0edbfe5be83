//! # Inverse Error Function
//!
//! Element-wise `erfinv` using M. Giles' single-precision approximation
//! ("Approximating the erfinv function", GPU Computing Gems, 2011). Two
//! polynomials in `w = -ln(1 - x^2)` cover the central (`w < 5`) and tail
//! regions. Both branches are evaluated and selected with a mask so that the
//! op contains no data-dependent control flow.

use burn::prelude::*;

const CENTRAL: [f32; 9] = [
    2.810_226_4e-8,
    3.432_739_4e-7,
    -3.523_387_7e-6,
    -4.391_506_5e-6,
    2.185_808_7e-4,
    -1.253_725e-3,
    -4.177_681_6e-3,
    2.466_407_3e-1,
    1.501_409_4,
];

const TAIL: [f32; 9] = [
    -2.002_142_6e-4,
    1.009_505_6e-4,
    1.349_343_2e-3,
    -3.673_428_4e-3,
    5.739_507_7e-3,
    -7.622_461e-3,
    9.438_870_5e-3,
    1.001_674_1,
    2.832_976_8,
];

/// Inverse error function for float tensors.
pub trait Erfinv {
    /// Applies `erfinv` element-wise. Inputs must lie in `(-1, 1)`.
    fn erfinv(self) -> Self;
}

impl<B: Backend, const D: usize> Erfinv for Tensor<B, D> {
    fn erfinv(self) -> Self {
        erfinv(self)
    }
}

/// Applies `erfinv` element-wise. Inputs must lie in `[-1, 1]`; the bounds
/// map to infinities.
pub fn erfinv<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    // w = -ln((1 - x)(1 + x))
    let w = ((x.clone().neg() + 1.0) * (x.clone() + 1.0)).log().neg();
    let is_central = w.clone().lower_elem(5.0);

    let central = horner(w.clone() - 2.5, &CENTRAL);
    let tail = horner(w.sqrt() - 3.0, &TAIL);

    tail.mask_where(is_central, central) * x
}

// Starts from the leading coefficient so that `w = inf` (x = ±1) stays infinite.
fn horner<B: Backend, const D: usize>(w: Tensor<B, D>, coefficients: &[f32; 9]) -> Tensor<B, D> {
    let [leading, rest @ ..] = coefficients;

    rest.iter()
        .fold(w.zeros_like() + *leading, |p, &c| p * w.clone() + c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_erfinv_matches_reference_values() {
        let device = Default::default();
        // scipy.special.erfinv([0.0, 0.5, -0.3, 0.9, 0.999])
        let x = Tensor::<TestBackend, 1>::from_floats([0.0, 0.5, -0.3, 0.9, 0.999], &device);

        let result = x.erfinv();

        result.into_data().assert_approx_eq::<f32>(
            &TensorData::from([0.0f32, 0.476_936_3, -0.272_462_7, 1.163_087_2, 2.326_753_8]),
            burn::tensor::Tolerance::absolute(1e-4),
        );
    }

    #[test]
    fn test_erfinv_is_odd() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([0.1, 0.6, 0.95], &device);

        let sum = erfinv(x.clone()) + erfinv(x.neg());

        sum.into_data().assert_approx_eq::<f32>(
            &TensorData::from([0.0f32, 0.0, 0.0]),
            burn::tensor::Tolerance::absolute(1e-6),
        );
    }

    #[test]
    fn test_erfinv_bounds_are_infinite() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, -1.0], &device);

        let values = x.erfinv().into_data().to_vec::<f32>().unwrap();

        assert_eq!(values, vec![f32::INFINITY, f32::NEG_INFINITY]);
    }
}
