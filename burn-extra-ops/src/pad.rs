//! # Reflection Padding
//!
//! Burn's `Tensor::pad` only fills with a constant. Reflection padding mirrors
//! the tensor around its edge samples without repeating them, which is what
//! `torch.nn.functional.pad(x, ..., mode="reflect")` does.

use burn::prelude::*;

/// Pads `x` along `dim` by mirroring `before` leading and `after` trailing
/// elements around the edges (the edge element itself is not repeated).
///
/// `[a, b, c, d]` padded with `before = 2, after = 1` becomes
/// `[c, b, a, b, c, d, c]`.
///
/// # Panics
///
/// If `before` or `after` is not smaller than the size of `dim`; reflection
/// would have to wrap more than once.
pub fn reflect_pad<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    dim: usize,
    before: usize,
    after: usize,
) -> Tensor<B, D> {
    if before == 0 && after == 0 {
        return x;
    }

    let size = x.dims()[dim];
    assert!(
        before < size && after < size,
        "reflect padding ({before}, {after}) must be smaller than dimension size {size}"
    );

    let last = size as i64 - 1;
    let indices: Vec<i64> = (-(before as i64)..size as i64 + after as i64)
        .map(|i| {
            if i < 0 {
                -i
            } else if i > last {
                2 * last - i
            } else {
                i
            }
        })
        .collect();

    let len = indices.len();
    let indices = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [len]), &x.device());
    x.select(dim, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_reflect_pad_mirrors_without_repeating_edge() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0, 4.0], &device);

        let padded = reflect_pad(x, 0, 2, 1);

        padded.into_data().assert_eq(
            &TensorData::from([3.0f32, 2.0, 1.0, 2.0, 3.0, 4.0, 3.0]),
            false,
        );
    }

    #[test]
    fn test_reflect_pad_on_inner_dimension() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);

        let padded = reflect_pad(x, 1, 0, 2);

        padded.into_data().assert_eq(
            &TensorData::from([[1.0f32, 2.0, 3.0, 2.0, 1.0], [4.0, 5.0, 6.0, 5.0, 4.0]]),
            false,
        );
    }

    #[test]
    fn test_reflect_pad_zero_is_identity() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0]], &device);

        let padded = reflect_pad(x.clone(), 0, 0, 0);

        padded.into_data().assert_eq(&x.into_data(), false);
    }

    #[test]
    #[should_panic(expected = "must be smaller than dimension size")]
    fn test_reflect_pad_rejects_pad_not_smaller_than_size() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([1.0, 2.0, 3.0], &device);

        let _ = reflect_pad(x, 0, 0, 3);
    }
}
