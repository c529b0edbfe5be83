//! # Cyclic Shift
//!
//! Equivalent of `torch.roll`: elements shifted past the last position wrap
//! around to the first. Built from `narrow` and `cat` only, so the op stays
//! expressible on every backend.

use burn::prelude::*;

/// Cyclically shifts `input` by `shifts[i]` positions along `dims[i]`.
///
/// Positive shifts move elements towards higher indices. Shifts larger than
/// the dimension wrap, and a shift that is a multiple of the dimension size is
/// a no-op.
///
/// # Panics
///
/// If `shifts` and `dims` have different lengths or a dimension is out of range.
pub fn roll<B: Backend, const D: usize>(
    input: Tensor<B, D>,
    shifts: &[i64],
    dims: &[usize],
) -> Tensor<B, D> {
    assert_eq!(
        shifts.len(),
        dims.len(),
        "roll expects one shift per dimension"
    );

    shifts
        .iter()
        .zip(dims)
        .fold(input, |x, (&shift, &dim)| roll_dim(x, shift, dim))
}

fn roll_dim<B: Backend, const D: usize>(x: Tensor<B, D>, shift: i64, dim: usize) -> Tensor<B, D> {
    assert!(dim < D, "roll dimension {dim} out of range for rank {D}");

    let size = x.dims()[dim];
    if size == 0 {
        return x;
    }
    let shift = shift.rem_euclid(size as i64) as usize;
    if shift == 0 {
        return x;
    }

    // The last `shift` elements move to the front.
    let head = x.clone().narrow(dim, size - shift, shift);
    let tail = x.narrow(dim, 0, size - shift);
    Tensor::cat(vec![head, tail], dim)
}
