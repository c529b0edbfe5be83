//! Additional operations for the Burn deep learning framework
//!
//! Tensor helpers that PyTorch-trained vision models rely on but that the core
//! Burn API does not expose in the required form:
//!
//! - [`roll`]: cyclic shift along one or more dimensions (`torch.roll`).
//! - [`reflect_pad`]: reflection padding along a single dimension
//!   (`F.pad(..., mode="reflect")`).
//! - [`DropPath`]: stochastic depth.
//! - [`trunc_normal`]: truncated normal initialization, built on [`erfinv`].

mod drop_path;
mod erfinv;
mod pad;
mod roll;
mod trunc_normal;

pub use drop_path::{DropPath, DropPathConfig};
pub use erfinv::{erfinv, Erfinv};
pub use pad::reflect_pad;
pub use roll::roll;
pub use trunc_normal::trunc_normal;
