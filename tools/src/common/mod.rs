//! Shared helpers for the command line tools.

pub mod backend;
pub mod images;
pub mod logging;

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};
pub use images::{collect_images, output_paths};
pub use logging::init_logging;
