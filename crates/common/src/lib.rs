pub mod error;
pub mod image;
pub mod partition;
pub mod run;

pub use error::{Error, Result};
pub use image::ImageReference;
pub use run::{RunId, RunStatus};
