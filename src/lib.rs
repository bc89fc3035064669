//! Engine behind the Voxel DICOM viewer.
//!
//! The crate parses DICOM byte streams into an immutable header tree, indexes
//! them into studies and series, decodes and caches frames, and turns stored
//! pixel values into display buffers, probe readouts and ROI statistics.
//! Nothing in here depends on a GUI runtime.

pub mod cache;
pub mod decode;
pub mod frame;
pub mod image_pipeline;
pub mod model;
pub mod overlay;
pub mod roi;
pub mod session;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CacheConfig, PixelCache};
pub use decode::{DecodeError, FrameDecoder};
pub use frame::{DisplayBuffer, Photometric, RawFrame};
pub use image_pipeline::{ModalityLut, TransformError, Window};
pub use model::{Hierarchy, Instance, ParseError, Scope};
pub use roi::{RoiError, RoiResult, RoiStats, ValueMode};
