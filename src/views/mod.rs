pub mod image_viewer;
pub mod metadata_panel;
pub mod tree_browser;

pub use image_viewer::{frame_handle, image_panel, ImagePanel};
pub use metadata_panel::{metadata_panel, HeaderPanel};
pub use tree_browser::tree_panel;
