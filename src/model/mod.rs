pub mod element;
pub mod hierarchy;
pub mod instance;
pub mod loader;
pub mod metadata;
pub mod parser;
pub mod tree;

pub use element::{keyword_of, keyword_tag, DataElement, Item, Value};
pub use hierarchy::{Hierarchy, Series, Study};
pub use instance::{Instance, Scope};
pub use loader::{load_sources, LoadReport, Source};
pub use metadata::{header_rows, HeaderRow, HeaderScope};
pub use parser::{ParseError, PixelData, TransferSyntax};
pub use tree::{TreeNodeKey, TreeViewMode};

/// Parses one Part 10 byte stream into an [`Instance`].
pub fn parse(bytes: impl AsRef<[u8]>) -> Result<Instance, ParseError> {
    Instance::parse(bytes)
}
