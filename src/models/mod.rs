// Data models for Graph payloads

pub mod graph;

pub use graph::{Collection, DriveItem, FileFacet, FolderFacet, ItemReference};
