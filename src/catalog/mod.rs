//! Catalog of sources, media items and media servers.

mod layout;
mod memory;
mod models;
mod store;

pub use layout::MediaLayout;
pub use memory::MemoryCatalogStore;
pub use models::{
    AudioCodec, Fallback, FormatDescriptor, Media, MediaMetadata, MediaServer, MediaServerKind,
    MediaState, Resolution, Source, SourceKind, VideoCodec,
};
pub use store::{CatalogStore, IndexBatch, MediaFilter};
