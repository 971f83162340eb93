//! Reading Anki `.apkg` / `.colpkg` exports: zip container, compressed blobs,
//! the embedded SQLite collection, sibling-card merging and field resolution.

pub mod archive;
pub mod collection;
pub mod decompress;
pub mod manifest;
pub mod media;
pub mod merge;

pub use archive::{
    AnkiPackage,
    ArchiveSource,
};
pub use collection::{
    Collection,
    CollectionData,
};
pub use media::{
    FieldLayout,
    FieldResolver,
};
pub use merge::merge_cards;
