//! facedb-store — SQLite persistence for images, faces and tags.
//!
//! One [`FaceStore`] owns one connection. Rows are write-once: there are
//! no update or delete operations.

pub mod codec;
mod schema;
pub mod store;

pub use codec::CodecError;
pub use schema::SCHEMA;
pub use store::{FaceStore, StoreError, StoredImage};
