//! facedb — Tagged face encoding database.
//!
//! Faces are extracted from images by an external collaborator, stored
//! with tags in SQLite, and compared by Euclidean distance against the
//! stored faces carrying a set of tags.
//!
//! ```no_run
//! use facedb::{query, Config, FaceStore, ImageSource};
//!
//! # fn main() -> Result<(), facedb::Error> {
//! let config = Config::from_env();
//! let store = FaceStore::open(&config.db_path)?;
//! let extractor = config.command_extractor().expect("FACEDB_EXTRACTOR not set");
//!
//! let source = ImageSource::Path("group.jpg".into());
//! query::upload_faces_from_image(&store, &extractor, &source, "group", &["family"])?;
//! for (face, distance) in query::compare_stored_face_against_tags(&store, 1, &["family"])? {
//!     println!("{:?} {distance:.3}", face.id);
//! }
//! store.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod query;

use std::path::PathBuf;

use thiserror::Error;

pub use config::Config;
pub use facedb_core::{
    within_threshold, CommandExtractor, CompareError, DetectedFace, Encoding, ExtractError,
    FaceData, FaceExtractor, FaceLocation, ImageFormat, ImageSource, DEFAULT_TOLERANCE,
};
pub use facedb_store::{FaceStore, StoreError, StoredImage};

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("face {0} lies outside its image")]
    EmptyCrop(i64),
    #[error("cannot encode cropped face: {0}")]
    Image(#[from] image::ImageError),
    #[error("cannot read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
