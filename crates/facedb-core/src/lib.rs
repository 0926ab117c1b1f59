//! facedb-core — Face value types and encoding comparison.
//!
//! Face detection and encoding are delegated to an external collaborator
//! behind the [`FaceExtractor`] trait; this crate only shapes its output
//! and measures distances between the resulting encodings.

pub mod compare;
pub mod extract;
pub mod types;

pub use compare::{compare, within_threshold, CompareError, DEFAULT_TOLERANCE};
pub use extract::{extract_faces, CommandExtractor, DetectedFace, ExtractError, FaceExtractor};
pub use types::{Encoding, FaceData, FaceLocation, ImageFormat, ImageSource, ParseFormatError};
