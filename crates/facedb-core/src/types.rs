use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compare::CompareError;

/// Axis-aligned face bounding box in `(x1, y1, x2, y2)` pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FaceLocation {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl FaceLocation {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build a location from the extractor's `(top, right, bottom, left)` box.
    pub fn from_collaborator_box((top, right, bottom, left): (i32, i32, i32, i32)) -> Self {
        Self {
            x1: left,
            y1: top,
            x2: right,
            y2: bottom,
        }
    }

    /// Inverse of [`from_collaborator_box`](Self::from_collaborator_box).
    pub fn to_collaborator_box(&self) -> (i32, i32, i32, i32) {
        (self.y1, self.x2, self.y2, self.x1)
    }

    pub fn rect(&self) -> (i32, i32, i32, i32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// How an image payload is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageFormat {
    ByteStream,
    LocalPath,
    Url,
    Id,
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::ByteStream,
        ImageFormat::LocalPath,
        ImageFormat::Url,
        ImageFormat::Id,
    ];

    /// Canonical name, also used as the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::ByteStream => "BYTE_STREAM",
            ImageFormat::LocalPath => "LOCAL_PATH",
            ImageFormat::Url => "URL",
            ImageFormat::Id => "ID",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown image format: {0:?}")]
pub struct ParseFormatError(pub String);

impl FromStr for ImageFormat {
    type Err = ParseFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| ParseFormatError(s.to_string()))
    }
}

/// An image payload tagged with its format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImageSource {
    #[serde(rename = "BYTE_STREAM")]
    Bytes(Vec<u8>),
    #[serde(rename = "LOCAL_PATH")]
    Path(PathBuf),
    Url(String),
    /// Reference to a row in the `images` table.
    Id(i64),
}

impl ImageSource {
    pub fn format(&self) -> ImageFormat {
        match self {
            ImageSource::Bytes(_) => ImageFormat::ByteStream,
            ImageSource::Path(_) => ImageFormat::LocalPath,
            ImageSource::Url(_) => ImageFormat::Url,
            ImageSource::Id(_) => ImageFormat::Id,
        }
    }
}

/// Face encoding vector (128-dimensional for dlib-style recognizers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Encoding {
    pub values: Vec<f64>,
}

impl Encoding {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two encodings of the same dimensionality.
    pub fn euclidean_distance(&self, other: &Encoding) -> Result<f64, CompareError> {
        if self.dim() != other.dim() {
            return Err(CompareError::DimensionMismatch {
                expected: self.dim(),
                actual: other.dim(),
            });
        }

        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f64>()
            .sqrt())
    }
}

impl From<Vec<f64>> for Encoding {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// A single face: its encoding, where it sits in its image, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    /// Row id once persisted.
    pub id: Option<i64>,
    pub encoding: Encoding,
    pub location: FaceLocation,
    /// `None` for faces stored without a backing image.
    pub source: Option<ImageSource>,
    pub description: String,
    pub tags: BTreeSet<String>,
}

impl FaceData {
    pub fn new(encoding: Encoding, location: FaceLocation) -> Self {
        Self {
            id: None,
            encoding,
            location,
            source: None,
            description: String::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_source(mut self, source: ImageSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Id of the stored image this face was read from, if any.
    pub fn image_id(&self) -> Option<i64> {
        match self.source {
            Some(ImageSource::Id(id)) => Some(id),
            _ => None,
        }
    }

    pub fn is_comparable(&self, other: &FaceData) -> bool {
        self.encoding.dim() == other.encoding.dim()
    }
}
