//! Column codecs.
//!
//! Each value type stored in a column has an explicit encode/decode pair.
//! The `*Column` wrappers plug those pairs into rusqlite's `ToSql` and
//! `FromSql` so row mapping stays typed.

use std::path::PathBuf;

use facedb_core::{Encoding, FaceLocation, ImageFormat, ImageSource, ParseFormatError};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use thiserror::Error;

const F64_BYTES: usize = std::mem::size_of::<f64>();

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encoding blob length {0} is not a multiple of 8")]
    EncodingLength(usize),
    #[error("encoding has {actual} values but the row declares {declared}")]
    EncodingDim { declared: i64, actual: usize },
    #[error("malformed location {0:?}")]
    Location(String),
    #[error(transparent)]
    Format(#[from] ParseFormatError),
    #[error("image path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("malformed {format} payload: {reason}")]
    Payload { format: ImageFormat, reason: String },
}

pub fn encode_encoding(encoding: &Encoding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoding.dim() * F64_BYTES);
    for &val in &encoding.values {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

pub fn decode_encoding(bytes: &[u8]) -> Result<Encoding, CodecError> {
    if bytes.len() % F64_BYTES != 0 {
        return Err(CodecError::EncodingLength(bytes.len()));
    }

    let values = bytes
        .chunks_exact(F64_BYTES)
        .map(|chunk| {
            let mut arr = [0u8; F64_BYTES];
            arr.copy_from_slice(chunk);
            f64::from_le_bytes(arr)
        })
        .collect();

    Ok(Encoding::new(values))
}

pub fn encode_location(location: &FaceLocation) -> String {
    let (x1, y1, x2, y2) = location.rect();
    format!("{x1},{y1},{x2},{y2}")
}

pub fn decode_location(text: &str) -> Result<FaceLocation, CodecError> {
    let malformed = || CodecError::Location(text.to_string());

    let coords = text
        .split(',')
        .map(|part| part.trim().parse::<i32>().map_err(|_| malformed()))
        .collect::<Result<Vec<_>, _>>()?;

    match coords.as_slice() {
        &[x1, y1, x2, y2] => Ok(FaceLocation::new(x1, y1, x2, y2)),
        _ => Err(malformed()),
    }
}

pub fn encode_format(format: ImageFormat) -> &'static str {
    format.as_str()
}

pub fn decode_format(text: &str) -> Result<ImageFormat, CodecError> {
    Ok(text.parse()?)
}

/// Serialize the payload half of an [`ImageSource`] for the `images.data` column.
pub fn encode_payload(source: &ImageSource) -> Result<Vec<u8>, CodecError> {
    match source {
        ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        ImageSource::Path(path) => path
            .to_str()
            .map(|s| s.as_bytes().to_vec())
            .ok_or_else(|| CodecError::NonUtf8Path(path.clone())),
        ImageSource::Url(url) => Ok(url.as_bytes().to_vec()),
        ImageSource::Id(id) => Ok(id.to_string().into_bytes()),
    }
}

pub fn decode_payload(format: ImageFormat, data: Vec<u8>) -> Result<ImageSource, CodecError> {
    let payload_err = |reason: String| CodecError::Payload { format, reason };

    match format {
        ImageFormat::ByteStream => Ok(ImageSource::Bytes(data)),
        ImageFormat::LocalPath => String::from_utf8(data)
            .map(|s| ImageSource::Path(PathBuf::from(s)))
            .map_err(|e| payload_err(e.to_string())),
        ImageFormat::Url => String::from_utf8(data)
            .map(ImageSource::Url)
            .map_err(|e| payload_err(e.to_string())),
        ImageFormat::Id => std::str::from_utf8(&data)
            .map_err(|e| payload_err(e.to_string()))?
            .parse::<i64>()
            .map(ImageSource::Id)
            .map_err(|e| payload_err(e.to_string())),
    }
}

fn from_sql_error(err: CodecError) -> FromSqlError {
    FromSqlError::Other(Box::new(err))
}

/// `faces.encoding` column.
pub struct EncodingColumn(pub Encoding);

impl ToSql for EncodingColumn {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(encode_encoding(&self.0)))
    }
}

impl FromSql for EncodingColumn {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        decode_encoding(value.as_blob()?)
            .map(EncodingColumn)
            .map_err(from_sql_error)
    }
}

/// `faces.location` column.
pub struct LocationColumn(pub FaceLocation);

impl ToSql for LocationColumn {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(encode_location(&self.0)))
    }
}

impl FromSql for LocationColumn {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        decode_location(value.as_str()?)
            .map(LocationColumn)
            .map_err(from_sql_error)
    }
}

/// `images.format` column.
pub struct FormatColumn(pub ImageFormat);

impl ToSql for FormatColumn {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(encode_format(self.0)))
    }
}

impl FromSql for FormatColumn {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        decode_format(value.as_str()?)
            .map(FormatColumn)
            .map_err(from_sql_error)
    }
}
