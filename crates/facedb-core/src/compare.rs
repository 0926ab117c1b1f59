//! Distance comparison between a query face and a set of candidates.

use thiserror::Error;

use crate::types::FaceData;

/// Distance at or below which two encodings are usually the same person
/// for 128-d dlib-style encodings.
pub const DEFAULT_TOLERANCE: f64 = 0.6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompareError {
    #[error("encoding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Pair every candidate with its Euclidean distance to `query`.
///
/// Output keeps candidate input order; nothing is sorted or filtered.
pub fn compare(
    query: &FaceData,
    candidates: Vec<FaceData>,
) -> Result<Vec<(FaceData, f64)>, CompareError> {
    candidates
        .into_iter()
        .map(|candidate| {
            let distance = query.encoding.euclidean_distance(&candidate.encoding)?;
            Ok((candidate, distance))
        })
        .collect()
}

/// Keep only results whose distance is at most `threshold`.
pub fn within_threshold(results: Vec<(FaceData, f64)>, threshold: f64) -> Vec<(FaceData, f64)> {
    results
        .into_iter()
        .filter(|(_, distance)| *distance <= threshold)
        .collect()
}
