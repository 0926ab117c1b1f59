//! Query façade.
//!
//! Each function is a direct synchronous composition of the store, the
//! extractor and the comparison; errors propagate unchanged.

use std::collections::BTreeSet;
use std::io::Cursor;

use facedb_core::extract::{decode_image, extract_faces, read_image};
use facedb_core::{compare, FaceData, FaceExtractor, ImageSource};
use facedb_store::FaceStore;

use crate::Error;

/// Store `source` and every face found in it, tagged with `tags`.
///
/// Returns the new face ids; empty when no face was detected.
pub fn upload_faces_from_image<S: AsRef<str>>(
    store: &FaceStore,
    extractor: &dyn FaceExtractor,
    source: &ImageSource,
    description: &str,
    tags: &[S],
) -> Result<Vec<i64>, Error> {
    Ok(store.add_faces_from_image(extractor, source, description, tags)?)
}

/// Compare stored face `face_id` with every stored face carrying any of `tags`.
///
/// An unknown `face_id` yields an empty result. The query face itself is
/// included when it carries one of the tags.
pub fn compare_stored_face_against_tags<S: AsRef<str>>(
    store: &FaceStore,
    face_id: i64,
    tags: &[S],
) -> Result<Vec<(FaceData, f64)>, Error> {
    let Some(face) = store.get_face_by_id(face_id)? else {
        tracing::debug!(face_id, "query face not found");
        return Ok(Vec::new());
    };

    let candidates = store.get_faces_by_tags(tags)?;
    Ok(compare(&face, candidates)?)
}

/// Compare a face found in `source` with every stored face carrying any of `tags`.
///
/// Only the first detected face is used as the query; an image without
/// faces yields an empty result.
pub fn compare_face_from_image_against_tags<S: AsRef<str>>(
    store: &FaceStore,
    extractor: &dyn FaceExtractor,
    source: &ImageSource,
    tags: &[S],
) -> Result<Vec<(FaceData, f64)>, Error> {
    let faces = extract_faces(extractor, source)?;
    let Some(face) = faces.into_iter().next() else {
        tracing::debug!(format = %source.format(), "no face in query image");
        return Ok(Vec::new());
    };

    let candidates = store.get_faces_by_tags(tags)?;
    Ok(compare(&face, candidates)?)
}

pub fn get_available_tags(store: &FaceStore) -> Result<BTreeSet<String>, Error> {
    Ok(store.get_all_tags()?)
}

/// PNG bytes of stored face `face_id`, cropped out of its source image.
///
/// `None` when the face is unknown or has no backing image. Images stored
/// by URL or id cannot be reloaded and fail with an unsupported-format error.
pub fn cropped_face_image(store: &FaceStore, face_id: i64) -> Result<Option<Vec<u8>>, Error> {
    let Some(face) = store.get_face_by_id(face_id)? else {
        return Ok(None);
    };
    let Some(image_id) = face.image_id() else {
        tracing::debug!(face_id, "face has no stored image");
        return Ok(None);
    };
    let Some(stored) = store.get_image(image_id)? else {
        return Ok(None);
    };

    let image = decode_image(&read_image(&stored.source)?)?;

    // Clamp the box to the image; detections may overhang the border.
    let loc = face.location;
    let x1 = (loc.x1.max(0) as u32).min(image.width());
    let y1 = (loc.y1.max(0) as u32).min(image.height());
    let x2 = (loc.x2.max(0) as u32).min(image.width());
    let y2 = (loc.y2.max(0) as u32).min(image.height());
    let (w, h) = (x2.saturating_sub(x1), y2.saturating_sub(y1));
    if w == 0 || h == 0 {
        return Err(Error::EmptyCrop(face_id));
    }

    let crop = image.crop_imm(x1, y1, w, h);
    let mut buf = Cursor::new(Vec::new());
    crop.write_to(&mut buf, image::ImageFormat::Png)?;

    tracing::debug!(face_id, image_id, width = w, height = h, "cropped face");
    Ok(Some(buf.into_inner()))
}
