use std::collections::BTreeSet;
use std::path::Path;

use facedb_core::extract::extract_faces;
use facedb_core::{ExtractError, FaceData, FaceExtractor, ImageSource};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use thiserror::Error;

use crate::codec::{
    decode_payload, encode_payload, CodecError, EncodingColumn, FormatColumn, LocationColumn,
};
use crate::schema::SCHEMA;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

/// A row of the `images` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    pub id: i64,
    pub source: ImageSource,
    pub description: String,
}

const FACE_COLUMNS: &str = "id, encoding, encoding_dim, image_id, location, description";

/// Handle to a face database.
///
/// The connection is released on drop; use [`close`](Self::close) to
/// observe close errors.
pub struct FaceStore {
    conn: Connection,
}

impl FaceStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let store = Self::init(Connection::open(path)?)?;
        tracing::info!(path = %path.display(), "face store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store an image row and return its id.
    pub fn add_image(&self, source: &ImageSource, description: &str) -> Result<i64, StoreError> {
        insert_image(&self.conn, source, description)
    }

    /// Store one face and its tags.
    ///
    /// `image_id` may be `None`; such a face can still be compared but its
    /// source image cannot be recovered later.
    pub fn add_face<S: AsRef<str>>(
        &self,
        face: &FaceData,
        image_id: Option<i64>,
        description: &str,
        tags: &[S],
    ) -> Result<i64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let face_id = insert_face(&tx, face, image_id, description, tags)?;
        tx.commit()?;
        Ok(face_id)
    }

    /// Extract every face from `source` and store the image plus one row
    /// per face, all sharing `description` and `tags`.
    ///
    /// Nothing is written when no face is found. The image and its faces
    /// are committed together or not at all.
    pub fn add_faces_from_image<S: AsRef<str>>(
        &self,
        extractor: &dyn FaceExtractor,
        source: &ImageSource,
        description: &str,
        tags: &[S],
    ) -> Result<Vec<i64>, StoreError> {
        let faces = extract_faces(extractor, source)?;
        if faces.is_empty() {
            tracing::info!(format = %source.format(), "no faces found; nothing stored");
            return Ok(Vec::new());
        }

        let tx = self.conn.unchecked_transaction()?;
        let image_id = insert_image(&tx, source, description)?;
        let face_ids = faces
            .iter()
            .map(|face| insert_face(&tx, face, Some(image_id), description, tags))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit()?;

        tracing::info!(image_id, faces = face_ids.len(), "stored faces from image");
        Ok(face_ids)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_face_by_id(&self, id: i64) -> Result<Option<FaceData>, StoreError> {
        let result = self.conn.query_row(
            &format!("SELECT {FACE_COLUMNS} FROM faces WHERE id = ?"),
            [id],
            face_from_row,
        );

        match result {
            Ok(mut face) => {
                face.tags = self.load_tags(id)?;
                Ok(Some(face))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Faces carrying at least one of `tags`, ordered by id.
    ///
    /// Tags match by exact string equality.
    pub fn get_faces_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<FaceData>, StoreError> {
        let tags: Vec<&str> = tags.iter().map(|t| t.as_ref()).collect();
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tags.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {FACE_COLUMNS}
            FROM faces
            WHERE id IN (SELECT face_id FROM face_tags WHERE tag IN ({placeholders}))
            ORDER BY id
            "#
        ))?;

        let mut faces = stmt
            .query_map(params_from_iter(tags.iter()), face_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        for face in &mut faces {
            if let Some(id) = face.id {
                face.tags = self.load_tags(id)?;
            }
        }

        tracing::debug!(requested = tags.len(), matched = faces.len(), "faces by tags");
        Ok(faces)
    }

    /// Every distinct tag in the database.
    pub fn get_all_tags(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT DISTINCT tag FROM face_tags")?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(tags)
    }

    pub fn get_image(&self, id: i64) -> Result<Option<StoredImage>, StoreError> {
        let result = self.conn.query_row(
            "SELECT format, data, description FROM images WHERE id = ?",
            [id],
            |row| {
                let FormatColumn(format) = row.get(0)?;
                let data: Vec<u8> = row.get(1)?;
                let description: String = row.get(2)?;
                Ok((format, data, description))
            },
        );

        match result {
            Ok((format, data, description)) => Ok(Some(StoredImage {
                id,
                source: decode_payload(format, data)?,
                description,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_images(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_faces(&self) -> Result<i64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM faces", [], |row| row.get(0))?;
        Ok(count)
    }

    fn load_tags(&self, face_id: i64) -> Result<BTreeSet<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT tag FROM face_tags WHERE face_id = ?")?;
        let tags = stmt
            .query_map([face_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(tags)
    }
}

fn insert_image(
    conn: &Connection,
    source: &ImageSource,
    description: &str,
) -> Result<i64, StoreError> {
    let data = encode_payload(source)?;
    conn.execute(
        "INSERT INTO images (format, data, description) VALUES (?, ?, ?)",
        params![FormatColumn(source.format()), data, description],
    )?;

    let id = conn.last_insert_rowid();
    tracing::debug!(image_id = id, format = %source.format(), "image stored");
    Ok(id)
}

fn insert_face<S: AsRef<str>>(
    conn: &Connection,
    face: &FaceData,
    image_id: Option<i64>,
    description: &str,
    tags: &[S],
) -> Result<i64, StoreError> {
    conn.execute(
        r#"
        INSERT INTO faces (encoding, encoding_dim, image_id, location, description)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            EncodingColumn(face.encoding.clone()),
            face.encoding.dim() as i64,
            image_id,
            LocationColumn(face.location),
            description,
        ],
    )?;
    let face_id = conn.last_insert_rowid();

    let mut stmt = conn.prepare_cached("INSERT OR IGNORE INTO face_tags (face_id, tag) VALUES (?, ?)")?;
    for tag in tags {
        let tag: &str = tag.as_ref();
        stmt.execute(params![face_id, tag])?;
    }

    tracing::debug!(face_id, ?image_id, tags = tags.len(), "face stored");
    Ok(face_id)
}

/// Map a row selected with [`FACE_COLUMNS`]; tags are filled in separately.
fn face_from_row(row: &Row<'_>) -> rusqlite::Result<FaceData> {
    let id: i64 = row.get(0)?;
    let EncodingColumn(encoding) = row.get(1)?;
    let declared: i64 = row.get(2)?;
    if declared != encoding.dim() as i64 {
        return Err(rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Blob,
            Box::new(CodecError::EncodingDim {
                declared,
                actual: encoding.dim(),
            }),
        ));
    }
    let image_id: Option<i64> = row.get(3)?;
    let LocationColumn(location) = row.get(4)?;
    let description: String = row.get(5)?;

    Ok(FaceData {
        id: Some(id),
        encoding,
        location,
        source: image_id.map(ImageSource::Id),
        description,
        tags: BTreeSet::new(),
    })
}
