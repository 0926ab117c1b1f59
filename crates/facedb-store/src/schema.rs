pub const SCHEMA: &str = r#"
-- Source images; faces point back here
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    format TEXT NOT NULL CHECK (format IN ('BYTE_STREAM', 'LOCAL_PATH', 'URL', 'ID')),
    data BLOB NOT NULL,        -- raw bytes, UTF-8 path/url, or decimal image id
    description TEXT NOT NULL DEFAULT ''
);

-- Faces: one row per detected face region
CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    encoding BLOB NOT NULL,    -- little-endian f64 array
    encoding_dim INTEGER NOT NULL CHECK (encoding_dim > 0),
    image_id INTEGER,          -- NULL for faces stored without an image
    location TEXT NOT NULL,    -- "x1,y1,x2,y2"
    description TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (image_id) REFERENCES images(id)
);

CREATE INDEX IF NOT EXISTS idx_faces_image ON faces(image_id);

-- Exact-match tag membership
CREATE TABLE IF NOT EXISTS face_tags (
    face_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (face_id, tag),
    FOREIGN KEY (face_id) REFERENCES faces(id)
);

CREATE INDEX IF NOT EXISTS idx_face_tags_tag ON face_tags(tag);
"#;
