//! Face extraction seam.
//!
//! Detection and encoding live in an external face-recognition
//! collaborator. This module reads and sanity-checks the image, hands the
//! raw bytes to a [`FaceExtractor`], and converts its native
//! `(top, right, bottom, left)` boxes into [`FaceLocation`]s.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Encoding, FaceData, FaceLocation, ImageFormat, ImageSource};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported image format for extraction: {0}")]
    UnsupportedFormat(ImageFormat),
    #[error("cannot read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unreadable image data: {0}")]
    Unreadable(String),
    #[error("face extractor failed: {0}")]
    Collaborator(String),
}

/// One face as reported by the collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// `(top, right, bottom, left)` in pixels.
    pub location: (i32, i32, i32, i32),
    pub encoding: Vec<f64>,
}

/// External face detector + encoder.
///
/// Receives the encoded image file contents (JPEG, PNG, ...) and returns
/// every face found, or an empty vec.
pub trait FaceExtractor {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError>;
}

/// Load the encoded image bytes behind `source`.
///
/// Only byte streams and local paths can be read; URL and stored-id
/// sources are rejected.
pub fn read_image(source: &ImageSource) -> Result<Vec<u8>, ExtractError> {
    match source {
        ImageSource::Bytes(bytes) => Ok(bytes.clone()),
        ImageSource::Path(path) => std::fs::read(path).map_err(|source| ExtractError::Io {
            path: path.clone(),
            source,
        }),
        other => Err(ExtractError::UnsupportedFormat(other.format())),
    }
}

/// Read the image header and return its `(width, height)`.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), ExtractError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ExtractError::Unreadable(e.to_string()))?;

    if reader.format().is_none() {
        return Err(ExtractError::Unreadable("unrecognized image format".into()));
    }

    reader
        .into_dimensions()
        .map_err(|e| ExtractError::Unreadable(e.to_string()))
}

/// Fully decode an encoded image.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractError> {
    image::load_from_memory(bytes).map_err(|e| ExtractError::Unreadable(e.to_string()))
}

/// Run `extractor` over `source` and shape the result as [`FaceData`].
///
/// Each returned face carries a copy of `source`. Zero detections yield
/// an empty vec.
pub fn extract_faces(
    extractor: &dyn FaceExtractor,
    source: &ImageSource,
) -> Result<Vec<FaceData>, ExtractError> {
    let bytes = read_image(source)?;
    let (width, height) = probe_dimensions(&bytes)?;

    let detected = extractor.detect(&bytes)?;
    tracing::debug!(
        format = %source.format(),
        width,
        height,
        faces = detected.len(),
        "extracted faces"
    );

    Ok(detected
        .into_iter()
        .map(|face| {
            FaceData::new(
                Encoding::new(face.encoding),
                FaceLocation::from_collaborator_box(face.location),
            )
            .with_source(source.clone())
        })
        .collect())
}

/// Extractor backed by an external program.
///
/// The program receives the image file contents on stdin and must print a
/// JSON array of `{"location": [top, right, bottom, left], "encoding": [...]}`
/// objects on stdout.
#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a shell-like command line on whitespace; the first word is the program.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        Some(Self::new(program).with_args(words))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl FaceExtractor for CommandExtractor {
    fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExtractError::Collaborator(format!("spawn {}: {e}", self.program.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractError::Collaborator("extractor stdin unavailable".into()))?;

        // Feed stdin from a separate thread so a chatty extractor cannot
        // deadlock on a full stdout pipe.
        let (written, output) = std::thread::scope(|s| {
            let writer = s.spawn(move || {
                let mut stdin = stdin;
                stdin.write_all(image)
            });
            let output = child.wait_with_output();
            (writer.join(), output)
        });

        let output = output
            .map_err(|e| ExtractError::Collaborator(format!("wait for extractor: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Collaborator(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(ExtractError::Collaborator(format!("write image to extractor: {e}")))
            }
            Err(_) => return Err(ExtractError::Collaborator("stdin writer panicked".into())),
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| ExtractError::Collaborator(format!("malformed extractor output: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor(Vec<DetectedFace>);

    impl FaceExtractor for FixedExtractor {
        fn detect(&self, _image: &[u8]) -> Result<Vec<DetectedFace>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([120, 80, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_extract_converts_locations() {
        let extractor = FixedExtractor(vec![
            DetectedFace {
                location: (10, 50, 60, 5),
                encoding: vec![0.1; 128],
            },
            DetectedFace {
                location: (1, 2, 3, 0),
                encoding: vec![0.2; 128],
            },
        ]);
        let source = ImageSource::Bytes(png_bytes(64, 64));

        let faces = extract_faces(&extractor, &source).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].location, FaceLocation::new(5, 10, 50, 60));
        assert_eq!(faces[0].location.to_collaborator_box(), (10, 50, 60, 5));
        assert_eq!(faces[1].encoding.values, vec![0.2; 128]);
        assert_eq!(faces[0].source.as_ref(), Some(&source));
        assert!(faces.iter().all(|f| f.id.is_none()));
    }

    #[test]
    fn test_extract_no_faces() {
        let faces = extract_faces(&FixedExtractor(Vec::new()), &ImageSource::Bytes(png_bytes(8, 8)))
            .unwrap();
        assert!(faces.is_empty());
    }

    #[test]
    fn test_url_and_id_unsupported() {
        let extractor = FixedExtractor(Vec::new());
        let err = extract_faces(&extractor, &ImageSource::Url("https://x/y.jpg".into())).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(ImageFormat::Url)));

        let err = extract_faces(&extractor, &ImageSource::Id(3)).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(ImageFormat::Id)));
    }

    #[test]
    fn test_unreadable_bytes() {
        let err = extract_faces(
            &FixedExtractor(Vec::new()),
            &ImageSource::Bytes(b"definitely not an image".to_vec()),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn test_missing_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        let err = extract_faces(&FixedExtractor(Vec::new()), &ImageSource::Path(path.clone()))
            .unwrap_err();
        match err {
            ExtractError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_local_path_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        std::fs::write(&path, png_bytes(16, 16)).unwrap();

        let extractor = FixedExtractor(vec![DetectedFace {
            location: (0, 4, 4, 0),
            encoding: vec![0.0; 4],
        }]);
        let faces = extract_faces(&extractor, &ImageSource::Path(path.clone())).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].source, Some(ImageSource::Path(path)));
    }

    #[test]
    fn test_probe_dimensions() {
        assert_eq!(probe_dimensions(&png_bytes(7, 3)).unwrap(), (7, 3));
    }

    #[test]
    fn test_from_command_line() {
        let ex = CommandExtractor::from_command_line("python3 encode.py --model small").unwrap();
        assert_eq!(ex.program(), Path::new("python3"));
        assert_eq!(ex.args, vec!["encode.py", "--model", "small"]);
        assert!(CommandExtractor::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_parses_output() {
        let ex = CommandExtractor::new("sh").with_args([
            "-c",
            r#"cat > /dev/null; echo '[{"location":[1,2,3,4],"encoding":[0.5,-0.25]}]'"#,
        ]);
        let faces = ex.detect(&png_bytes(4, 4)).unwrap();
        assert_eq!(
            faces,
            vec![DetectedFace {
                location: (1, 2, 3, 4),
                encoding: vec![0.5, -0.25],
            }]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_failure() {
        let ex = CommandExtractor::new("sh").with_args(["-c", "cat > /dev/null; echo boom >&2; exit 3"]);
        let err = ex.detect(b"img").unwrap_err();
        match err {
            ExtractError::Collaborator(msg) => assert!(msg.contains("boom"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_malformed_output() {
        let ex = CommandExtractor::new("sh").with_args(["-c", "cat > /dev/null; echo not-json"]);
        assert!(matches!(ex.detect(b"img"), Err(ExtractError::Collaborator(_))));
    }
}
