//! Input-image ingestion.
//!
//! Decodes an inbound base64 image payload, normalizes it to an
//! RGB/grayscale PNG, and writes it into the engine's input directory
//! under a per-request unique name. The returned [`IngestedImage`] is
//! an RAII guard: the artifact is request-scoped and removed on drop,
//! on every exit path.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use image::DynamicImage;

use crate::error::CoreError;

/// A decoded, normalized input image on disk, readable by the engine.
///
/// Dropping the guard removes the file. Removal is best-effort: a
/// failure is logged, never raised.
#[derive(Debug)]
pub struct IngestedImage {
    path: PathBuf,
    filename: String,
}

impl IngestedImage {
    /// File name (without directory) to reference from workflows.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IngestedImage {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed ingested input image");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove ingested input image",
                );
            }
        }
    }
}

/// Decode `payload` and write it into `input_dir` as a normalized PNG.
///
/// `payload` may be plain base64 or a data URL (`data:image/...;base64,...`);
/// for data URLs only the substring after the first comma is decoded.
/// Decoding failures are [`CoreError::InvalidImage`] and happen before
/// any filesystem write; write or verification failures are
/// [`CoreError::Storage`].
pub fn ingest_input_image(payload: &str, input_dir: &Path) -> Result<IngestedImage, CoreError> {
    let decoded = decode_image_payload(payload)?;
    let normalized = normalize(decoded);

    std::fs::create_dir_all(input_dir)
        .map_err(|e| CoreError::Storage(format!("Failed to create input directory: {e}")))?;

    let filename = format!("input_{}.png", uuid::Uuid::new_v4().simple());
    let path = input_dir.join(&filename);

    normalized
        .save_with_format(&path, image::ImageFormat::Png)
        .map_err(|e| CoreError::Storage(format!("Failed to save input image: {e}")))?;

    // Re-open and decode the artifact so a corrupt write fails here,
    // not inside the engine.
    if let Err(e) = image::open(&path) {
        let _ = std::fs::remove_file(&path);
        return Err(CoreError::Storage(format!(
            "Saved image verification failed: {e}"
        )));
    }

    tracing::info!(
        filename = %filename,
        width = normalized.width(),
        height = normalized.height(),
        "Ingested input image",
    );

    Ok(IngestedImage { path, filename })
}

/// Decode a base64 (optionally data-URL-prefixed) payload into an image.
fn decode_image_payload(payload: &str) -> Result<DynamicImage, CoreError> {
    let encoded = if payload.starts_with("data:") {
        payload
            .split_once(',')
            .map(|(_, rest)| rest)
            .unwrap_or(payload)
    } else {
        payload
    };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| CoreError::InvalidImage(format!("base64 decode failed: {e}")))?;

    image::load_from_memory(&bytes)
        .map_err(|e| CoreError::InvalidImage(format!("image decode failed: {e}")))
}

/// Flatten alpha and convert exotic modes: anything that is not
/// already RGB or grayscale becomes RGB.
fn normalize(decoded: DynamicImage) -> DynamicImage {
    match decoded {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => decoded,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, RgbaImage};

    fn png_base64(width: u32, height: u32) -> String {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn plain_base64_round_trips_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let ingested = ingest_input_image(&png_base64(17, 9), dir.path()).unwrap();

        let reopened = image::open(ingested.path()).unwrap();
        assert_eq!(reopened.dimensions(), (17, 9));
        // Alpha was flattened away.
        assert_eq!(reopened.color().channel_count(), 3);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let payload = format!("data:image/png;base64,{}", png_base64(4, 4));
        let ingested = ingest_input_image(&payload, dir.path()).unwrap();
        assert!(ingested.path().exists());
    }

    #[test]
    fn malformed_base64_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest_input_image("!!!not-base64!!!", dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidImage(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn undecodable_bytes_fail_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let payload = base64::engine::general_purpose::STANDARD.encode(b"just text, no image");
        let err = ingest_input_image(&payload, dir.path()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidImage(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn drop_removes_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let ingested = ingest_input_image(&png_base64(4, 4), dir.path()).unwrap();
            ingested.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn filenames_are_unique_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let payload = png_base64(4, 4);
        let a = ingest_input_image(&payload, dir.path()).unwrap();
        let b = ingest_input_image(&payload, dir.path()).unwrap();
        assert_ne!(a.filename(), b.filename());
    }
}
