//! File-backed image source.
//!
//! Stands in for the platform camera and photo library: each operation reads
//! a configured file. An unset path means the user backed out.

use async_trait::async_trait;
use rollcall_core::{ImageOrigin, ImageOutcome, ImageRef, ImageSource};
use std::path::{Path, PathBuf};

/// Face++ rejects images whose base64 encoding exceeds 2 MB.
pub const MAX_ENCODED_BYTES: usize = 2 * 1024 * 1024;

/// Largest raw image whose base64 encoding fits in [`MAX_ENCODED_BYTES`].
pub const MAX_IMAGE_BYTES: usize = MAX_ENCODED_BYTES / 4 * 3;

#[derive(Debug, Clone, Default)]
pub struct FileImageSource {
    capture_path: Option<PathBuf>,
    library_path: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new(capture_path: Option<PathBuf>, library_path: Option<PathBuf>) -> Self {
        Self {
            capture_path,
            library_path,
        }
    }

    async fn load(path: Option<&Path>, origin: ImageOrigin) -> ImageOutcome {
        let Some(path) = path else {
            return ImageOutcome::Cancelled;
        };
        let location = path.display().to_string();

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > MAX_IMAGE_BYTES as u64 => {
                tracing::warn!(%origin, path = %location, bytes = meta.len(), "image too large");
                return ImageOutcome::Failed(format!(
                    "{location}: {}",
                    too_large(meta.len())
                ));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%origin, path = %location, error = %e, "failed to stat image");
                return ImageOutcome::Failed(format!("{location}: {e}"));
            }
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%origin, path = %location, error = %e, "failed to read image");
                return ImageOutcome::Failed(format!("{location}: {e}"));
            }
        };

        match validate(&bytes) {
            Ok(format) => {
                tracing::debug!(%origin, path = %location, format, bytes = bytes.len(), "image loaded");
                ImageOutcome::Image(ImageRef::new(origin, location, bytes).with_format(format))
            }
            Err(reason) => ImageOutcome::Failed(format!("{location}: {reason}")),
        }
    }
}

/// Check the bytes look like an image the face service will accept and
/// return the sniffed format's file extension.
fn validate(bytes: &[u8]) -> Result<&'static str, String> {
    if bytes.is_empty() {
        return Err("file is empty".into());
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(too_large(bytes.len() as u64));
    }
    let format = image::guess_format(bytes).map_err(|_| "not a recognised image format".to_string())?;
    Ok(format.extensions_str().first().copied().unwrap_or("image"))
}

fn too_large(len: u64) -> String {
    format!("image is {len} bytes, limit is {MAX_IMAGE_BYTES} (2 MB once base64 encoded)")
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn capture(&self) -> ImageOutcome {
        Self::load(self.capture_path.as_deref(), ImageOrigin::Camera).await
    }

    async fn pick_from_library(&self) -> ImageOutcome {
        Self::load(self.library_path.as_deref(), ImageOrigin::Library).await
    }
}
