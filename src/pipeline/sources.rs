use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use serde::{Deserialize, Serialize};

use crate::{errors::AcquireError, permissions::Capability};

const JPEG_QUALITY: u8 = 80;
const MAX_EDGE_PX: u32 = 2048;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    #[default]
    Camera,
    Gallery,
    Screenshot,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Camera => "camera",
            SourceKind::Gallery => "gallery",
            SourceKind::Screenshot => "screenshot",
        }
    }

    /// The permission that must be held before this source may be invoked.
    pub fn capability(&self) -> Capability {
        match self {
            SourceKind::Camera => Capability::Camera,
            SourceKind::Gallery => Capability::Media,
            SourceKind::Screenshot => Capability::Screenshot,
        }
    }
}

/// Encoded still image, base64 as the analysis service expects it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ImagePayload(String);

impl ImagePayload {
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Captured(ImagePayload),
    /// The user backed out without producing an image.
    Cancelled,
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn acquire(&self) -> Result<Acquisition, AcquireError>;
}

/// Reads a picked image from disk and normalizes it to a bounded JPEG.
pub struct FileImageSource {
    kind: SourceKind,
    path: Option<PathBuf>,
}

impl FileImageSource {
    pub fn new(kind: SourceKind, path: Option<PathBuf>) -> Self {
        Self { kind, path }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn acquire(&self) -> Result<Acquisition, AcquireError> {
        let Some(path) = self.path.clone() else {
            return Ok(Acquisition::Cancelled);
        };
        if !path.exists() {
            return Ok(Acquisition::Cancelled);
        }

        let bytes = tokio::fs::read(&path).await?;
        let payload = tokio::task::spawn_blocking(move || encode_for_upload(&bytes))
            .await
            .map_err(|err| AcquireError::Host(format!("encoder worker join failed: {err}")))??;

        log::info!(
            "Acquired {} ({} base64 bytes) from {}",
            path.display(),
            payload.len(),
            self.kind.as_str()
        );
        Ok(Acquisition::Captured(payload))
    }
}

/// Decodes any supported format, downsizes oversized images, and re-encodes
/// as JPEG so uploads stay small.
pub fn encode_for_upload(bytes: &[u8]) -> Result<ImagePayload, AcquireError> {
    let decoded = image::load_from_memory(bytes)?;
    let resized = if decoded.width() > MAX_EDGE_PX || decoded.height() > MAX_EDGE_PX {
        decoded.resize(MAX_EDGE_PX, MAX_EDGE_PX, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = resized.to_rgb8();

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(ImagePayload::from_bytes(&buffer))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn temp_png(width: u32, height: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("is-this-true-{}.png", uuid::Uuid::new_v4()));
        image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn gallery_is_gated_by_media() {
        assert_eq!(SourceKind::Gallery.capability(), Capability::Media);
        assert_eq!(SourceKind::Camera.capability(), Capability::Camera);
        assert_eq!(SourceKind::Screenshot.capability(), Capability::Screenshot);
    }

    #[tokio::test]
    async fn missing_pick_is_a_cancellation() {
        let source = FileImageSource::new(SourceKind::Gallery, None);
        assert_eq!(source.acquire().await.unwrap(), Acquisition::Cancelled);

        let gone = FileImageSource::new(
            SourceKind::Gallery,
            Some(std::env::temp_dir().join("is-this-true-does-not-exist.png")),
        );
        assert_eq!(gone.acquire().await.unwrap(), Acquisition::Cancelled);
    }

    #[tokio::test]
    async fn encodes_picked_file_as_jpeg() {
        let path = temp_png(16, 8);
        let source = FileImageSource::new(SourceKind::Gallery, Some(path.clone()));
        let Acquisition::Captured(payload) = source.acquire().await.unwrap() else {
            panic!("expected an image");
        };
        let bytes = STANDARD.decode(payload.as_str()).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn downsizes_oversized_images() {
        let img = image::RgbImage::from_pixel(MAX_EDGE_PX * 2, 10, image::Rgb([0, 0, 0]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, image::ImageFormat::Png).unwrap();

        let payload = encode_for_upload(png.get_ref()).unwrap();
        let decoded = image::load_from_memory(&STANDARD.decode(payload.as_str()).unwrap()).unwrap();
        assert_eq!(decoded.width(), MAX_EDGE_PX);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            encode_for_upload(b"not an image"),
            Err(AcquireError::Decode(_))
        ));
    }
}
