use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::ffmpeg::FrameExtractor;
use crate::storage::{generate_name, Storage};

#[derive(Debug, Error)]
pub enum InlineThumbnailError {
    #[error("not a base64 data URL")]
    NotDataUrl,

    #[error("unexpected media type {0}")]
    NotImage(String),

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("unsupported image encoding")]
    UnsupportedEncoding,
}

/// Decode a `data:image/<subtype>;base64,<data>` payload.
///
/// Returns the image bytes and the extension of the detected encoding. The
/// declared subtype is only checked for the `image/` prefix; the bytes decide.
pub fn decode_inline(payload: &str) -> Result<(Vec<u8>, &'static str), InlineThumbnailError> {
    let rest = payload
        .trim()
        .strip_prefix("data:")
        .ok_or(InlineThumbnailError::NotDataUrl)?;
    let (mime, data) = rest
        .split_once(";base64,")
        .ok_or(InlineThumbnailError::NotDataUrl)?;
    if !mime.starts_with("image/") {
        return Err(InlineThumbnailError::NotImage(mime.to_string()));
    }

    let bytes = STANDARD.decode(data)?;
    let ext = match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(ImageFormat::Gif) => "gif",
        Ok(ImageFormat::WebP) => "webp",
        _ => return Err(InlineThumbnailError::UnsupportedEncoding),
    };

    Ok((bytes, ext))
}

/// Picks a thumbnail for a staged video: inline image first, then a frame
/// extracted from the video, otherwise none. Never fails the upload.
#[derive(Clone)]
pub struct ThumbnailResolver {
    storage: Storage,
    extractor: Arc<dyn FrameExtractor>,
    slots: Arc<Semaphore>,
    offset_seconds: f64,
}

impl ThumbnailResolver {
    pub fn new(
        storage: Storage,
        extractor: Arc<dyn FrameExtractor>,
        max_concurrent_extractions: usize,
        offset_seconds: f64,
    ) -> Self {
        Self {
            storage,
            extractor,
            slots: Arc::new(Semaphore::new(max_concurrent_extractions.max(1))),
            offset_seconds,
        }
    }

    pub async fn resolve(&self, video_name: &str, inline: Option<&str>) -> Option<String> {
        if let Some(payload) = inline.filter(|p| !p.trim().is_empty()) {
            match self.store_inline(payload).await {
                Ok(name) => {
                    info!("[thumbnail] 🖼️  Using client thumbnail {}", name);
                    return Some(name);
                }
                Err(e) => warn!("[thumbnail] Inline thumbnail rejected: {}", e),
            }
        }

        self.extract(video_name).await
    }

    async fn store_inline(&self, payload: &str) -> anyhow::Result<String> {
        let (bytes, ext) = decode_inline(payload)?;
        let name = generate_name(Some(ext));
        if let Err(e) = tokio::fs::write(self.storage.path(&name), &bytes).await {
            let _ = self.storage.remove_if_present(&name).await;
            return Err(e.into());
        }
        Ok(name)
    }

    async fn extract(&self, video_name: &str) -> Option<String> {
        let _permit = match self.slots.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("[thumbnail] Extraction pool closed: {}", e);
                return None;
            }
        };

        let name = generate_name(Some("jpg"));
        let destination = self.storage.path(&name);
        let source = self.storage.path(video_name);

        match self
            .extractor
            .extract_frame(&source, self.offset_seconds, &destination)
            .await
        {
            Ok(()) => {
                info!("[thumbnail] 🎞️  Extracted frame at {:.1}s -> {}", self.offset_seconds, name);
                Some(name)
            }
            Err(e) => {
                warn!("[thumbnail] Server-side thumbnail generation failed: {}", e);
                if let Err(e) = self.storage.remove_if_present(&name).await {
                    warn!("[thumbnail] Failed to remove partial thumbnail {}: {}", name, e);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::ExtractionError;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    struct StubExtractor {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl FrameExtractor for StubExtractor {
        async fn extract_frame(
            &self,
            _source: &Path,
            _offset_seconds: f64,
            destination: &Path,
        ) -> Result<(), ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                tokio::fs::write(destination, b"frame").await.map_err(ExtractionError::Spawn)?;
                Ok(())
            } else {
                Err(ExtractionError::ToolNotFound("ffmpeg".into()))
            }
        }
    }

    fn resolver(dir: &Path, succeed: bool) -> (ThumbnailResolver, Arc<StubExtractor>) {
        let stub = Arc::new(StubExtractor {
            calls: AtomicUsize::new(0),
            succeed,
        });
        let resolver = ThumbnailResolver::new(Storage::new(dir), stub.clone(), 2, 1.0);
        (resolver, stub)
    }

    fn png_data_url() -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(PNG_MAGIC))
    }

    #[test]
    fn decode_inline_detects_encoding_from_bytes() {
        // declared jpeg, actually png
        let payload = format!("data:image/jpeg;base64,{}", STANDARD.encode(PNG_MAGIC));
        let (bytes, ext) = decode_inline(&payload).unwrap();
        assert_eq!(bytes, PNG_MAGIC);
        assert_eq!(ext, "png");
    }

    #[test]
    fn decode_inline_rejects_bad_payloads() {
        assert!(matches!(
            decode_inline("not a data url"),
            Err(InlineThumbnailError::NotDataUrl)
        ));
        assert!(matches!(
            decode_inline("data:text/plain;base64,aGVsbG8="),
            Err(InlineThumbnailError::NotImage(_))
        ));
        assert!(matches!(
            decode_inline("data:image/png;base64,!!!"),
            Err(InlineThumbnailError::Base64(_))
        ));
        assert!(matches!(
            decode_inline("data:image/png;base64,aGVsbG8="),
            Err(InlineThumbnailError::UnsupportedEncoding)
        ));
    }

    #[tokio::test]
    async fn inline_thumbnail_wins_over_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, stub) = resolver(dir.path(), true);

        let name = resolver.resolve("video.mp4", Some(&png_data_url())).await.unwrap();

        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), PNG_MAGIC);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_inline_falls_back_to_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, stub) = resolver(dir.path(), true);

        let name = resolver
            .resolve("video.mp4", Some("data:image/png;base64,@@@"))
            .await
            .unwrap();

        assert!(name.ends_with(".jpg"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extraction_failure_yields_no_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let (resolver, stub) = resolver(dir.path(), false);

        assert_eq!(resolver.resolve("video.mp4", None).await, None);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
