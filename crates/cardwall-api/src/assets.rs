use std::io::Write;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use image::GenericImageView;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cardwall_types::models::AssetKind;

/// 5 MB default ceiling for any uploaded image
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_BANNER_MAX: Dimensions = Dimensions {
    width: 1200,
    height: 400,
};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("image is larger than the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    #[error("unsupported image format (expected JPEG, PNG or GIF)")]
    UnsupportedFormat,

    #[error("image is {width}x{height}, the maximum is {max_width}x{max_height}")]
    DimensionTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("image could not be decoded: {0}")]
    InvalidImageData(String),

    #[error("invalid asset reference: {0:?}")]
    InvalidReference(String),

    #[error("asset storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("asset task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Size ceilings applied to uploads.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_image_bytes: usize,
    pub banner_max: Dimensions,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            banner_max: DEFAULT_BANNER_MAX,
        }
    }
}

/// Image formats accepted for upload, identified by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
}

impl ImageFormat {
    /// Identify the format from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::Gif => ".gif",
        }
    }

    fn decoder_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Gif => image::ImageFormat::Gif,
        }
    }
}

/// Absolute URL for a stored asset. Empty references stay empty.
pub fn resolve(asset_ref: &str, base_url: &str) -> String {
    if asset_ref.is_empty() {
        String::new()
    } else {
        format!("{base_url}{asset_ref}")
    }
}

/// On-disk image storage.
///
/// Every asset is a single flat file at `{dir}/{kind}_{random}{ext}`. Uploads are staged in a
/// hidden temp file inside `dir` and renamed into place, so a failed ingest never leaves a file
/// behind and readers never observe a partial one.
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub async fn new(dir: PathBuf) -> Result<Self, AssetError> {
        fs::create_dir_all(&dir).await?;
        info!("Asset directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a stored asset. Only plain generated filenames are accepted.
    pub fn file_path(&self, asset_ref: &str) -> Result<PathBuf, AssetError> {
        if !is_plain_filename(asset_ref) {
            return Err(AssetError::InvalidReference(asset_ref.to_string()));
        }
        Ok(self.dir.join(asset_ref))
    }

    /// Validate an upload and persist it. Returns the new asset's filename.
    ///
    /// `dimension_limit` is only enforced for banners.
    pub async fn ingest(
        &self,
        bytes: Bytes,
        kind: AssetKind,
        size_limit: usize,
        dimension_limit: Option<Dimensions>,
    ) -> Result<String, AssetError> {
        if bytes.len() > size_limit {
            return Err(AssetError::PayloadTooLarge { limit: size_limit });
        }

        let format = ImageFormat::sniff(&bytes).ok_or(AssetError::UnsupportedFormat)?;
        let dimension_limit = dimension_limit.filter(|_| kind == AssetKind::Banner);

        let dir = self.dir.clone();
        let filename = tokio::task::spawn_blocking(move || {
            if let Some(max) = dimension_limit {
                check_dimensions(&bytes, format, max)?;
            }
            write_asset(&dir, &bytes, kind, format)
        })
        .await
        .map_err(|e| AssetError::Task(e.to_string()))??;

        info!("Stored {:?} asset {}", kind, filename);
        Ok(filename)
    }

    /// Delete an asset. Empty references and already-missing files are fine.
    pub async fn remove(&self, asset_ref: &str) -> Result<(), AssetError> {
        if asset_ref.is_empty() {
            return Ok(());
        }

        let path = self.file_path(asset_ref)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted asset {}", asset_ref);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Asset {} already gone", asset_ref);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `remove` for cleanup paths: failures are logged, not returned.
    pub async fn discard(&self, asset_ref: &str) {
        if let Err(e) = self.remove(asset_ref).await {
            warn!("Failed to delete asset {}: {}", asset_ref, e);
        }
    }
}

fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|f| f == name)
}

fn check_dimensions(bytes: &[u8], format: ImageFormat, max: Dimensions) -> Result<(), AssetError> {
    let img = image::load_from_memory_with_format(bytes, format.decoder_format())
        .map_err(|e| AssetError::InvalidImageData(e.to_string()))?;

    let (width, height) = img.dimensions();
    if width > max.width || height > max.height {
        return Err(AssetError::DimensionTooLarge {
            width,
            height,
            max_width: max.width,
            max_height: max.height,
        });
    }
    Ok(())
}

fn write_asset(
    dir: &Path,
    bytes: &[u8],
    kind: AssetKind,
    format: ImageFormat,
) -> Result<String, AssetError> {
    let filename = format!(
        "{}_{}{}",
        kind.prefix(),
        Uuid::new_v4().simple(),
        format.extension()
    );

    // Dropping the temp file on any error path unlinks it.
    let mut tmp = tempfile::Builder::new()
        .prefix(".ingest-")
        .suffix(".part")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(dir.join(&filename))
        .map_err(|e| AssetError::Io(e.error))?;

    Ok(filename)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;
    use std::path::Path;

    pub fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    pub fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{file_count, png};
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (AssetStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = AssetStore::new(tmp.path().join("uploads")).await.unwrap();
        (store, tmp)
    }

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(&png(1, 1)), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"GIF89a\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"GIF87a\x01\x00"), Some(ImageFormat::Gif));
    }

    #[test]
    fn rejects_unknown_content() {
        assert_eq!(ImageFormat::sniff(b"%PDF-1.7"), None);
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBP"), None);
        assert_eq!(ImageFormat::sniff(&[0x89, b'P', b'N']), None);
        assert_eq!(ImageFormat::sniff(&[]), None);
    }

    #[test]
    fn resolve_joins_base_url() {
        assert_eq!(resolve("", "http://x/uploads/"), "");
        assert_eq!(
            resolve("card_abc.png", "http://x/uploads/"),
            "http://x/uploads/card_abc.png"
        );
    }

    #[test]
    fn only_plain_filenames_are_references() {
        assert!(is_plain_filename("card_abc.png"));
        assert!(!is_plain_filename(""));
        assert!(!is_plain_filename("../etc/passwd"));
        assert!(!is_plain_filename("a/b.png"));
        assert!(!is_plain_filename("a\\b.png"));
        assert!(!is_plain_filename(".ingest-x.part"));
        assert!(!is_plain_filename(".."));
    }

    #[tokio::test]
    async fn ingest_names_file_after_sniffed_format() {
        let (store, _tmp) = store().await;

        let name = store
            .ingest(Bytes::from(png(4, 4)), AssetKind::Card, DEFAULT_MAX_IMAGE_BYTES, None)
            .await
            .unwrap();
        assert!(name.starts_with("card_"));
        assert!(name.ends_with(".png"));
        assert!(store.dir().join(&name).exists());
        assert_eq!(file_count(store.dir()), 1);

        // JPEG magic with no real payload is fine when nothing needs decoding
        let jpeg = Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        let name = store
            .ingest(jpeg, AssetKind::Profile, DEFAULT_MAX_IMAGE_BYTES, None)
            .await
            .unwrap();
        assert!(name.starts_with("profile_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(file_count(store.dir()), 2);
    }

    #[tokio::test]
    async fn rejected_uploads_leave_no_files() {
        let (store, _tmp) = store().await;
        let banner_max = Dimensions {
            width: 20,
            height: 10,
        };

        let too_big = store
            .ingest(Bytes::from(png(4, 4)), AssetKind::Card, 16, None)
            .await;
        assert!(matches!(too_big, Err(AssetError::PayloadTooLarge { limit: 16 })));

        let pdf = store
            .ingest(
                Bytes::from_static(b"%PDF-1.7 not an image"),
                AssetKind::Card,
                DEFAULT_MAX_IMAGE_BYTES,
                None,
            )
            .await;
        assert!(matches!(pdf, Err(AssetError::UnsupportedFormat)));

        let wide = store
            .ingest(
                Bytes::from(png(21, 5)),
                AssetKind::Banner,
                DEFAULT_MAX_IMAGE_BYTES,
                Some(banner_max),
            )
            .await;
        assert!(matches!(
            wide,
            Err(AssetError::DimensionTooLarge {
                width: 21,
                height: 5,
                ..
            })
        ));

        let mut corrupt = png(4, 4);
        corrupt.truncate(20);
        let corrupt = store
            .ingest(
                Bytes::from(corrupt),
                AssetKind::Banner,
                DEFAULT_MAX_IMAGE_BYTES,
                Some(banner_max),
            )
            .await;
        assert!(matches!(corrupt, Err(AssetError::InvalidImageData(_))));

        assert_eq!(file_count(store.dir()), 0);
    }

    #[tokio::test]
    async fn dimension_limit_only_applies_to_banners() {
        let (store, _tmp) = store().await;
        let max = Dimensions {
            width: 2,
            height: 2,
        };

        let name = store
            .ingest(Bytes::from(png(8, 8)), AssetKind::Profile, DEFAULT_MAX_IMAGE_BYTES, Some(max))
            .await
            .unwrap();
        assert!(name.starts_with("profile_"));

        let banner = store
            .ingest(
                Bytes::from(png(2, 2)),
                AssetKind::Banner,
                DEFAULT_MAX_IMAGE_BYTES,
                Some(max),
            )
            .await
            .unwrap();
        assert!(banner.starts_with("banner_"));
        assert_eq!(file_count(store.dir()), 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (store, _tmp) = store().await;
        let name = store
            .ingest(Bytes::from(png(2, 2)), AssetKind::Card, DEFAULT_MAX_IMAGE_BYTES, None)
            .await
            .unwrap();
        assert_eq!(
            resolve(&name, "http://localhost:3000/uploads/"),
            format!("http://localhost:3000/uploads/{name}")
        );

        store.remove(&name).await.unwrap();
        assert!(!store.dir().join(&name).exists());
        store.remove(&name).await.unwrap();
        store.remove("").await.unwrap();

        assert!(matches!(
            store.remove("../outside.png").await,
            Err(AssetError::InvalidReference(_))
        ));
    }
}
