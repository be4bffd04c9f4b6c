//! Image type checks and the filesystem mirror of uploaded images.
//!
//! The database row is the source of truth. Files under
//! `{public}/image/{id}.{ext}` are a mirror that the static file service can
//! answer directly; they are written on upload and restored on read.

use std::path::{Path, PathBuf};

/// Largest accepted image payload.
pub const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    /// Classify a declared content type. Matches loosely, so `image/pjpeg`
    /// counts as JPEG.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.contains("jpeg") {
            Some(ImageKind::Jpeg)
        } else if content_type.contains("png") {
            Some(ImageKind::Png)
        } else if content_type.contains("gif") {
            Some(ImageKind::Gif)
        } else {
            None
        }
    }

    /// Exact match against a stored MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext {
            "jpg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
        }
    }

    pub fn ext(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Gif => "gif",
        }
    }
}

/// Why an upload was refused. The display text is shown to the user as a
/// flash notice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("An image is required")]
    Missing,

    #[error("Only jpg, png and gif images can be posted")]
    UnsupportedType,

    #[error("The file is too large")]
    TooLarge,
}

/// Check an upload's declared type and size.
pub fn validate_upload(content_type: Option<&str>, len: usize) -> Result<ImageKind, UploadRejection> {
    let kind = content_type
        .and_then(ImageKind::from_content_type)
        .ok_or(UploadRejection::UnsupportedType)?;

    if len > UPLOAD_LIMIT {
        return Err(UploadRejection::TooLarge);
    }

    Ok(kind)
}

/// Split `"{id}.{ext}"` from the image route.
pub fn parse_image_file(file: &str) -> Option<(i64, &str)> {
    let (id, ext) = file.rsplit_once('.')?;
    let id = id.parse().ok()?;
    Some((id, ext))
}

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Mirror files live in `{public_dir}/image`.
    pub fn new(public_dir: &Path) -> Self {
        Self {
            dir: public_dir.join("image"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, post_id: i64, kind: ImageKind) -> PathBuf {
        self.dir.join(format!("{}.{}", post_id, kind.ext()))
    }

    pub async fn write(&self, post_id: i64, kind: ImageKind, data: &[u8]) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(post_id, kind), data).await
    }

    /// Restore the mirror file if it is missing. Failures are logged only.
    pub async fn ensure(&self, post_id: i64, kind: ImageKind, data: &[u8]) {
        let path = self.path_for(post_id, kind);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return;
        }
        if let Err(e) = self.write(post_id, kind, data).await {
            tracing::warn!(post_id, error = %e, "Failed to mirror image");
        }
    }
}
