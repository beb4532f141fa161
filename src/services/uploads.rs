//! Local storage for uploaded cover and profile images

use std::path::{Path, PathBuf};

use crate::{
    config::UploadsConfig,
    error::{AppError, AppResult},
};

/// A file received in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Image types accepted for covers and profile pictures
fn image_extension(content_type: Option<&str>, file_name: Option<&str>) -> Option<&'static str> {
    match content_type.map(|c| c.to_ascii_lowercase()).as_deref() {
        Some("image/png") => return Some("png"),
        Some("image/jpeg") | Some("image/jpg") => return Some("jpg"),
        Some("image/gif") => return Some("gif"),
        Some("image/webp") => return Some("webp"),
        _ => {}
    }

    let ext = Path::new(file_name?).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("png"),
        "jpg" | "jpeg" => Some("jpg"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct UploadService {
    dir: PathBuf,
    url_prefix: String,
    max_size_bytes: usize,
}

impl UploadService {
    pub fn new(config: &UploadsConfig) -> Self {
        Self {
            dir: PathBuf::from(&config.dir),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
            max_size_bytes: config.max_size_bytes,
        }
    }

    /// Store an image under a fresh name and return its public URL
    pub async fn store_image(&self, file: &UploadedFile) -> AppResult<String> {
        if file.bytes.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        if file.bytes.len() > self.max_size_bytes {
            return Err(AppError::Validation(format!(
                "Uploaded file exceeds {} bytes",
                self.max_size_bytes
            )));
        }
        let ext = image_extension(file.content_type.as_deref(), file.file_name.as_deref())
            .ok_or_else(|| {
                AppError::Validation("Only PNG, JPEG, GIF and WebP images are accepted".to_string())
            })?;

        tokio::fs::create_dir_all(&self.dir).await?;

        let name = format!("{}.{}", uuid::Uuid::new_v4(), ext);
        tokio::fs::write(self.dir.join(&name), &file.bytes).await?;

        tracing::debug!("Stored upload {} ({} bytes)", name, file.bytes.len());

        Ok(format!("{}/{}", self.url_prefix, name))
    }

    /// Local path of a stored file, if `url` points into the upload directory
    fn local_path(&self, url: &str) -> Option<PathBuf> {
        let name = url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(self.dir.join(name))
    }

    /// Delete a stored file. Failures are logged, not returned.
    pub async fn remove(&self, url: &str) {
        let Some(path) = self.local_path(url) else {
            tracing::debug!("Not removing {}: outside upload directory", url);
            return;
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove upload {}: {}", path.display(), e);
        }
    }
}
