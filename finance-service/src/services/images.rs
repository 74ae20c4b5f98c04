use std::path::PathBuf;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use service_core::error::AppError;
use tokio::fs;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// A decoded, validated image upload.
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub extension: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    /// Decode a base64 upload. Only the extension of `file_name` is kept;
    /// the stored name is generated.
    pub fn decode(file_name: &str, content_base64: &str) -> Result<Self, AppError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Unsupported image '{}', expected one of {:?}",
                    file_name,
                    ALLOWED_EXTENSIONS
                ))
            })?;

        let data = STANDARD.decode(content_base64.trim()).map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Image '{}' is not valid base64: {}", file_name, e))
        })?;

        if data.is_empty() || data.len() > MAX_IMAGE_BYTES {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Image '{}' must be between 1 byte and {} bytes",
                file_name,
                MAX_IMAGE_BYTES
            )));
        }

        Ok(Self { extension, data })
    }
}

/// Where uploaded images live. Entities store the relative paths returned
/// by [`save_images`](ImageStore::save_images).
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save_images(
        &self,
        files: Vec<ImageFile>,
        folder: &str,
        item_id: Uuid,
    ) -> Result<Vec<String>, AppError>;

    fn image_url(&self, path: &str) -> String;

    async fn image_exists(&self, path: &str) -> bool;

    /// Best-effort removal, used when the owning write fails.
    async fn delete_images(&self, paths: &[String]);
}

pub struct LocalImageStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Relative paths only; anything climbing out of the base is refused.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        if path.split('/').any(|part| part == ".." || part.is_empty()) {
            return None;
        }
        Some(self.base_path.join(path))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save_images(
        &self,
        files: Vec<ImageFile>,
        folder: &str,
        item_id: Uuid,
    ) -> Result<Vec<String>, AppError> {
        let mut saved = Vec::with_capacity(files.len());
        for file in files {
            let relative = format!("{}/{}/{}.{}", folder, item_id, Uuid::new_v4(), file.extension);
            let path = self.base_path.join(&relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            if let Err(e) = fs::write(&path, &file.data).await {
                self.delete_images(&saved).await;
                return Err(e.into());
            }
            saved.push(relative);
        }

        if !saved.is_empty() {
            tracing::debug!(folder, item_id = %item_id, count = saved.len(), "Saved images");
        }
        Ok(saved)
    }

    fn image_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path)
    }

    async fn image_exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Some(full) => fs::try_exists(full).await.unwrap_or(false),
            None => false,
        }
    }

    async fn delete_images(&self, paths: &[String]) {
        for path in paths {
            let Some(full) = self.resolve(path) else {
                continue;
            };
            if let Err(e) = fs::remove_file(&full).await {
                tracing::warn!(path = %path, error = %e, "Failed to delete image");
            }
        }
    }
}
