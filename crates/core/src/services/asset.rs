//! Upload and asset management.
//!
//! Uploads are written through a [`StorageBackend`] under per-owner folders and
//! recorded as [`file_asset`] rows. Paths are stored relative to the storage
//! root and never rewritten.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use sea_orm::Set;
use taskdesk_common::config::StorageSettings;
use taskdesk_common::{AppError, AppResult, StorageBackend, file_extension, secure_filename};
use taskdesk_db::entities::file_asset;
use taskdesk_db::repositories::FileAssetRepository;

use crate::input::now;

/// Cache lifetime of original files, in seconds.
const FILE_MAX_AGE: u32 = 3600;

/// Cache lifetime of generated thumbnails, in seconds.
const THUMB_MAX_AGE: u32 = 43_200;

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Outcome of storing a batch of uploads.
#[derive(Debug, Clone, Default)]
pub struct StoredUploads {
    pub assets: Vec<file_asset::Model>,
    /// Files rejected by the extension allow-list.
    pub skipped: usize,
}

/// Everything a handler needs to stream a stored file.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub path: PathBuf,
    pub filename: String,
    pub content_type: String,
    pub etag: String,
    pub inline: bool,
    pub max_age: u32,
    pub data: Vec<u8>,
}

impl FileDownload {
    /// `Content-Disposition` header value.
    #[must_use]
    pub fn content_disposition(&self) -> String {
        let kind = if self.inline { "inline" } else { "attachment" };
        format!("{kind}; filename=\"{}\"", self.filename.replace('"', ""))
    }

    /// `Cache-Control` header value.
    #[must_use]
    pub fn cache_control(&self) -> String {
        format!("private, max-age={}", self.max_age)
    }

    /// Quoted `ETag` header value.
    #[must_use]
    pub fn etag_header(&self) -> String {
        format!("\"{}\"", self.etag)
    }

    /// Whether an `If-None-Match` header matches this file.
    #[must_use]
    pub fn matches_etag(&self, if_none_match: &str) -> bool {
        if_none_match
            .split(',')
            .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
            .any(|tag| tag == "*" || tag == self.etag)
    }
}

/// Upload and download service.
#[derive(Clone)]
pub struct AssetService {
    storage: Arc<dyn StorageBackend>,
    asset_repo: FileAssetRepository,
    allowed_extensions: Vec<String>,
    thumbnail_size: u32,
    thumbnail_quality: u8,
}

impl AssetService {
    /// Create a new asset service.
    #[must_use]
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        asset_repo: FileAssetRepository,
        settings: &StorageSettings,
    ) -> Self {
        Self {
            storage,
            asset_repo,
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            thumbnail_size: settings.thumbnail_size,
            thumbnail_quality: settings.thumbnail_quality,
        }
    }

    /// Whether the file name carries an allow-listed extension.
    #[must_use]
    pub fn allowed(&self, filename: &str) -> bool {
        file_extension(filename).is_some_and(|ext| self.allowed_extensions.contains(&ext))
    }

    /// Store one upload under `subdir` and record it.
    pub async fn save_upload(
        &self,
        owner_id: i32,
        task_id: Option<i32>,
        kind: file_asset::AssetKind,
        subdir: &str,
        file: &UploadedFile,
    ) -> AppResult<file_asset::Model> {
        if !self.allowed(&file.filename) {
            return Err(AppError::Validation(format!(
                "File type not allowed: {}",
                file.filename
            )));
        }

        let name = secure_filename(&file.filename)
            .ok_or_else(|| AppError::Validation("Invalid file name.".to_string()))?;
        let name = self.free_name(subdir, &name).await?;
        let stored = self.storage.save(subdir, &name, &file.data).await?;

        let mime = file
            .content_type
            .clone()
            .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
            .unwrap_or_else(|| mime_for(&stored.filename).to_string());

        let model = file_asset::ActiveModel {
            owner_id: Set(owner_id),
            task_id: Set(task_id),
            kind: Set(kind),
            path: Set(stored.relative_path.clone()),
            filename: Set(stored.filename.clone()),
            mime: Set(Some(mime)),
            size_bytes: Set(stored.size as i64),
            visibility: Set("private".to_string()),
            uploaded_at: Set(now()),
            ..Default::default()
        };
        let asset = self.asset_repo.create(model).await?;

        tracing::info!(
            asset_id = asset.id,
            owner_id,
            path = %asset.path,
            size = asset.size_bytes,
            "Stored upload"
        );
        Ok(asset)
    }

    /// Store every allow-listed upload, counting the rest as skipped.
    pub async fn store_all(
        &self,
        owner_id: i32,
        task_id: Option<i32>,
        kind: file_asset::AssetKind,
        subdir: &str,
        files: &[UploadedFile],
    ) -> AppResult<StoredUploads> {
        let mut result = StoredUploads::default();
        for file in files {
            if is_blank(file) {
                continue;
            }
            if !self.allowed(&file.filename) {
                tracing::warn!(filename = %file.filename, "Skipping upload with disallowed extension");
                result.skipped += 1;
                continue;
            }
            match self.save_upload(owner_id, task_id, kind, subdir, file).await {
                Ok(asset) => result.assets.push(asset),
                Err(e) => {
                    self.discard(&result.assets).await;
                    return Err(e);
                }
            }
        }
        Ok(result)
    }

    /// Whether any upload in the batch would be stored.
    #[must_use]
    pub fn any_storable(&self, files: &[UploadedFile]) -> bool {
        files.iter().any(|f| !is_blank(f) && self.allowed(&f.filename))
    }

    /// Remove stored uploads and their rows after a failed submission.
    ///
    /// Failures are logged; the caller is already returning an error.
    pub async fn discard(&self, assets: &[file_asset::Model]) {
        for asset in assets {
            if let Err(e) = self.asset_repo.delete(asset.id).await {
                tracing::warn!(asset_id = asset.id, error = %e, "Failed to remove asset row");
            }
            if let Err(e) = self.storage.delete(&asset.path).await {
                tracing::warn!(path = %asset.path, error = %e, "Failed to remove stored upload");
            }
        }
    }

    /// Assets attached to a task.
    pub async fn task_assets(&self, task_id: i32) -> AppResult<Vec<file_asset::Model>> {
        self.asset_repo.find_by_task(task_id).await
    }

    /// Absolute path of an asset, verified to lie inside the storage root.
    pub async fn resolve_for_read(&self, asset: &file_asset::Model) -> AppResult<PathBuf> {
        self.storage.resolve_for_read(&asset.path).await
    }

    /// Load an asset for download.
    pub async fn download(&self, asset_id: i32) -> AppResult<FileDownload> {
        let asset = self.asset_repo.get_by_id(asset_id).await?;
        self.original(&asset).await
    }

    /// Load the thumbnail of an image asset, generating it on first use.
    ///
    /// Non-image assets fall back to the original file.
    pub async fn thumbnail(&self, asset_id: i32) -> AppResult<FileDownload> {
        let asset = self.asset_repo.get_by_id(asset_id).await?;
        if !is_image(&asset) {
            return self.original(&asset).await;
        }

        let thumb_path = format!("thumbs/{}_{}.jpg", asset.id, self.thumbnail_size);
        if !self.storage.exists(&thumb_path).await? {
            let source = self.storage.read(&asset.path).await?;
            let (size, quality) = (self.thumbnail_size, self.thumbnail_quality);
            let jpeg = tokio::task::spawn_blocking(move || render_thumbnail(&source, size, quality))
                .await
                .map_err(|e| AppError::Internal(format!("Thumbnail task failed: {e}")))??;
            self.storage.write(&thumb_path, &jpeg).await?;
            tracing::debug!(asset_id = asset.id, path = %thumb_path, "Generated thumbnail");
        }

        let path = self.storage.resolve_for_read(&thumb_path).await?;
        let data = tokio::fs::read(&path).await?;
        Ok(FileDownload {
            path,
            filename: format!("{}_thumb.jpg", stem(&asset.filename)),
            content_type: "image/jpeg".to_string(),
            etag: format!("{:x}", md5::compute(&data)),
            inline: true,
            max_age: THUMB_MAX_AGE,
            data,
        })
    }

    async fn original(&self, asset: &file_asset::Model) -> AppResult<FileDownload> {
        let path = self.resolve_for_read(asset).await?;
        let data = tokio::fs::read(&path).await?;
        let content_type = asset
            .mime
            .clone()
            .unwrap_or_else(|| mime_for(&asset.filename).to_string());

        Ok(FileDownload {
            path,
            filename: asset.filename.clone(),
            inline: is_inline(&content_type),
            content_type,
            etag: format!("{:x}", md5::compute(&data)),
            max_age: FILE_MAX_AGE,
            data,
        })
    }

    /// First name under `subdir` not already taken, suffixing `-1`, `-2`, ...
    async fn free_name(&self, subdir: &str, name: &str) -> AppResult<String> {
        let join = |n: &str| format!("{}/{n}", subdir.trim_matches('/'));
        if !self.storage.exists(&join(name)).await? {
            return Ok(name.to_string());
        }

        let (base, ext) = match name.rsplit_once('.') {
            Some((base, ext)) if !base.is_empty() => (base, format!(".{ext}")),
            _ => (name, String::new()),
        };
        for n in 1..1000 {
            let candidate = format!("{base}-{n}{ext}");
            if !self.storage.exists(&join(&candidate)).await? {
                return Ok(candidate);
            }
        }
        Err(AppError::Conflict(format!("Too many uploads named {name}")))
    }
}

/// Empty file inputs arrive as a part with no name and no bytes.
fn is_blank(file: &UploadedFile) -> bool {
    file.filename.trim().is_empty() && file.data.is_empty()
}

fn is_image(asset: &file_asset::Model) -> bool {
    asset.is_image() || mime_for(&asset.filename).starts_with("image/")
}

/// Whether browsers should render this type instead of downloading it.
#[must_use]
pub fn is_inline(content_type: &str) -> bool {
    ["image/", "text/", "audio/", "video/"]
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
        || content_type.starts_with("application/pdf")
}

/// Content type guessed from the file extension.
#[must_use]
pub fn mime_for(filename: &str) -> &'static str {
    match file_extension(filename).as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("ppt") => "application/vnd.ms-powerpoint",
        Some("pptx") => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("zip") => "application/zip",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

fn stem(filename: &str) -> &str {
    filename.rsplit_once('.').map_or(filename, |(stem, _)| stem)
}

/// Fit an image into a `size`x`size` box and encode it as RGB JPEG.
fn render_thumbnail(source: &[u8], size: u32, quality: u8) -> AppResult<Vec<u8>> {
    let img = image::load_from_memory(source)
        .map_err(|e| AppError::BadRequest(format!("Unreadable image: {e}")))?;
    let thumb = image::DynamicImage::ImageRgb8(img.thumbnail(size, size).to_rgb8());

    let mut out = Cursor::new(Vec::new());
    thumb
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        .map_err(|e| AppError::Internal(format!("Thumbnail encoding failed: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use taskdesk_common::LocalStorage;
    use taskdesk_db::entities::user;
    use taskdesk_db::test_utils::TestDatabase;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn setup() -> (TestDatabase, tempfile::TempDir, AssetService, i32) {
        let db = TestDatabase::in_memory().await.unwrap();
        let owner = db.seed_user("owner@example.com", user::UserRole::Client).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let service = AssetService::new(
            Arc::new(LocalStorage::new(dir.path().to_path_buf())),
            FileAssetRepository::new(db.shared()),
            &StorageSettings::default(),
        );
        (db, dir, service, owner.id)
    }

    fn upload(name: &str, data: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            content_type: None,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_allowed_is_case_insensitive() {
        let (_db, _dir, service, _) = setup().await;
        assert!(service.allowed("Brief.PDF"));
        assert!(service.allowed("photo.jpeg"));
        assert!(!service.allowed("setup.exe"));
        assert!(!service.allowed("README"));
    }

    #[tokio::test]
    async fn test_store_all_skips_disallowed() {
        let (_db, _dir, service, owner) = setup().await;
        let files = vec![
            upload("notes.txt", b"hello"),
            upload("virus.exe", b"MZ"),
            upload("notes.txt", b"second"),
        ];

        let stored = service
            .store_all(owner, None, file_asset::AssetKind::Attachment, "client/1/tasks/9", &files)
            .await
            .unwrap();

        assert_eq!(stored.skipped, 1);
        assert_eq!(stored.assets.len(), 2);
        assert_eq!(stored.assets[0].path, "client/1/tasks/9/notes.txt");
        assert_eq!(stored.assets[1].path, "client/1/tasks/9/notes-1.txt");
        assert_eq!(stored.assets[0].mime.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_discard_removes_rows_and_files() {
        let (_db, dir, service, owner) = setup().await;
        let files = vec![upload("draft.txt", b"v1"), upload("", b"")];
        assert!(service.any_storable(&files));
        assert!(!service.any_storable(&[upload("virus.exe", b"MZ"), upload("", b"")]));

        let stored = service
            .store_all(owner, None, file_asset::AssetKind::Work, "freelancer/2/tasks/9", &files)
            .await
            .unwrap();
        assert_eq!(stored.assets.len(), 1);
        let on_disk = dir.path().join(&stored.assets[0].path);
        assert!(on_disk.exists());

        service.discard(&stored.assets).await;
        assert!(!on_disk.exists());
        assert!(matches!(
            service.download(stored.assets[0].id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_metadata() {
        let (_db, _dir, service, owner) = setup().await;
        let asset = service
            .save_upload(
                owner,
                None,
                file_asset::AssetKind::Attachment,
                "client/1",
                &upload("sheet.xlsx", b"PK"),
            )
            .await
            .unwrap();

        let download = service.download(asset.id).await.unwrap();
        assert!(!download.inline);
        assert_eq!(download.etag, format!("{:x}", md5::compute(b"PK")));
        assert_eq!(download.cache_control(), "private, max-age=3600");
        assert!(download.matches_etag(&download.etag_header()));
        assert!(download.content_disposition().starts_with("attachment;"));
    }

    #[tokio::test]
    async fn test_thumbnail_is_generated_once() {
        let (_db, dir, service, owner) = setup().await;
        let asset = service
            .save_upload(
                owner,
                None,
                file_asset::AssetKind::Attachment,
                "client/1",
                &upload("cover.png", &png(640, 480)),
            )
            .await
            .unwrap();

        let thumb = service.thumbnail(asset.id).await.unwrap();
        assert_eq!(thumb.content_type, "image/jpeg");
        assert_eq!(thumb.max_age, THUMB_MAX_AGE);
        let decoded = image::load_from_memory(&thumb.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (320, 240));

        let cached = dir.path().join(format!("thumbs/{}_320.jpg", asset.id));
        assert!(cached.exists());
        let again = service.thumbnail(asset.id).await.unwrap();
        assert_eq!(again.etag, thumb.etag);
    }

    #[tokio::test]
    async fn test_thumbnail_of_document_falls_back() {
        let (_db, _dir, service, owner) = setup().await;
        let asset = service
            .save_upload(
                owner,
                None,
                file_asset::AssetKind::Work,
                "freelancer/2",
                &upload("report.pdf", b"%PDF-1.4"),
            )
            .await
            .unwrap();

        let thumb = service.thumbnail(asset.id).await.unwrap();
        assert_eq!(thumb.content_type, "application/pdf");
        assert!(thumb.inline);
        assert_eq!(thumb.data, b"%PDF-1.4");
    }

    #[test]
    fn test_inline_types() {
        assert!(is_inline("image/png"));
        assert!(is_inline("application/pdf"));
        assert!(is_inline("text/plain"));
        assert!(!is_inline("application/zip"));
    }
}
