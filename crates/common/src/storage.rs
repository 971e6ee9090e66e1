//! Upload storage on the local filesystem.
//!
//! Files are written below a single storage root and addressed by a path
//! relative to that root. Every read re-verifies that the resolved path is
//! still inside the root.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, AppResult};

/// Metadata of a freshly stored file.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// Path relative to the storage root, always `/`-separated.
    pub relative_path: String,
    /// Sanitized file name.
    pub filename: String,
    /// File size in bytes.
    pub size: u64,
    /// MD5 hash of the file.
    pub md5: String,
}

/// Storage backend trait.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `data` as `subdir/filename` and return its metadata.
    async fn save(&self, subdir: &str, filename: &str, data: &[u8]) -> AppResult<StoredFile>;

    /// Write raw bytes at a relative path, replacing any existing file.
    async fn write(&self, relative_path: &str, data: &[u8]) -> AppResult<()>;

    /// Resolve a stored relative path to an absolute path inside the root.
    async fn resolve_for_read(&self, relative_path: &str) -> AppResult<PathBuf>;

    /// Read a stored file.
    async fn read(&self, relative_path: &str) -> AppResult<Vec<u8>>;

    /// Check if a file exists.
    async fn exists(&self, relative_path: &str) -> AppResult<bool>;

    /// Remove a stored file. A file that is already gone is not an error.
    async fn delete(&self, relative_path: &str) -> AppResult<()>;
}

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend rooted at `base_path`.
    #[must_use]
    pub const fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// The configured storage root.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn canonical_root(&self) -> AppResult<PathBuf> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to create storage root: {e}")))?;
        tokio::fs::canonicalize(&self.base_path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to resolve storage root: {e}")))
    }

    /// Join a relative path onto the root, refusing anything that could climb out.
    fn join_checked(&self, relative_path: &str) -> AppResult<PathBuf> {
        let rel = Path::new(relative_path);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !clean || relative_path.is_empty() {
            return Err(AppError::Forbidden("Path escapes storage root".to_string()));
        }
        Ok(self.base_path.join(rel))
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalStorage {
    async fn save(&self, subdir: &str, filename: &str, data: &[u8]) -> AppResult<StoredFile> {
        let filename = secure_filename(filename)
            .ok_or_else(|| AppError::Validation("Invalid file name.".to_string()))?;
        let relative_path = if subdir.is_empty() {
            filename.clone()
        } else {
            format!("{}/{filename}", subdir.trim_matches('/'))
        };

        self.write(&relative_path, data).await?;

        Ok(StoredFile {
            relative_path,
            filename,
            size: data.len() as u64,
            md5: format!("{:x}", md5::compute(data)),
        })
    }

    async fn write(&self, relative_path: &str, data: &[u8]) -> AppResult<()> {
        let path = self.join_checked(relative_path)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))
    }

    async fn resolve_for_read(&self, relative_path: &str) -> AppResult<PathBuf> {
        let root = self.canonical_root().await?;
        let candidate = self.join_checked(relative_path)?;

        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound("File not found on disk".to_string()));
            }
            Err(e) => return Err(AppError::Storage(format!("Failed to resolve file: {e}"))),
        };

        // Symlinks can still point outside the root after the lexical check.
        if !resolved.starts_with(&root) {
            tracing::warn!(path = %relative_path, "Rejected read outside storage root");
            return Err(AppError::Forbidden("Path escapes storage root".to_string()));
        }

        Ok(resolved)
    }

    async fn read(&self, relative_path: &str) -> AppResult<Vec<u8>> {
        let path = self.resolve_for_read(relative_path).await?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read file: {e}")))
    }

    async fn exists(&self, relative_path: &str) -> AppResult<bool> {
        let path = self.join_checked(relative_path)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn delete(&self, relative_path: &str) -> AppResult<()> {
        let path = self.join_checked(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("Failed to delete file: {e}"))),
        }
    }
}

/// Reduce an uploaded file name to a safe ASCII name.
///
/// Directory parts are dropped, whitespace becomes `_`, and anything outside
/// `[A-Za-z0-9._-]` is removed. Returns `None` when nothing usable remains.
#[must_use]
pub fn secure_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Lowercase extension of a file name, if any.
#[must_use]
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_filename() {
        assert_eq!(
            secure_filename("My Report (final).pdf").as_deref(),
            Some("My_Report_final.pdf")
        );
        assert_eq!(
            secure_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            secure_filename("C:\\Users\\me\\plan.docx").as_deref(),
            Some("plan.docx")
        );
        assert_eq!(secure_filename(".bashrc").as_deref(), Some("bashrc"));
        assert_eq!(secure_filename("..."), None);
        assert_eq!(secure_filename(""), None);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("a.PDF").as_deref(), Some("pdf"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[tokio::test]
    async fn test_save_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());

        let stored = storage
            .save("client/1/tasks/7", "brief v2.txt", b"hello")
            .await
            .unwrap();
        assert_eq!(stored.relative_path, "client/1/tasks/7/brief_v2.txt");
        assert_eq!(stored.size, 5);
        assert_eq!(stored.md5, format!("{:x}", md5::compute(b"hello")));

        let path = storage.resolve_for_read(&stored.relative_path).await.unwrap();
        assert!(path.ends_with("client/1/tasks/7/brief_v2.txt"));
        assert_eq!(storage.read(&stored.relative_path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("root"));

        let err = storage.resolve_for_read("../outside.txt").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = storage.resolve_for_read("/etc/passwd").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = storage.resolve_for_read("missing.txt").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf());

        let stored = storage.save("work", "draft.txt", b"v1").await.unwrap();
        storage.delete(&stored.relative_path).await.unwrap();
        assert!(!storage.exists(&stored.relative_path).await.unwrap());
        storage.delete(&stored.relative_path).await.unwrap();

        let err = storage.delete("../escape.txt").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
