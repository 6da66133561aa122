//! On-disk blob storage for ingested files.
//!
//! Layout: `<root>/{admin,portal,website}/<stored_filename>` and
//! `<root>/user/[<chat_id>/]<stored_filename>`. Stored filenames are opaque
//! (a UUID plus the original extension) so two documents with the same
//! display name never collide on disk.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::SourceType;

#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BlobStore { root: root.into() }
    }

    /// Generates an opaque stored filename, preserving the original extension.
    pub fn generate_stored_name(&self, original_filename: &str) -> String {
        let ext = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str());
        match ext {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        }
    }

    /// Directory for a given source type (and, for `user`, an optional chat id).
    pub fn dir_for(&self, source_type: SourceType, chat_id: Option<Uuid>) -> PathBuf {
        match source_type {
            SourceType::User => match chat_id {
                Some(id) => self.root.join("user").join(id.to_string()),
                None => self.root.join("user"),
            },
            other => self.root.join(other.as_str()),
        }
    }

    /// Relative storage path recorded on the document row.
    pub fn relative_path(
        &self,
        source_type: SourceType,
        chat_id: Option<Uuid>,
        stored_filename: &str,
    ) -> String {
        let dir = self.dir_for(source_type, chat_id);
        let rel = dir
            .strip_prefix(&self.root)
            .unwrap_or(&dir)
            .join(stored_filename);
        rel.to_string_lossy().replace('\\', "/")
    }

    pub fn absolute_path(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes bytes at the canonical location for this source type, creating
    /// parent directories as needed. Returns the relative storage path.
    pub async fn place(
        &self,
        source_type: SourceType,
        chat_id: Option<Uuid>,
        stored_filename: &str,
        bytes: &[u8],
    ) -> CoreResult<String> {
        let dir = self.dir_for(source_type, chat_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CoreError::Storage(format!("creating {}: {e}", dir.display())))?;
        let path = dir.join(stored_filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::Storage(format!("writing {}: {e}", path.display())))?;
        Ok(self.relative_path(source_type, chat_id, stored_filename))
    }

    pub async fn exists(&self, relative_path: &str) -> bool {
        tokio::fs::metadata(self.absolute_path(relative_path))
            .await
            .is_ok()
    }

    pub async fn delete(&self, relative_path: &str) -> CoreResult<()> {
        let path = self.absolute_path(relative_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Storage(format!(
                "deleting {}: {e}",
                path.display()
            ))),
        }
    }

    pub async fn read(&self, relative_path: &str) -> CoreResult<Vec<u8>> {
        let path = self.absolute_path(relative_path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| CoreError::Storage(format!("reading {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_stored_name_preserves_extension() {
        let store = BlobStore::new("/tmp/blobs");
        let name = store.generate_stored_name("report.pdf");
        assert!(name.ends_with(".pdf"));
        assert_ne!(name, "report.pdf");
    }

    #[test]
    fn user_dir_includes_chat_id_when_present() {
        let store = BlobStore::new("/tmp/blobs");
        let chat_id = Uuid::new_v4();
        let dir = store.dir_for(SourceType::User, Some(chat_id));
        assert!(dir.ends_with(chat_id.to_string()));
    }

    #[test]
    fn relative_path_has_no_leading_root() {
        let store = BlobStore::new("/tmp/blobs");
        let rel = store.relative_path(SourceType::Portal, None, "abc.pdf");
        assert_eq!(rel, "portal/abc.pdf");
    }

    #[tokio::test]
    async fn place_then_read_round_trips_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path());
        let rel = store
            .place(SourceType::Admin, None, "doc.txt", b"hello world")
            .await
            .unwrap();
        assert!(store.exists(&rel).await);
        let bytes = store.read(&rel).await.unwrap();
        assert_eq!(bytes, b"hello world");
        store.delete(&rel).await.unwrap();
        assert!(!store.exists(&rel).await);
    }
}
