// utils/storage.rs
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use uuid::Uuid;

use crate::service::error::ServiceError;

/// Where attachment bytes live. The ticket service only ever sees the
/// stored filename this returns.
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String, ServiceError>;

    async fn load(&self, filename: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileStorage { root: root.into() }
    }

    pub async fn ensure_root(&self) -> Result<(), ServiceError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ServiceError::Storage(format!("cannot create {}: {}", self.root.display(), e)))
    }

    fn resolve(&self, filename: &str) -> Result<PathBuf, ServiceError> {
        // Stored names never contain separators; anything else is a traversal attempt.
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.starts_with('.')
        {
            return Err(ServiceError::not_found("Attachment", filename));
        }
        Ok(self.root.join(filename))
    }
}

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// Keeps ASCII letters, digits, dots, dashes and underscores; whitespace
/// becomes an underscore and everything else is dropped.
pub fn secure_filename(original: &str) -> String {
    let base = Path::new(original)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let base = base.rsplit('\\').next().unwrap_or_default();

    let cleaned = WHITESPACE.replace_all(base.trim(), "_");
    let cleaned = DISALLOWED.replace_all(&cleaned, "");
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// `<timestamp>_<short uuid>_<sanitised name>`, unique even for uploads
/// landing in the same second.
pub fn stored_filename(original: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8],
        secure_filename(original)
    )
}

#[async_trait]
impl AttachmentStorage for FileStorage {
    async fn save(&self, original_filename: &str, bytes: &[u8]) -> Result<String, ServiceError> {
        let filename = stored_filename(original_filename);
        let path = self.resolve(&filename)?;

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ServiceError::Storage(format!("cannot write {}: {}", filename, e)))?;

        tracing::debug!("Stored attachment {} ({} bytes)", filename, bytes.len());
        Ok(filename)
    }

    async fn load(&self, filename: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.resolve(filename)?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ServiceError::not_found("Attachment", filename))
            }
            Err(e) => Err(ServiceError::Storage(format!("cannot read {}: {}", filename, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitises_user_supplied_names() {
        assert_eq!(secure_filename("relatório final.pdf"), "relatrio_final.pdf");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("C:\\Users\\ana\\print tela.png"), "print_tela.png");
        assert_eq!(secure_filename(".."), "file");
        assert_eq!(secure_filename(""), "file");
    }

    #[test]
    fn shared_patterns_sanitise_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|n| std::thread::spawn(move || secure_filename(&format!("nota  fiscal\t{}#.pdf", n))))
            .collect();
        for (n, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), format!("nota_fiscal_{}.pdf", n));
        }
    }

    #[test]
    fn stored_names_do_not_collide() {
        let a = stored_filename("log.txt");
        let b = stored_filename("log.txt");
        assert_ne!(a, b);
        assert!(a.ends_with("_log.txt"));
    }

    #[tokio::test]
    async fn saves_and_loads_bytes() {
        let root = std::env::temp_dir().join(format!("helpdesk-storage-{}", Uuid::new_v4()));
        let storage = FileStorage::new(&root);
        storage.ensure_root().await.unwrap();

        let filename = storage.save("erro.png", b"png-bytes").await.unwrap();
        assert_eq!(storage.load(&filename).await.unwrap(), b"png-bytes");

        assert!(matches!(
            storage.load("../secret").await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            storage.load("missing.txt").await,
            Err(ServiceError::NotFound { .. })
        ));

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }
}
