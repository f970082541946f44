//! File-based account persistence: a directory of `.maFile` records.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, warn};
use vigil_core::mafile::MaFileRecord;
use vigil_core::ports::AccountRepository;
use vigil_core::Error;

const MAFILE_EXTENSION: &str = "maFile";

/// Stores one record per file, named by the remote id (falling back to a
/// sanitised account name), matching the desktop authenticator convention.
pub struct FileAccountRepository {
    mafiles_dir: PathBuf,
}

impl FileAccountRepository {
    pub fn new(mafiles_dir: PathBuf) -> Self {
        Self { mafiles_dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.mafiles_dir
    }

    fn record_path(&self, record: &MaFileRecord) -> PathBuf {
        let stem = if record.steamid.is_empty() {
            sanitize_filename(&record.account_name)
        } else {
            record.steamid.clone()
        };
        self.mafiles_dir
            .join(format!("{}.{}", stem, MAFILE_EXTENSION))
    }
}

fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();
    let cleaned = cleaned.trim_matches(&['.', ' '][..]).to_string();
    if cleaned.is_empty() {
        "account".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl AccountRepository for FileAccountRepository {
    #[instrument(skip(self))]
    async fn scan(&self) -> Result<Vec<MaFileRecord>, Error> {
        if !fs::try_exists(&self.mafiles_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let mut entries = fs::read_dir(&self.mafiles_dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to read maFiles directory: {}", e)))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("failed to read maFiles directory: {}", e)))?
        {
            let path = entry.path();
            let is_mafile = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case(MAFILE_EXTENSION))
                .unwrap_or(false);
            if !is_mafile {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable maFile");
                    continue;
                }
            };
            match serde_json::from_str::<MaFileRecord>(&content) {
                Ok(record) => {
                    debug!(path = %path.display(), account = %record.account_name, "loaded maFile");
                    records.push(record);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed maFile");
                }
            }
        }

        Ok(records)
    }

    #[instrument(skip(self, record), fields(account = %record.account_name))]
    async fn save(&self, record: &MaFileRecord) -> Result<(), Error> {
        fs::create_dir_all(&self.mafiles_dir)
            .await
            .map_err(|e| Error::Storage(format!("failed to create maFiles directory: {}", e)))?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| Error::Storage(format!("failed to serialize account record: {}", e)))?;
        let path = self.record_path(record);
        fs::write(&path, content)
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "saved maFile");
        Ok(())
    }

    #[instrument(skip(self, record), fields(account = %record.account_name))]
    async fn delete(&self, record: &MaFileRecord) -> Result<(), Error> {
        let path = self.record_path(record);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(name: &str, steamid: &str) -> MaFileRecord {
        serde_json::from_value(serde_json::json!({
            "account_name": name,
            "steamid": steamid,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scan_empty_directory() {
        let dir = tempdir().unwrap();
        let repo = FileAccountRepository::new(dir.path().to_path_buf());
        assert!(repo.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_missing_directory() {
        let repo = FileAccountRepository::new(PathBuf::from("/nonexistent/maFiles"));
        assert!(repo.scan().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_scan_delete_roundtrip() {
        let dir = tempdir().unwrap();
        let repo = FileAccountRepository::new(dir.path().to_path_buf());

        let record = record("testuser", "76561197960287930");
        repo.save(&record).await.unwrap();

        assert!(dir.path().join("76561197960287930.maFile").exists());

        let scanned = repo.scan().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0], record);

        repo.delete(&record).await.unwrap();
        assert!(repo.scan().await.unwrap().is_empty());

        // Deleting again is not an error.
        repo.delete(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_file_is_skipped() {
        let dir = tempdir().unwrap();
        let repo = FileAccountRepository::new(dir.path().to_path_buf());

        repo.save(&record("testuser", "76561197960287930"))
            .await
            .unwrap();
        std::fs::write(dir.path().join("broken.maFile"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scanned = repo.scan().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].account_name, "testuser");
    }

    #[tokio::test]
    async fn test_filename_falls_back_to_account_name() {
        let dir = tempdir().unwrap();
        let repo = FileAccountRepository::new(dir.path().to_path_buf());

        let record = record("we?ird/name", "");
        repo.save(&record).await.unwrap();
        assert!(dir.path().join("we_ird_name.maFile").exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("plain"), "plain");
        assert_eq!(sanitize_filename("a<b>c"), "a_b_c");
        assert_eq!(sanitize_filename(" .. "), "account");
    }
}
