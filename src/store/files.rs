//! One pretty-printed JSON file per job: `{jobs_dir}/{id}.json`.
//!
//! This is the durability floor. Files never expire on their own.

use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::StoreError;
use crate::job::Job;

/// File-backed job records.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    dir: PathBuf,
}

/// Job ids are generated UUIDs; anything else could escape the jobs dir.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl FileJobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `id`.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write (overwrite) the record. Written to a temp file, then renamed.
    pub async fn save(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.path_for(&job.id);
        let write_err = |source| StoreError::FileWrite {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).await.map_err(write_err)?;

        let json = serde_json::to_string_pretty(job)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", job.id));
        fs::write(&tmp, json).await.map_err(write_err)?;
        fs::rename(&tmp, &path).await.map_err(write_err)?;
        Ok(())
    }

    /// Read the record for `id`, if any.
    pub async fn load(&self, id: &str) -> Result<Option<Job>, StoreError> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.path_for(id);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::FileRead { path, source }),
        }
    }

    /// Read every `*.json` record. Unparseable files are skipped with a warning.
    pub async fn load_all(&self) -> Result<Vec<Job>, StoreError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::FileRead {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut jobs = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StoreError::FileRead {
                        path: self.dir.clone(),
                        source,
                    });
                }
            };
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_record {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(text) => match serde_json::from_str::<Job>(&text) {
                    Ok(job) => jobs.push(job),
                    Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable job file: {}", e),
                },
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable job file: {}", e),
            }
        }
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobUpdate, NewJob};

    #[tokio::test]
    async fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(tmp.path().join("jobs"));
        let job = NewJob::new("list files").into_job();

        store.save(&job).await.unwrap();
        assert!(store.path_for(&job.id).exists());
        assert_eq!(store.load(&job.id).await.unwrap(), Some(job.clone()));

        let text = std::fs::read_to_string(store.path_for(&job.id)).unwrap();
        assert!(text.contains("\n  \"id\""), "expected pretty-printed JSON");
    }

    #[tokio::test]
    async fn save_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(tmp.path());
        let mut job = NewJob::new("t").into_job();
        store.save(&job).await.unwrap();
        JobUpdate::started().apply(&mut job);
        store.save(&job).await.unwrap();
        assert_eq!(store.load(&job.id).await.unwrap(), Some(job));
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_and_invalid_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(tmp.path());
        assert_eq!(store.load("nope").await.unwrap(), None);
        assert_eq!(store.load("../etc/passwd").await.unwrap(), None);
    }

    #[tokio::test]
    async fn load_all_skips_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(tmp.path());
        store.save(&NewJob::new("a").into_job()).await.unwrap();
        std::fs::write(tmp.path().join("broken.json"), "{").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hi").unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn load_all_on_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(tmp.path().join("never-created"));
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
