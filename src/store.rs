//! The JSON store file holding every harvested incident.
//!
//! # File Layout
//!
//! A single pretty-printed JSON array of [`IncidentRecord`] objects, read
//! whole at the start of a run and rewritten whole at the end:
//! ```text
//! Data/
//! ├── safemap_data.json
//! └── safemap_data.json.backup   (only after a corrupt file was found)
//! ```
//!
//! Loading never fails. A missing or blank file is an empty store; a file
//! that does not parse is copied aside to `<path>.backup` and the run starts
//! from an empty store. A file that can be neither read nor copied is never
//! overwritten.

use crate::models::IncidentRecord;
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
pub struct Store {
    records: Vec<IncidentRecord>,
    seen: HashSet<String>,
    /// Set when the file on disk could be neither read nor backed up;
    /// saving would destroy it.
    unsaved_reason: Option<String>,
}

/// One line of the classification export.
#[derive(Debug, Serialize)]
struct IncidentLine<'a> {
    index: usize,
    text: &'a str,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".backup")
}

impl Store {
    pub fn from_records(records: Vec<IncidentRecord>) -> Self {
        let mut store = Self::default();
        store.merge(records);
        store
    }

    /// Load the store at `path`, recovering from a missing or corrupt file.
    ///
    /// # Arguments
    ///
    /// * `path` - Location of the JSON store file
    ///
    /// # Returns
    ///
    /// The stored records. A missing or blank file gives an empty store. A
    /// file that is not valid UTF-8 JSON is copied to `<path>.backup` first.
    /// When the file exists but cannot be read, it is backed up if possible;
    /// otherwise the returned store refuses to [`save`](Self::save) so the
    /// file on disk is left untouched.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Self {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No store file yet; starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "Store file unreadable");
                return Self::recover(path, e.to_string()).await;
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            info!("Store file is empty; starting fresh");
            return Self::default();
        }

        match serde_json::from_slice::<Vec<IncidentRecord>>(&raw) {
            Ok(records) => {
                let loaded = records.len();
                let store = Self::from_records(records);
                if store.len() < loaded {
                    warn!(loaded, kept = store.len(), "Dropped duplicate records from store file");
                }
                info!(count = store.len(), "Loaded existing records");
                store
            }
            Err(e) => {
                warn!(error = %e, "Invalid JSON in store file");
                Self::recover(path, e.to_string()).await
            }
        }
    }

    /// Back up an unusable store file and start empty. If the backup fails,
    /// the empty store is marked unsaveable.
    async fn recover(path: &Path, problem: String) -> Self {
        let backup = backup_path(path);
        match fs::copy(path, &backup).await {
            Ok(_) => {
                warn!(backup = %backup.display(), "Backed up store file; starting fresh");
                Self::default()
            }
            Err(e) => {
                error!(error = %e, "Failed to back up store file; it will not be overwritten");
                Self {
                    unsaved_reason: Some(format!("{problem}; backup failed: {e}")),
                    ..Self::default()
                }
            }
        }
    }

    /// Whether [`save`](Self::save) is allowed to overwrite the file.
    pub fn is_saveable(&self) -> bool {
        self.unsaved_reason.is_none()
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, content_hash: &str) -> bool {
        self.seen.contains(content_hash)
    }

    /// Append records whose fingerprint is not stored yet, including ones
    /// added earlier in the same call. Returns how many were added.
    pub fn merge(&mut self, records: impl IntoIterator<Item = IncidentRecord>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record.content_hash.clone()) {
                self.records.push(record);
            } else {
                debug!(url = %record.url, "Skipping record with known fingerprint");
            }
        }
        self.records.len() - before
    }

    /// Rewrite the store file in full.
    ///
    /// The JSON goes to a temporary sibling first and is renamed over `path`.
    #[instrument(level = "info", skip_all, fields(path = %path.display(), count = self.records.len()))]
    pub async fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(reason) = &self.unsaved_reason {
            return Err(format!("refusing to overwrite unreadable store file ({reason})").into());
        }
        let json = serde_json::to_string_pretty(&self.records)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(dir).await {
                error!(dir = %dir.display(), error = %e, "Failed to create store directory");
                return Err(e.into());
            }
        }

        let tmp = sibling(path, ".tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        info!("Wrote store file");
        Ok(())
    }

    /// Write every record's classification text as JSON Lines.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn export_incidents(&self, path: &Path) -> Result<usize, Box<dyn Error>> {
        let mut out = String::new();
        for (index, record) in self.records().iter().enumerate() {
            let text = record.incident_text();
            out.push_str(&serde_json::to_string(&IncidentLine { index, text: &text })?);
            out.push('\n');
        }

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        fs::write(path, out).await?;
        info!(count = self.records.len(), "Wrote incident export");
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fingerprint;
    use tempfile::tempdir;

    fn record(n: usize) -> IncidentRecord {
        IncidentRecord {
            title: format!("Tin {n}"),
            url: format!("https://e.vn/{n}"),
            source: "VnExpress".to_string(),
            date: String::new(),
            summary: format!("Tóm tắt {n}"),
            content_hash: fingerprint(&format!("body {n}")),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = Store::load(&dir.path().join("none.json")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_blank_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blank.json");
        std::fs::write(&path, "  \n").unwrap();
        assert!(Store::load(&path).await.is_empty());
        assert!(!backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "[{\"title\": ").unwrap();

        let store = Store::load(&path).await;
        assert!(store.is_empty());
        assert_eq!(std::fs::read_to_string(backup_path(&path)).unwrap(), "[{\"title\": ");
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let raw: &[u8] = b"[{\"title\": \"\xff\xfe\"}]";
        std::fs::write(&path, raw).unwrap();

        let store = Store::load(&path).await;
        assert!(store.is_empty());
        assert!(store.is_saveable());
        assert_eq!(std::fs::read(backup_path(&path)).unwrap(), raw);

        store.save(&path).await.unwrap();
        assert_eq!(std::fs::read(backup_path(&path)).unwrap(), raw);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_never_overwritten() {
        let dir = tempdir().unwrap();
        // A directory at the store path cannot be read or copied.
        let path = dir.path().join("store.json");
        std::fs::create_dir(&path).unwrap();

        let store = Store::load(&path).await;
        assert!(store.is_empty());
        assert!(!store.is_saveable());
        assert!(store.save(&path).await.is_err());
        assert!(path.is_dir());
        assert!(!sibling(&path, ".tmp").exists());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let store = Store::from_records(vec![record(1), record(2)]);
        store.save(&path).await.unwrap();

        assert!(!sibling(&path, ".tmp").exists());
        let loaded = Store::load(&path).await;
        assert_eq!(loaded.records(), store.records());
        assert!(loaded.contains(&fingerprint("body 1")));
    }

    #[test]
    fn test_merge_skips_known_fingerprints() {
        let mut store = Store::from_records(vec![record(1)]);
        let mut dup = record(3);
        dup.content_hash = record(1).content_hash;
        let added = store.merge(vec![record(2), dup, record(2)]);
        assert_eq!(added, 1);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&record(2).content_hash));
    }

    #[tokio::test]
    async fn test_export_incidents_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("incidents.jsonl");
        let store = Store::from_records(vec![record(1), record(2)]);
        assert_eq!(store.export_incidents(&path).await.unwrap(), 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["index"], 1);
        assert_eq!(
            lines[0]["text"],
            "Tin 1 Tóm tắt 1 Nguồn: VnExpress Url: https://e.vn/1"
        );
    }
}
