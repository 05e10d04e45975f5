//! Storage for submitted student records.
//!
//! Handlers only see [`StudentStore`]; whether records live in a local JSON
//! file or are read back from the response spreadsheet is decided once at
//! startup by [`store_from_settings`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::Settings;
use crate::dto::StudentRecord;
use crate::record_mapper;
use crate::sheets::SheetsClient;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed store file: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    fn kind(&self) -> &'static str;

    /// All records in submission order.
    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError>;

    /// Replaces the record with the same `(userId, url)` or appends it.
    async fn upsert(&self, record: StudentRecord) -> Result<(), StoreError>;
}

/// Replaces an existing entry in place; returns `true` if one was replaced.
pub fn upsert_into(records: &mut Vec<StudentRecord>, record: StudentRecord) -> bool {
    match records.iter_mut().find(|r| r.same_entry(&record)) {
        Some(existing) => {
            *existing = record;
            true
        }
        None => {
            records.push(record);
            false
        }
    }
}

/// Query filters of `GET /api/students-data`.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub title: Option<String>,
    pub composer: Option<String>,
    /// Keep only the last `n` matches.
    pub limit: Option<usize>,
}

impl StudentFilter {
    pub fn apply(&self, records: Vec<StudentRecord>) -> Vec<StudentRecord> {
        let title = needle(&self.title);
        let composer = needle(&self.composer);
        let mut matched: Vec<StudentRecord> = records
            .into_iter()
            .filter(|r| title.as_deref().map_or(true, |t| contains_ci(&r.title, t)))
            .filter(|r| composer.as_deref().map_or(true, |c| contains_ci(&r.composer, c)))
            .collect();
        if let Some(limit) = self.limit.filter(|n| *n > 0) {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        matched
    }
}

fn needle(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn contains_ci(haystack: &str, lowered_needle: &str) -> bool {
    !haystack.is_empty() && haystack.to_lowercase().contains(lowered_needle)
}

/// Pretty-printed JSON array on local disk.
///
/// Writes go through a temp file that is renamed over the target while the
/// lock is held, so concurrent submissions never lose each other's updates.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_all(&self, records: &[StudentRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StudentStore for JsonFileStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    async fn upsert(&self, record: StudentRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        let user_id = record.user_id.clone();
        let replaced = upsert_into(&mut records, record);
        self.write_all(&records).await?;
        info!(
            path = %self.path.display(),
            %user_id,
            replaced,
            total = records.len(),
            "student record saved"
        );
        Ok(())
    }
}

/// Records read back from the form's response spreadsheet.
pub struct SheetStore {
    sheets: SheetsClient,
}

impl SheetStore {
    pub fn new(sheets: SheetsClient) -> Self {
        Self { sheets }
    }
}

#[async_trait]
impl StudentStore for SheetStore {
    fn kind(&self) -> &'static str {
        "sheet"
    }

    async fn list(&self) -> Result<Vec<StudentRecord>, StoreError> {
        let Some((sheet, values)) = self.sheets.read_first_populated().await else {
            info!("no sheet with data found");
            return Ok(Vec::new());
        };
        let records = record_mapper::map_values(&values);
        info!(%sheet, records = records.len(), "sheet rows mapped");
        Ok(records)
    }

    async fn upsert(&self, record: StudentRecord) -> Result<(), StoreError> {
        // the form appends the row itself
        debug!(user_id = %record.user_id, "sheet store ignores direct writes");
        Ok(())
    }
}

/// Sheet-backed when `GOOGLE_SHEETS_ID` and a Google API key are set,
/// otherwise the local JSON file.
pub fn store_from_settings(settings: &Settings, client: Client) -> Arc<dyn StudentStore> {
    match (settings.sheets_id(), settings.sheets_key()) {
        (Some(id), Some(key)) => {
            info!("reading student data from Google Sheets");
            Arc::new(SheetStore::new(SheetsClient::new(
                client,
                &settings.sheets_api_base,
                id,
                key,
            )))
        }
        _ => {
            info!(path = %settings.students_data_file, "reading student data from local file");
            Arc::new(JsonFileStore::new(&settings.students_data_file))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, url: &str, title: &str) -> StudentRecord {
        StudentRecord {
            user_id: user.into(),
            url: url.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    fn titles(records: &[StudentRecord]) -> Vec<&str> {
        records.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn upsert_replaces_same_user_and_url() {
        let mut records = vec![record("u1", "a", "first"), record("u2", "a", "other")];
        assert!(upsert_into(&mut records, record("u1", "a", "second")));
        assert_eq!(titles(&records), vec!["second", "other"]);
        assert!(!upsert_into(&mut records, record("u1", "b", "new video")));
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn limit_keeps_last_records_in_order() {
        let records: Vec<_> = (1..=5).map(|i| record("u", &i.to_string(), &format!("t{i}"))).collect();
        let filter = StudentFilter {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(titles(&filter.apply(records.clone())), vec!["t4", "t5"]);
        let filter = StudentFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(filter.apply(records).len(), 5);
    }

    #[test]
    fn title_and_composer_match_case_insensitively() {
        let mut moonlight = record("u1", "a", "Moonlight SONATA");
        moonlight.composer = "Beethoven".into();
        let records = vec![moonlight, record("u2", "b", "Bolero"), record("u3", "c", "")];
        let filter = StudentFilter {
            title: Some("sonata".into()),
            ..Default::default()
        };
        assert_eq!(titles(&filter.apply(records.clone())), vec!["Moonlight SONATA"]);
        let filter = StudentFilter {
            composer: Some("BEET".into()),
            ..Default::default()
        };
        assert_eq!(filter.apply(records.clone()).len(), 1);
        let filter = StudentFilter {
            title: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(filter.apply(records).len(), 3);
    }

    #[tokio::test]
    async fn file_store_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("students.json"));
        assert!(store.list().await.unwrap().is_empty());

        store.upsert(record("u1", "https://youtu.be/a", "v1")).await.unwrap();
        store.upsert(record("u2", "https://youtu.be/a", "x")).await.unwrap();
        store.upsert(record("u1", "https://youtu.be/a", "v2")).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(titles(&listed), vec!["v2", "x"]);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n"), "file should be pretty-printed");
    }

    #[tokio::test]
    async fn concurrent_upserts_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("students.json"));
        let writes = (0..20).map(|i| {
            let user = format!("user_{i}");
            let store = &store;
            async move { store.upsert(record(&user, "https://youtu.be/a", "t")).await }
        });
        for res in futures::future::join_all(writes).await {
            res.unwrap();
        }
        assert_eq!(store.list().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.list().await, Err(StoreError::Json(_))));
    }
}
