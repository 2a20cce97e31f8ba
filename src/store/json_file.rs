//! JSON-file SeatingStore.
//!
//! Layout under the data dir:
//!
//! ```text
//! <root>/<event_id>/event.json
//! <root>/<event_id>/arrangements/<arrangement_id>.json
//! ```
//!
//! Files are written to a temporary sibling and renamed into place.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{sort_and_filter, EventRecord, SeatingStore};
use crate::arrangement::{Arrangement, ArrangementId, ArrangementStatus, EventId};

const EVENT_FILE: &str = "event.json";
const ARRANGEMENTS_DIR: &str = "arrangements";

pub struct JsonFileSeatingStore {
    root: PathBuf,
}

impl JsonFileSeatingStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create data dir {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn event_dir(&self, id: EventId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn arrangements_dir(&self, id: EventId) -> PathBuf {
        self.event_dir(id).join(ARRANGEMENTS_DIR)
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

async fn remove_if_exists(path: &Path, dir: bool) -> Result<()> {
    let result = if dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[async_trait]
impl SeatingStore for JsonFileSeatingStore {
    async fn list_events(&self) -> Result<Vec<EventId>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to list {}", self.root.display()))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match Uuid::parse_str(name) {
                Ok(id) if entry.path().join(EVENT_FILE).exists() => ids.push(id),
                Ok(_) => {}
                Err(_) => debug!(entry = %name, "Skipping non-event entry in data dir"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn load_event(&self, id: EventId) -> Result<Option<EventRecord>> {
        read_json(&self.event_dir(id).join(EVENT_FILE)).await
    }

    async fn save_event(&self, record: &EventRecord) -> Result<()> {
        let dir = self.event_dir(record.id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        write_json(&dir.join(EVENT_FILE), record).await
    }

    async fn delete_event(&self, id: EventId) -> Result<()> {
        remove_if_exists(&self.event_dir(id), true).await
    }

    async fn save_arrangement(&self, arrangement: &Arrangement) -> Result<()> {
        let dir = self.arrangements_dir(arrangement.event_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        write_json(&dir.join(format!("{}.json", arrangement.id)), arrangement).await
    }

    async fn delete_arrangement(&self, event_id: EventId, id: ArrangementId) -> Result<()> {
        let path = self.arrangements_dir(event_id).join(format!("{}.json", id));
        remove_if_exists(&path, false).await
    }

    async fn list_arrangements(
        &self,
        event_id: EventId,
        status: Option<ArrangementStatus>,
    ) -> Result<Vec<Arrangement>> {
        let dir = self.arrangements_dir(event_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
        };

        let mut arrangements = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<Arrangement>(&path).await {
                Ok(Some(arrangement)) => arrangements.push(arrangement),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable arrangement"),
            }
        }
        Ok(sort_and_filter(arrangements, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::{SeatAssignment, Table};
    use crate::graph::{Guest, Relationship, RelationshipType};
    use chrono::Utc;

    fn record() -> EventRecord {
        let a = Guest::new("Ada", "Family");
        let b = Guest::new("Grace", "Family");
        let rel = Relationship::new(a.id, b.id, RelationshipType::Family, 0.8).unwrap();
        let now = Utc::now();
        EventRecord {
            id: Uuid::new_v4(),
            name: "Reunion".into(),
            settings: Default::default(),
            guests: vec![a, b],
            relationships: vec![rel],
            tables: vec![Table::new("Table 1", 8)],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_event_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = record();
        {
            let store = JsonFileSeatingStore::open(dir.path()).await.unwrap();
            store.save_event(&record).await.unwrap();
        }
        let reopened = JsonFileSeatingStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.list_events().await.unwrap(), vec![record.id]);
        assert_eq!(reopened.load_event(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_missing_event_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSeatingStore::open(dir.path()).await.unwrap();
        assert!(store.load_event(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store
            .list_arrangements(Uuid::new_v4(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_arrangement_save_replace_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSeatingStore::open(dir.path()).await.unwrap();
        let record = record();
        store.save_event(&record).await.unwrap();

        let table = record.tables[0].clone();
        let mut arrangement = Arrangement::new(record.id, "Draft", vec![table.clone()])
            .with_assignment(SeatAssignment::from([(record.guests[0].id, table.id)]));
        store.save_arrangement(&arrangement).await.unwrap();

        arrangement.status = ArrangementStatus::Current;
        store.save_arrangement(&arrangement).await.unwrap();

        let all = store.list_arrangements(record.id, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, ArrangementStatus::Current);
        assert_eq!(all[0].assignment, arrangement.assignment);

        store.delete_arrangement(record.id, arrangement.id).await.unwrap();
        assert!(store.list_arrangements(record.id, None).await.unwrap().is_empty());
        // Deleting twice is fine
        store.delete_arrangement(record.id, arrangement.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_arrangement_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSeatingStore::open(dir.path()).await.unwrap();
        let event_id = Uuid::new_v4();
        let arr_dir = dir.path().join(event_id.to_string()).join(ARRANGEMENTS_DIR);
        std::fs::create_dir_all(&arr_dir).unwrap();
        std::fs::write(arr_dir.join("broken.json"), b"{not json").unwrap();

        assert!(store.list_arrangements(event_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_event_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSeatingStore::open(dir.path()).await.unwrap();
        let record = record();
        store.save_event(&record).await.unwrap();
        store.delete_event(record.id).await.unwrap();
        assert!(store.list_events().await.unwrap().is_empty());
        store.delete_event(record.id).await.unwrap();
    }
}
