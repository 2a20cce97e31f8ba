//! In-memory SeatingStore.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{sort_and_filter, EventRecord, SeatingStore};
use crate::arrangement::{Arrangement, ArrangementId, ArrangementStatus, EventId};

#[derive(Default)]
pub struct InMemorySeatingStore {
    pub events: RwLock<HashMap<EventId, EventRecord>>,
    pub arrangements: RwLock<HashMap<EventId, HashMap<ArrangementId, Arrangement>>>,
}

impl InMemorySeatingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatingStore for InMemorySeatingStore {
    async fn list_events(&self) -> Result<Vec<EventId>> {
        let mut ids: Vec<EventId> = self.events.read().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn load_event(&self, id: EventId) -> Result<Option<EventRecord>> {
        Ok(self.events.read().await.get(&id).cloned())
    }

    async fn save_event(&self, record: &EventRecord) -> Result<()> {
        self.events.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete_event(&self, id: EventId) -> Result<()> {
        self.events.write().await.remove(&id);
        self.arrangements.write().await.remove(&id);
        Ok(())
    }

    async fn save_arrangement(&self, arrangement: &Arrangement) -> Result<()> {
        self.arrangements
            .write()
            .await
            .entry(arrangement.event_id)
            .or_default()
            .insert(arrangement.id, arrangement.clone());
        Ok(())
    }

    async fn delete_arrangement(&self, event_id: EventId, id: ArrangementId) -> Result<()> {
        if let Some(map) = self.arrangements.write().await.get_mut(&event_id) {
            map.remove(&id);
        }
        Ok(())
    }

    async fn list_arrangements(
        &self,
        event_id: EventId,
        status: Option<ArrangementStatus>,
    ) -> Result<Vec<Arrangement>> {
        let all = self
            .arrangements
            .read()
            .await
            .get(&event_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        Ok(sort_and_filter(all, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::Table;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_arrangements_filtered_by_status() {
        let store = InMemorySeatingStore::new();
        let event_id = Uuid::new_v4();
        let draft = Arrangement::new(event_id, "Draft", vec![Table::new("T", 2)]);
        let mut saved = Arrangement::new(event_id, "Saved", vec![Table::new("T", 2)]);
        saved.status = ArrangementStatus::Saved;

        store.save_arrangement(&draft).await.unwrap();
        store.save_arrangement(&saved).await.unwrap();

        assert_eq!(store.list_arrangements(event_id, None).await.unwrap().len(), 2);
        let only_saved = store
            .list_arrangements(event_id, Some(ArrangementStatus::Saved))
            .await
            .unwrap();
        assert_eq!(only_saved.len(), 1);
        assert_eq!(only_saved[0].id, saved.id);

        store.delete_arrangement(event_id, draft.id).await.unwrap();
        assert_eq!(store.list_arrangements(event_id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_event_drops_arrangements() {
        let store = InMemorySeatingStore::new();
        let now = Utc::now();
        let record = EventRecord {
            id: Uuid::new_v4(),
            name: "Wedding".into(),
            settings: Default::default(),
            guests: vec![],
            relationships: vec![],
            tables: vec![],
            created_at: now,
            updated_at: now,
        };
        store.save_event(&record).await.unwrap();
        store
            .save_arrangement(&Arrangement::new(record.id, "A", vec![]))
            .await
            .unwrap();

        assert_eq!(store.list_events().await.unwrap(), vec![record.id]);
        store.delete_event(record.id).await.unwrap();
        assert!(store.load_event(record.id).await.unwrap().is_none());
        assert!(store.list_arrangements(record.id, None).await.unwrap().is_empty());
    }
}
