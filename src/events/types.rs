//! Seating event types for push notifications

use serde::{Deserialize, Serialize};

use crate::arrangement::EventId;

/// The kind of entity an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Event,
    Guest,
    Relationship,
    Table,
    Arrangement,
    Job,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Guest => "guest",
            Self::Relationship => "relationship",
            Self::Table => "table",
            Self::Arrangement => "arrangement",
            Self::Job => "job",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "event" => Ok(Self::Event),
            "guest" => Ok(Self::Guest),
            "relationship" => Ok(Self::Relationship),
            "table" => Ok(Self::Table),
            "arrangement" => Ok(Self::Arrangement),
            "job" => Ok(Self::Job),
            other => Err(format!("unknown entity type '{}'", other)),
        }
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatingAction {
    Created,
    Updated,
    Deleted,
    /// Arrangement became the current one
    Promoted,
    /// Job progress tick
    Progress,
    Completed,
    Failed,
    Cancelled,
}

/// An event emitted after a successful mutation or a job state change.
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatingEvent {
    pub entity_type: EntityType,
    pub action: SeatingAction,
    pub entity_id: String,
    /// Owning event, for client-side filtering
    pub event_id: EventId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl SeatingEvent {
    pub fn new(
        entity_type: EntityType,
        action: SeatingAction,
        entity_id: impl Into<String>,
        event_id: EventId,
    ) -> Self {
        Self {
            entity_type,
            action,
            entity_id: entity_id.into(),
            event_id,
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Sink for seating events. Emitting never blocks and never fails.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: SeatingEvent);

    fn emit_created(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        event_id: EventId,
        payload: serde_json::Value,
    ) {
        self.emit(
            SeatingEvent::new(entity_type, SeatingAction::Created, entity_id, event_id)
                .with_payload(payload),
        );
    }

    fn emit_updated(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        event_id: EventId,
        payload: serde_json::Value,
    ) {
        self.emit(
            SeatingEvent::new(entity_type, SeatingAction::Updated, entity_id, event_id)
                .with_payload(payload),
        );
    }

    fn emit_deleted(&self, entity_type: EntityType, entity_id: &str, event_id: EventId) {
        self.emit(SeatingEvent::new(
            entity_type,
            SeatingAction::Deleted,
            entity_id,
            event_id,
        ));
    }

    fn emit_job(&self, action: SeatingAction, job_id: &str, event_id: EventId, payload: serde_json::Value) {
        self.emit(SeatingEvent::new(EntityType::Job, action, job_id, event_id).with_payload(payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_event_serializes_snake_case() {
        let event_id = Uuid::new_v4();
        let event = SeatingEvent::new(
            EntityType::Arrangement,
            SeatingAction::Promoted,
            "arr-1",
            event_id,
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["entity_type"], "arrangement");
        assert_eq!(json["action"], "promoted");
        assert_eq!(json["event_id"], event_id.to_string());
    }

    #[test]
    fn test_entity_type_names_match_wire_format() {
        for kind in [EntityType::Event, EntityType::Guest, EntityType::Relationship, EntityType::Table, EntityType::Arrangement, EntityType::Job] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
            assert_eq!(kind.as_str().parse::<EntityType>().unwrap(), kind);
        }
        assert_eq!("Arrangement".parse::<EntityType>().unwrap(), EntityType::Arrangement);
        assert!("seat".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_null_payload_omitted() {
        let event = SeatingEvent::new(
            EntityType::Guest,
            SeatingAction::Deleted,
            "guest-1",
            Uuid::new_v4(),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"payload\""));
    }

    #[test]
    fn test_payload_kept() {
        let event = SeatingEvent::new(EntityType::Job, SeatingAction::Progress, "job-1", Uuid::new_v4())
            .with_payload(serde_json::json!({"percent": 42}));
        let back: SeatingEvent = serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(back.payload["percent"], 42);
        assert_eq!(back.action, SeatingAction::Progress);
    }
}
