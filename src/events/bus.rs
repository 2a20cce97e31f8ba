//! Broadcast bus for seating events
//!
//! Every service mutation and job transition lands here. WebSocket clients
//! usually care about one seating event at a time, so subscriptions can carry
//! an [`EventFilter`] and only wake up for matching events.

use std::collections::HashSet;

use super::{EntityType, EventEmitter, SeatingEvent};
use crate::arrangement::EventId;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, trace};

const DEFAULT_CAPACITY: usize = 1024;

/// Which events a subscriber wants. The default matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub event_id: Option<EventId>,
    /// `None` means all entity types; an empty set matches nothing
    pub entity_types: Option<HashSet<EntityType>>,
}

impl EventFilter {
    pub fn for_event(event_id: EventId) -> Self {
        Self {
            event_id: Some(event_id),
            entity_types: None,
        }
    }

    /// Restrict to a comma-separated list such as `"arrangement,job"`.
    /// Unrecognized names are dropped.
    pub fn with_entity_list(mut self, list: &str) -> Self {
        self.entity_types = Some(
            list.split(',')
                .filter_map(|s| s.trim().parse::<EntityType>().ok())
                .collect(),
        );
        self
    }

    pub fn matches(&self, event: &SeatingEvent) -> bool {
        if self.event_id.is_some_and(|id| id != event.event_id) {
            return false;
        }
        match &self.entity_types {
            Some(types) => types.contains(&event.entity_type),
            None => true,
        }
    }
}

/// Fan-out of [`SeatingEvent`]s over `tokio::sync::broadcast`.
///
/// Emitting never blocks. With nobody subscribed the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SeatingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Unfiltered receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SeatingEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> Subscription {
        Subscription {
            rx: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: SeatingEvent) {
        let (entity, action, event_id) = (event.entity_type, event.action, event.event_id);
        match self.sender.send(event) {
            Ok(n) => debug!(
                entity_type = ?entity,
                action = ?action,
                %event_id,
                subscribers = n,
                "Seating event emitted"
            ),
            Err(_) => trace!(entity_type = ?entity, %event_id, "Seating event dropped, no subscribers"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A receiver that skips events its filter rejects.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<SeatingEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Next matching event. `Lagged` still counts skipped events of any kind.
    pub async fn recv(&mut self) -> Result<SeatingEvent, RecvError> {
        loop {
            let event = self.rx.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}
