//! Seating event system for real-time WebSocket notifications
//!
//! This module provides:
//! - `SeatingEvent` - typed events emitted after every mutation and job transition
//! - `EventEmitter` - the sink trait the service emits through
//! - `EventBus` - broadcast channel for distributing events to WebSocket clients
//! - `EventFilter` / `Subscription` - per-event, per-entity filtered receivers

mod bus;
mod types;

pub use bus::{EventBus, EventFilter, Subscription};
pub use types::{EntityType, EventEmitter, SeatingAction, SeatingEvent};
