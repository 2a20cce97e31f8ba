//! Arrangements: named seat assignments, their store, and comparison tools.
//!
//! ## Modules
//!
//! - [`models`] - Tables, seat assignments, arrangements and their status
//! - [`store`] - [`ArrangementStore`], manual edits validated before commit
//! - [`compare`] - diffs, guest lookup, side-by-side metrics

pub mod compare;
pub mod models;
pub mod store;

pub use compare::{ArrangementDiff, Comparison, ComparisonRow, GuestMatch, TableDiff};
pub use models::{
    Arrangement, ArrangementId, ArrangementOrigin, ArrangementStatus, EventId, SeatAssignment,
    SpecialTable, Table, TableId, TableSeating,
};
pub use store::{ArrangementStore, StoreError};
