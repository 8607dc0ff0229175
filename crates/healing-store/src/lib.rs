//! Healing telemetry and override store.
//!
//! Counts healing attempts per project and strategy, keeps successful heals
//! as records a human can later apply to (or dismiss from) the test
//! definition, and maintains the per-step selector audit log used for
//! rollback.

pub mod definitions;
pub mod errors;
pub mod history;
pub mod records;
pub mod stats;
pub mod store;

pub use definitions::{InMemoryDefinitionStore, TestDefinitionStore};
pub use errors::HealingStoreError;
pub use history::{
    HealingEventEntry, HealingEventOutcome, HistorySource, SelectorHistoryEntry, StepKey,
};
pub use records::{HealingRecord, HealingRecordStatus, ManualOverride, NewHeal};
pub use stats::{CounterSnapshot, HealingStats, HealingTelemetry};
pub use store::HealingStore;
