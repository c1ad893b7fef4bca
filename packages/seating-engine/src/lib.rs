//! # seating-engine
//!
//! Seat assignment core for the Seating Suite event planner.
//!
//! These types and algorithms are used by:
//! - `backend-rust`: HTTP handlers that generate, save, validate and compact
//!   per-event seating plans
//! - anything else that needs to reason about a plan offline (imports, tests)
//!
//! Everything in here is pure and synchronous. Persistence, locking and
//! version checks live in the backend.
//!
//! ## Pipeline
//!
//! 1. [`auto_tables::TableFactory`] covers capacity shortfalls with new tables
//! 2. [`assign::SeatingEngine`] seats confirmed guests (fresh or incremental)
//! 3. [`optimize::compact`] removes duplicates and merges sparse tables
//! 4. [`validate::validate`] / [`stats::compute`] report on the result
//!
//! [`ledger::TriggerLedger`] sits beside the pipeline and records that the
//! guest list changed; it never touches an arrangement.
//!
//! ## Invariants
//! - a guest id appears under at most one table in an engine-produced arrangement
//! - seated party sizes never exceed a table's capacity on generation
//! - `cannotSitTogether` pairs never share a table on generation

pub mod assign;
pub mod auto_tables;
pub mod config;
pub mod constraints;
pub mod error;
pub mod ledger;
pub mod model;
pub mod optimize;
pub mod stats;
pub mod validate;

pub use assign::{first_duplicate_id, GenerationMode, GenerationOutcome, GenerationRequest, SeatingEngine, TablePolicy};
pub use auto_tables::TableFactory;
pub use config::EngineConfig;
pub use constraints::ConstraintIndex;
pub use error::EngineError;
pub use ledger::{ChangeType, RecordOutcome, RingBuffer, SyncTrigger, TriggerLedger};
pub use model::{
    Arrangement, GroupMixingRule, GroupRequest, Guest, GuestStatus, PairRule, Position, Preferences,
    Table, TableShape,
};
pub use optimize::{compact, CompactionReport};
pub use stats::{SeatingStatistics, TableStatistics};
pub use validate::{validate, Finding};
