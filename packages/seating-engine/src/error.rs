use thiserror::Error;

/// Preconditions the engine refuses to work around. Data problems inside an
/// arrangement are reported as [`crate::validate::Finding`]s instead.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no confirmed guests to seat")]
    NoConfirmedGuests,

    #[error("no tables available and automatic table creation is disabled")]
    NoTablesAvailable,

    #[error("table {table_id} has capacity {capacity}, minimum is {minimum}")]
    InvalidCapacity {
        table_id: String,
        capacity: u32,
        minimum: u32,
    },

    #[error("table id {table_id} is used by more than one table")]
    DuplicateTableId { table_id: String },
}
