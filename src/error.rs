//! Error types shared across the board engine and its adapters.

use thiserror::Error;

use crate::fields::{ApprovalStatus, RowId};

/// Why a requested transition was refused before anything was applied.
///
/// Display strings are user-facing: the terminal board and CLI print them as is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("cannot drag into a closed status")]
    ClosedTarget,

    #[error("cannot change a closed record")]
    ClosedRecord,

    #[error("task #{task} needs an approved review before it can be marked Done (approval is {status:?})")]
    ApprovalRequired { task: RowId, status: ApprovalStatus },

    #[error("task #{task} does not require approval")]
    ApprovalNotRequired { task: RowId },

    #[error("cannot {action} while approval is {status:?}")]
    InvalidApprovalState { action: &'static str, status: ApprovalStatus },

    #[error("record #{0} is not on this board")]
    UnknownEntity(RowId),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("record #{entity} is no longer at the dragged position")]
    StalePosition { entity: RowId },

    #[error("no failed change #{0} to retry")]
    NothingToRetry(u64),
}

/// Structural errors raised by the in-memory board.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("record #{0} is not on this board")]
    UnknownEntity(RowId),

    #[error("record #{entity} is not at {column}[{index}]")]
    StalePosition { entity: RowId, column: &'static str, index: usize },
}

impl From<BoardError> for RejectionReason {
    fn from(e: BoardError) -> Self {
        match e {
            BoardError::UnknownEntity(id) => RejectionReason::UnknownEntity(id),
            BoardError::StalePosition { entity, .. } => RejectionReason::StalePosition { entity },
        }
    }
}

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed before a response arrived
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server answered with a non-success status
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("row {row} not found in table {table}")]
    NotFound { table: u64, row: RowId },

    #[error("unknown table {0}")]
    UnknownTable(u64),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl StoreError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            StoreError::Server { status, .. } => *status == 429 || *status >= 500,
            StoreError::Io(_) => true,
            _ => false,
        }
    }
}

/// A row could not be mapped onto a typed entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("row has no numeric id")]
    MissingId,

    #[error("row {row}: field '{field}' is missing")]
    MissingField { row: RowId, field: &'static str },

    #[error("row {row}: field '{field}' has unexpected value '{value}'")]
    InvalidValue { row: RowId, field: &'static str, value: String },
}

/// Errors from the automation webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected with status {0}")]
    Rejected(u16),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("invalid config {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

/// Errors from console actions that may also touch the record store directly.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Rejected(#[from] RejectionReason),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

/// Result type for record store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
