//! Common error types for SyncTool.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for SyncTool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid input provided (malformed argument to a constructor or call).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A value did not have the expected shape.
    #[error("Format error: {0}")]
    Format(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A sync action with the same id is already stored.
    #[error("Sync action {0} already exists")]
    DuplicateSyncAction(Uuid),

    /// The sync action to update or remove is not stored.
    #[error("Sync action {0} not found")]
    SyncActionNotFound(Uuid),

    /// A sync action cannot be applied to the current state of a tree.
    #[error("Not applicable: {0}")]
    NotApplicable(String),

    /// The operation is not valid for the object's current contents.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A sync action state change that the state machine does not allow.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The group is already opened in a conflicting mode.
    #[error("Group '{0}' is already opened")]
    GroupOpened(String),

    /// A snapshot id could not be resolved.
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// The bounds of a snapshot range are out of order.
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
