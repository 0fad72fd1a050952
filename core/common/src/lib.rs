//! Common utilities and types shared across SyncTool modules.
//!
//! This module provides the foundational value types used throughout the
//! codebase: paths, snapshot ids, file references and observed changes.

pub mod change;
pub mod error;
pub mod file;
pub mod types;

pub use change::{Change, ChangeList, ChangeType};
pub use error::{Error, Result};
pub use file::{File, FileReference};
pub use types::{SnapshotId, SyncPath};
