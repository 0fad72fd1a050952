//! Storage collaborators for SyncTool.
//!
//! This module provides the versioned storage the synchronization core runs
//! on top of:
//! - a document store abstraction with atomic batch commits, backed either
//!   by memory or by the local filesystem
//! - snapshot histories of folder trees and the diffs between snapshots
//! - the group lock that guards shared and exclusive access
//!
//! # Design Principles
//! - Async operations: all I/O goes through async traits
//! - Atomic batches: a partially applied batch is never observable
//! - Unified error semantics: every backend reports `synctool_common::Error`

pub mod diff;
pub mod group;
pub mod history;
pub mod local;
pub mod memory;
pub mod scan;
pub mod store;
pub mod tree;

pub use diff::{FileSystemDiff, MultiFileSystemDiff, PathFilter};
pub use group::{GroupGuard, GroupLock, LockState};
pub use history::{get_changes, History, Snapshot, StoreHistory};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use scan::scan_directory;
pub use store::{DocumentStore, WriteBatch, WriteOp};
pub use tree::{Directory, FileEntry};
