//! SyncTool synchronization core.
//!
//! This module computes, for every path of a group of histories, whether
//! the copies have converged, diverged or drifted, and keeps a durable
//! queue of the resulting actions:
//! - Per-path change graphs built from the histories' diffs
//! - Conflict classification and action derivation
//! - The sync action state machine and its persistence
//! - Synchronization rounds and the application of queued actions

pub mod action;
pub mod applier;
pub mod change_graph;
pub mod codec;
pub mod config;
pub mod conflict;
pub mod graph;
pub mod group;
pub mod service;
pub mod state;
pub mod sync_point;
pub mod synchronizer;

// Re-export main types
pub use action::{SyncAction, SyncActionKind, SyncActionVisitor};
pub use applier::{ActionApplier, ApplyReport};
pub use change_graph::{ChangeGraph, ChangeGraphService, Version};
pub use config::{GroupConfig, GroupVersion, CONFIG_FILENAME, STORE_DIRNAME};
pub use conflict::{classify, Classification, SyncActionSet};
pub use graph::{AcyclicGraph, Graph, Node, NodeIndex};
pub use group::Group;
pub use service::SyncActionService;
pub use state::SyncActionState;
pub use sync_point::{HistoryRange, SyncPoint, SyncPointService};
pub use synchronizer::{SyncReport, Synchronizer};
