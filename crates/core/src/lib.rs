//! Conflux core library.
//!
//! This crate provides the engine for working through a repository's merge
//! conflicts: scanning unmerged paths, tracking per-path resolution state,
//! launching external diff/merge tools, and the resolution workflow that
//! ties them together (continuous resolve, filtering, undo and abort).

pub mod config;
pub mod conflict;
pub mod conflict_log;
pub mod errors;
pub mod events;
pub mod filter;
pub mod registry;
pub mod scanner;
pub mod tools;
pub mod vcs;
pub mod workflow;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ConflictKind, ConflictRecord, ResolutionAction, ResolutionMethod, ResolutionState};
pub use errors::{CoreError, WorkflowError};
pub use events::{EventSink, WorkflowEvent};
pub use filter::PathFilter;
pub use registry::{Progress, Registry, RegistryHandle};
pub use vcs::{GitVcs, Vcs};
pub use workflow::{Command, StepOutcome, Workflow, WorkflowState};
