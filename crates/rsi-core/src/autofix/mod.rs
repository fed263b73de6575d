//! Auto-fix machinery
//!
//! - [`confidence`]: scoring proposed mutations
//! - [`safety`]: clean-tree and build-check preconditions
//! - [`vcs`]: version-control collaborator (git)
//! - [`provider`]: the provider protocol and registry
//! - [`providers`]: built-in providers
//!
//! The pipeline that drives them lives in [`crate::orchestrator`].

pub mod confidence;
pub mod provider;
pub mod providers;
pub mod safety;
pub mod vcs;

// Re-exports
pub use confidence::{
    ChangeType, ChangeTypeHistory, ConfidenceLevel, ConfidenceScore, ConfidenceScorer,
};
pub use provider::{
    ConfidenceInput, FileRewrite, FixProvider, FixSuggestion, ProviderRegistry, SuggestionAction,
    Transform,
};
pub use providers::{builtin_registry, SourceFiles};
pub use safety::{build_check_from_argv, BuildCheck, CommandCheck, SafetyGate, SkipCheck};
pub use vcs::{CommitIdentity, GitRepository, Reverted, VersionControl};
