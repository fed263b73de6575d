//! # RSI Core
//!
//! Recursive self-improvement engine: a knowledge base of observed errors
//! and accepted fixes, fuzzy lookup against that history, synthesis of
//! patterns and enforceable rules from repeated fixes, and a gated auto-fix
//! pipeline that scores, applies, verifies, commits or reverts changes and
//! records every outcome.
//!
//! ## Layout
//!
//! - [`knowledge`]: knowledge store, keyword index, similarity matcher, fix documenter
//! - [`learning`]: pattern extraction and rule synthesis
//! - [`autofix`]: confidence scoring, safety gate, version control, providers
//! - [`orchestrator`]: the auto-fix cycle
//! - [`ledger`]: change ledger and rollback
//! - [`rules`]: rule activation
//! - [`feedback`]: outcome feedback and metrics
//! - [`engine`]: wiring for one workspace

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

pub mod autofix;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod knowledge;
pub mod learning;
pub mod ledger;
pub mod orchestrator;
pub mod rules;
pub mod storage;
pub mod types;

// Re-exports for convenience
pub use autofix::{ChangeType, ConfidenceLevel, ConfidenceScore, ConfidenceScorer};
pub use config::{RsiConfig, StatePaths, DEFAULT_CONFIG_FILE};
pub use engine::{LearnReport, RsiEngine};
pub use error::{Result, ResultExt, RsiError};
pub use feedback::{EffectivenessTracker, Metrics};
pub use knowledge::KnowledgeStore;
pub use ledger::{ChangeLedger, ChangeRecord, ChangeStatus, RollbackManager};
pub use orchestrator::{CycleReport, FixOrchestrator, OrchestratorOptions};
pub use rules::RuleManager;

/// Version of RSI Core
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
