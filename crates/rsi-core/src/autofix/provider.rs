//! Fix Provider protocol
//!
//! A provider scans files and proposes [`FixSuggestion`]s. Scanning never
//! mutates anything; each suggestion carries an action the orchestrator
//! applies later, one at a time.

use crate::autofix::confidence::{ChangeType, ConfidenceScore, ConfidenceScorer};
use crate::autofix::safety::{BuildCheck, SafetyGate};
use crate::error::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Scanner that proposes fixes
#[async_trait]
pub trait FixProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Propose fixes for `files`, or for the whole workspace when `None`
    async fn scan(&self, files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>>;
}

/// The mutation behind a suggestion
#[async_trait]
pub trait SuggestionAction: Send + Sync + fmt::Debug {
    /// Perform the mutation; `Ok(false)` means it could not be applied
    async fn apply(&self) -> Result<bool>;

    /// Re-validate after applying. Actions are self-verifying by default.
    async fn verify(&self) -> Result<bool> {
        Ok(true)
    }
}

/// How a suggestion's confidence is determined
#[derive(Debug, Clone, PartialEq)]
pub enum ConfidenceInput {
    /// Provider-computed probability
    Raw(f64),
    /// Inputs to the heuristic formula
    Heuristic {
        complexity: f64,
        coverage: f64,
        risk_factors: Vec<String>,
    },
}

impl ConfidenceInput {
    pub fn heuristic(complexity: f64, coverage: f64) -> Self {
        ConfidenceInput::Heuristic {
            complexity,
            coverage,
            risk_factors: Vec::new(),
        }
    }
}

/// A candidate mutation
#[derive(Debug)]
pub struct FixSuggestion {
    pub id: String,
    /// Provider that proposed it
    pub provider: String,
    pub description: String,
    pub files: Vec<PathBuf>,
    pub change_type: ChangeType,
    pub confidence: ConfidenceInput,
    pub action: Box<dyn SuggestionAction>,
}

impl FixSuggestion {
    pub fn score_with(&self, scorer: &ConfidenceScorer) -> ConfidenceScore {
        match &self.confidence {
            ConfidenceInput::Raw(value) => scorer.score_from_value(*value),
            ConfidenceInput::Heuristic {
                complexity,
                coverage,
                risk_factors,
            } => scorer.score(self.change_type, *complexity, *coverage, risk_factors),
        }
    }
}

/// Pure text transformation; `None` when there is nothing to change
pub type Transform = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Rewrites one file through a [`Transform`] applied to its current content.
///
/// The content is read at apply time, so several suggestions against the same
/// file compose instead of overwriting each other.
pub struct FileRewrite {
    path: PathBuf,
    transform: Transform,
    check: Option<Arc<dyn BuildCheck>>,
}

impl FileRewrite {
    pub fn new(path: impl Into<PathBuf>, transform: Transform) -> Self {
        Self {
            path: path.into(),
            transform,
            check: None,
        }
    }

    /// Verify by running the build check narrowed to this file
    pub fn verified_by(mut self, check: Option<Arc<dyn BuildCheck>>) -> Self {
        self.check = check;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileRewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRewrite")
            .field("path", &self.path)
            .field("verified", &self.check.is_some())
            .finish()
    }
}

#[async_trait]
impl SuggestionAction for FileRewrite {
    async fn apply(&self) -> Result<bool> {
        let current = tokio::fs::read_to_string(&self.path).await?;
        let Some(updated) = (self.transform)(&current) else {
            tracing::debug!("{} no longer needs this change", self.path.display());
            return Ok(false);
        };
        if !SafetyGate::validate_non_empty(&updated) {
            tracing::warn!("Refusing to write empty content to {}", self.path.display());
            return Ok(false);
        }
        tokio::fs::write(&self.path, updated).await?;
        Ok(true)
    }

    async fn verify(&self) -> Result<bool> {
        match &self.check {
            Some(check) => {
                let selector = self.path.to_string_lossy();
                check.run(Some(selector.as_ref())).await
            }
            None => Ok(true),
        }
    }
}

/// The set of providers an orchestrator drives
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn FixProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn FixProvider>) {
        tracing::debug!("Registered fix provider '{}'", provider.name());
        self.providers.push(provider);
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Scan with every provider concurrently and concatenate the results in
    /// registration order. A provider that errors contributes nothing.
    pub async fn scan_all(&self, files: Option<&[PathBuf]>) -> Vec<FixSuggestion> {
        let scans = self.providers.iter().map(|provider| async move {
            (provider.name().to_string(), provider.scan(files).await)
        });

        let mut suggestions = Vec::new();
        for (name, result) in join_all(scans).await {
            match result {
                Ok(found) => {
                    tracing::debug!("Provider '{}' proposed {} fix(es)", name, found.len());
                    suggestions.extend(found);
                }
                Err(e) => tracing::warn!("Provider '{}' failed to scan: {}", name, e),
            }
        }
        suggestions
    }
}
