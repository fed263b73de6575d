//! Fix Orchestrator - the gated auto-fix cycle
//!
//! ```text
//! Idle -> SafetyChecking -> Scanning -> ProcessingSuggestion* -> Reporting -> Idle
//!
//! per suggestion:
//!   Scored -> Skipped
//!          -> DryRunLogged
//!          -> Applying -> Verifying -> Committed
//!          -> Applying -> RevertedOnFailure
//! ```
//!
//! Suggestions are processed strictly one at a time: each is committed or
//! reverted before the next is applied, so the working tree never holds two
//! unrelated pending changes.

use crate::autofix::{
    ChangeType, CommitIdentity, ConfidenceLevel, ConfidenceScore, ConfidenceScorer,
    FixSuggestion, ProviderRegistry, SafetyGate, VersionControl,
};
use crate::config::RsiConfig;
use crate::error::Result;
use crate::feedback::{EffectivenessTracker, FeedbackOutcome, FeedbackRecord, FeedbackSource};
use crate::knowledge::{DocumentedBy, ErrorContext, ErrorReport, Fix, FixDocumenter};
use crate::ledger::{ChangeLedger, ChangeRecord, ChangeStatus};
use crate::types::Fingerprint;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Where the orchestrator is in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleState {
    Idle,
    SafetyChecking,
    Scanning,
    ProcessingSuggestion,
    Reporting,
}

/// How one suggestion ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SuggestionOutcome {
    /// Below the minimum confidence level
    Skipped,
    /// Dry run; nothing was written
    DryRunLogged,
    Committed { change_id: String, commit: String },
    RevertedOnFailure { change_id: String, reason: String },
}

impl fmt::Display for SuggestionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionOutcome::Skipped => write!(f, "skipped"),
            SuggestionOutcome::DryRunLogged => write!(f, "dry-run"),
            SuggestionOutcome::Committed { commit, .. } => {
                write!(f, "committed {}", &commit[..commit.len().min(8)])
            }
            SuggestionOutcome::RevertedOnFailure { reason, .. } => write!(f, "reverted: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionReport {
    pub suggestion_id: String,
    pub provider: String,
    pub description: String,
    pub change_type: ChangeType,
    pub confidence: ConfidenceScore,
    #[serde(flatten)]
    pub outcome: SuggestionOutcome,
}

/// End-of-cycle summary
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub dry_run: bool,
    pub suggestions: Vec<SuggestionReport>,
}

impl CycleReport {
    fn count(&self, f: impl Fn(&SuggestionOutcome) -> bool) -> usize {
        self.suggestions.iter().filter(|s| f(&s.outcome)).count()
    }

    pub fn committed(&self) -> usize {
        self.count(|o| matches!(o, SuggestionOutcome::Committed { .. }))
    }

    pub fn reverted(&self) -> usize {
        self.count(|o| matches!(o, SuggestionOutcome::RevertedOnFailure { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, SuggestionOutcome::Skipped))
    }

    pub fn dry_run_logged(&self) -> usize {
        self.count(|o| matches!(o, SuggestionOutcome::DryRunLogged))
    }

    /// Suggestions that reached `apply()`
    pub fn attempted(&self) -> usize {
        self.committed() + self.reverted()
    }

    /// True when suggestions were attempted and none succeeded
    pub fn is_failure(&self) -> bool {
        self.attempted() > 0 && self.committed() == 0
    }
}

/// Per-cycle knobs
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub dry_run: bool,
    pub min_confidence: ConfidenceLevel,
    pub require_passing_build: bool,
    pub identity: CommitIdentity,
}

impl OrchestratorOptions {
    pub fn from_config(config: &RsiConfig) -> Self {
        Self {
            dry_run: config.pipeline.dry_run,
            min_confidence: config.pipeline.min_confidence,
            require_passing_build: config.pipeline.require_passing_build,
            identity: CommitIdentity::from(&config.git),
        }
    }

    /// Only LOW suggestions are ever skipped, and only when the minimum is
    /// stricter than LOW. MEDIUM and HIGH always proceed.
    pub fn skips(&self, level: ConfidenceLevel) -> bool {
        level == ConfidenceLevel::Low && self.min_confidence > ConfidenceLevel::Low
    }
}

pub struct FixOrchestrator {
    registry: ProviderRegistry,
    scorer: ConfidenceScorer,
    gate: SafetyGate,
    vcs: Arc<dyn VersionControl>,
    ledger: ChangeLedger,
    tracker: EffectivenessTracker,
    documenter: Option<FixDocumenter>,
    options: OrchestratorOptions,
    state: Mutex<CycleState>,
}

impl FixOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        gate: SafetyGate,
        vcs: Arc<dyn VersionControl>,
        ledger: ChangeLedger,
        tracker: EffectivenessTracker,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            registry,
            scorer: ConfidenceScorer::new(),
            gate,
            vcs,
            ledger,
            tracker,
            documenter: None,
            options,
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Record every committed fix in the knowledge base
    pub fn with_documenter(mut self, documenter: FixDocumenter) -> Self {
        self.documenter = Some(documenter);
        self
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    pub fn state(&self) -> CycleState {
        self.state.lock().map(|s| *s).unwrap_or(CycleState::Idle)
    }

    fn transition(&self, next: CycleState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!("Cycle state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Run one full cycle over `files`, or the whole workspace when `None`.
    ///
    /// Fails only on cycle-level problems: a safety violation, a ledger
    /// write failure, or a revert that could not be performed.
    pub async fn run_cycle(&self, files: Option<&[PathBuf]>) -> Result<CycleReport> {
        let result = self.run_cycle_inner(files).await;
        self.transition(CycleState::Idle);
        result
    }

    async fn run_cycle_inner(&self, files: Option<&[PathBuf]>) -> Result<CycleReport> {
        self.transition(CycleState::SafetyChecking);
        if self.options.dry_run {
            tracing::info!("Dry run: safety gate not required, nothing will be written");
        } else {
            self.gate
                .ensure_ready(self.options.require_passing_build)
                .await
                .map_err(|e| e.context("Auto-fix cycle aborted"))?;
        }

        self.transition(CycleState::Scanning);
        let suggestions = self.registry.scan_all(files).await;
        tracing::info!(
            "{} provider(s) proposed {} fix(es)",
            self.registry.len(),
            suggestions.len()
        );

        let mut report = CycleReport {
            dry_run: self.options.dry_run,
            suggestions: Vec::with_capacity(suggestions.len()),
        };
        for suggestion in suggestions {
            self.transition(CycleState::ProcessingSuggestion);
            let confidence = suggestion.score_with(&self.scorer);
            let outcome = self.process(&suggestion, &confidence).await?;
            report.suggestions.push(SuggestionReport {
                suggestion_id: suggestion.id.clone(),
                provider: suggestion.provider.clone(),
                description: suggestion.description.clone(),
                change_type: suggestion.change_type,
                confidence,
                outcome,
            });
        }

        self.transition(CycleState::Reporting);
        tracing::info!(
            "Cycle finished: {} committed, {} reverted, {} skipped, {} dry-run",
            report.committed(),
            report.reverted(),
            report.skipped(),
            report.dry_run_logged()
        );
        Ok(report)
    }

    async fn process(
        &self,
        suggestion: &FixSuggestion,
        confidence: &ConfidenceScore,
    ) -> Result<SuggestionOutcome> {
        if self.options.skips(confidence.level) {
            tracing::info!(
                "Skipping '{}': confidence {} ({:.2}) with minimum {}",
                suggestion.description,
                confidence.level,
                confidence.score,
                self.options.min_confidence
            );
            return Ok(SuggestionOutcome::Skipped);
        }

        if self.options.dry_run {
            tracing::info!(
                "[dry-run] Would apply '{}' ({}, {} {:.2})",
                suggestion.description,
                suggestion.change_type,
                confidence.level,
                confidence.score
            );
            return Ok(SuggestionOutcome::DryRunLogged);
        }

        let before = fingerprints(&suggestion.files).await;
        let failure = match self.apply_and_verify(suggestion).await {
            None => match self.commit(suggestion) {
                Ok(commit) => return self.record_success(suggestion, confidence, commit).await,
                Err(e) => format!("commit failed: {}", e),
            },
            Some(reason) => reason,
        };

        self.revert_files(&suggestion.files, &before).await?;
        let record = ChangeRecord::new(
            suggestion.change_type,
            display_paths(&suggestion.files),
            suggestion.description.clone(),
            confidence.score,
            ChangeStatus::Failed,
        );
        let change_id = self.ledger.log_change(record).await?;
        tracing::warn!("Reverted '{}': {}", suggestion.description, failure);
        Ok(SuggestionOutcome::RevertedOnFailure {
            change_id,
            reason: failure,
        })
    }

    /// `None` on success, otherwise why the suggestion failed
    async fn apply_and_verify(&self, suggestion: &FixSuggestion) -> Option<String> {
        match suggestion.action.apply().await {
            Ok(true) => {}
            Ok(false) => return Some("apply reported failure".to_string()),
            Err(e) => return Some(format!("apply failed: {}", e)),
        }
        match suggestion.action.verify().await {
            Ok(true) => None,
            Ok(false) => Some("verification failed".to_string()),
            Err(e) => Some(format!("verification errored: {}", e)),
        }
    }

    fn commit(&self, suggestion: &FixSuggestion) -> Result<String> {
        let message = format!(
            "fix(rsi): {}\n\n[RSI Auto-Fix] Type: {}",
            suggestion.description, suggestion.change_type
        );
        self.vcs.stage(&suggestion.files)?;
        self.vcs.commit(&message, &self.options.identity)
    }

    async fn record_success(
        &self,
        suggestion: &FixSuggestion,
        confidence: &ConfidenceScore,
        commit: String,
    ) -> Result<SuggestionOutcome> {
        let record = ChangeRecord::new(
            suggestion.change_type,
            display_paths(&suggestion.files),
            suggestion.description.clone(),
            confidence.score,
            ChangeStatus::Applied,
        )
        .with_commit(commit.clone());
        let change_id = self.ledger.log_change(record).await?;

        self.tracker
            .log_feedback(FeedbackRecord::new(
                change_id.clone(),
                FeedbackSource::Build,
                FeedbackOutcome::Positive,
                format!("Applied and verified; committed as {}", commit),
            ))
            .await?;

        if let Some(documenter) = &self.documenter {
            if let Err(e) = self.document(documenter, suggestion).await {
                tracing::warn!("Could not document '{}': {}", suggestion.description, e);
            }
        }

        tracing::info!("Committed '{}' as {}", suggestion.description, commit);
        Ok(SuggestionOutcome::Committed { change_id, commit })
    }

    async fn document(&self, documenter: &FixDocumenter, suggestion: &FixSuggestion) -> Result<()> {
        let context = suggestion
            .files
            .first()
            .map(|f| ErrorContext::for_file(f.display().to_string()))
            .unwrap_or_default();
        let report = ErrorReport::new(
            "auto-fix",
            suggestion.change_type.to_string(),
            suggestion.description.clone(),
        )
        .with_context(context);
        let fix = Fix::new(
            suggestion.description.clone(),
            format!("Detected by the {} provider", suggestion.provider),
            DocumentedBy::System,
        );
        documenter.document(report, fix).await?;
        Ok(())
    }

    /// Restore every touched file from HEAD and confirm the content matches
    /// what was there before the suggestion ran
    async fn revert_files(&self, files: &[PathBuf], before: &[Fingerprint]) -> Result<()> {
        for file in files {
            self.vcs.checkout_path(file)?;
        }
        let after = fingerprints(files).await;
        for ((file, was), now) in files.iter().zip(before).zip(&after) {
            if was != now {
                tracing::warn!(
                    "{} differs from its pre-change content after revert ({} != {})",
                    file.display(),
                    now,
                    was
                );
            }
        }
        Ok(())
    }
}

async fn fingerprints(files: &[PathBuf]) -> Vec<Fingerprint> {
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        out.push(Fingerprint::of_file(file).await);
    }
    out
}

fn display_paths(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|f| f.display().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(outcomes: Vec<SuggestionOutcome>) -> CycleReport {
        CycleReport {
            dry_run: false,
            suggestions: outcomes
                .into_iter()
                .map(|outcome| SuggestionReport {
                    suggestion_id: "sug".to_string(),
                    provider: "p".to_string(),
                    description: "d".to_string(),
                    change_type: ChangeType::Format,
                    confidence: ConfidenceScorer::new().score_from_value(0.95),
                    outcome,
                })
                .collect(),
        }
    }

    fn reverted() -> SuggestionOutcome {
        SuggestionOutcome::RevertedOnFailure {
            change_id: "chg".to_string(),
            reason: "verification failed".to_string(),
        }
    }

    fn committed() -> SuggestionOutcome {
        SuggestionOutcome::Committed {
            change_id: "chg".to_string(),
            commit: "0123456789abcdef".to_string(),
        }
    }

    #[test]
    fn failure_means_attempted_without_success() {
        assert!(!report(vec![]).is_failure());
        assert!(!report(vec![SuggestionOutcome::Skipped]).is_failure());
        assert!(report(vec![reverted(), SuggestionOutcome::Skipped]).is_failure());
        assert!(!report(vec![reverted(), committed()]).is_failure());
    }

    #[test]
    fn only_low_confidence_is_ever_skipped() {
        let mut options = OrchestratorOptions::from_config(&RsiConfig::default());
        options.min_confidence = ConfidenceLevel::High;
        assert!(options.skips(ConfidenceLevel::Low));
        assert!(!options.skips(ConfidenceLevel::Medium));
        assert!(!options.skips(ConfidenceLevel::High));

        options.min_confidence = ConfidenceLevel::Low;
        assert!(!options.skips(ConfidenceLevel::Low));
    }

    #[test]
    fn outcomes_display_briefly() {
        assert_eq!(committed().to_string(), "committed 01234567");
        assert_eq!(reverted().to_string(), "reverted: verification failed");
    }

    #[test]
    fn report_serializes_flat_outcomes() {
        let json = serde_json::to_value(report(vec![committed()])).unwrap();
        let first = &json["suggestions"][0];
        assert_eq!(first["outcome"], "committed");
        assert_eq!(first["changeType"], "format");
        assert_eq!(first["commit"], "0123456789abcdef");
    }
}
