//! Component wiring for one workspace
//!
//! [`RsiEngine`] resolves every persisted artifact from the configuration and
//! hands out the components built on top of them. Nothing here is global;
//! each component receives the stores it uses.

use crate::autofix::{
    build_check_from_argv, builtin_registry, BuildCheck, CommitIdentity, ConfidenceScorer,
    GitRepository, SafetyGate, VersionControl,
};
use crate::config::{RsiConfig, StatePaths};
use crate::error::{Result, ResultExt};
use crate::feedback::EffectivenessTracker;
use crate::knowledge::{FixDocumenter, KeywordIndex, KnowledgeStore, SimilarityMatcher};
use crate::learning::{RuleSynthesizer, SynthesisReport};
use crate::ledger::{ChangeLedger, RollbackManager};
use crate::orchestrator::{FixOrchestrator, OrchestratorOptions};
use crate::rules::RuleManager;
use crate::storage::StateLock;
use crate::types::Fingerprint;
use std::path::Path;
use std::sync::Arc;

/// Result of a learning pass
#[derive(Debug, Clone, Default)]
pub struct LearnReport {
    pub synthesis: SynthesisReport,
    /// Ids of rules newly published to an enforcement surface
    pub activated: Vec<String>,
    /// Commit recording the enforcement config change, if it changed
    pub commit: Option<String>,
}

#[derive(Clone)]
pub struct RsiEngine {
    config: RsiConfig,
    paths: StatePaths,
    store: KnowledgeStore,
    index: KeywordIndex,
    ledger: ChangeLedger,
    tracker: EffectivenessTracker,
    vcs: Arc<dyn VersionControl>,
    checks: Arc<dyn BuildCheck>,
}

impl RsiEngine {
    /// Wire an engine for the workspace at `root`, using git and the
    /// configured build command
    pub fn new(root: &Path, config: RsiConfig) -> Self {
        let paths = config.state_paths(root);
        let vcs = Arc::new(GitRepository::new(root).ignoring(&paths.state_dir));
        let checks = build_check_from_argv(&config.build.command, root);
        Self::with_collaborators(config, paths, vcs, checks)
    }

    /// Wire an engine around explicit version-control and build-check collaborators
    pub fn with_collaborators(
        config: RsiConfig,
        paths: StatePaths,
        vcs: Arc<dyn VersionControl>,
        checks: Arc<dyn BuildCheck>,
    ) -> Self {
        let store = KnowledgeStore::new(&paths.knowledge);
        let index = KeywordIndex::new(&paths.index, store.clone());
        let ledger = ChangeLedger::new(&paths.ledger);
        let tracker = EffectivenessTracker::new(&paths.feedback, ledger.clone());
        Self {
            config,
            paths,
            store,
            index,
            ledger,
            tracker,
            vcs,
            checks,
        }
    }

    pub fn config(&self) -> &RsiConfig {
        &self.config
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn index(&self) -> &KeywordIndex {
        &self.index
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    pub fn tracker(&self) -> &EffectivenessTracker {
        &self.tracker
    }

    pub fn matcher(&self) -> SimilarityMatcher {
        SimilarityMatcher::new(self.store.clone())
    }

    pub fn documenter(&self) -> FixDocumenter {
        FixDocumenter::new(self.store.clone(), self.index.clone())
    }

    pub fn synthesizer(&self) -> RuleSynthesizer {
        RuleSynthesizer::new(self.store.clone())
    }

    pub fn rule_manager(&self) -> RuleManager {
        RuleManager::new(&self.paths.enforcement_config, &self.paths.custom_rules)
    }

    pub fn rollback_manager(&self) -> RollbackManager {
        RollbackManager::new(
            self.ledger.clone(),
            Arc::clone(&self.vcs),
            CommitIdentity::from(&self.config.git),
        )
    }

    /// Hold the state directory for the duration of a mutating command
    pub fn lock(&self) -> Result<StateLock> {
        StateLock::acquire(&self.paths.state_dir)
    }

    /// An orchestrator over the configured providers, scoring with the
    /// ledger's per change type history and documenting committed fixes
    pub async fn orchestrator(&self) -> Result<FixOrchestrator> {
        let history = self.tracker.change_type_stats().await?;
        let registry = builtin_registry(&self.config, &self.paths, Some(Arc::clone(&self.checks)));
        let gate = SafetyGate::new(Arc::clone(&self.vcs), Arc::clone(&self.checks));

        Ok(FixOrchestrator::new(
            registry,
            gate,
            Arc::clone(&self.vcs),
            self.ledger.clone(),
            self.tracker.clone(),
            OrchestratorOptions::from_config(&self.config),
        )
        .with_scorer(ConfidenceScorer::new().with_history(history))
        .with_documenter(self.documenter()))
    }

    /// Synthesize patterns and rules from recent fixes, publish the rules,
    /// and refresh the index when the knowledge base changed.
    ///
    /// Publishing may edit the tracked enforcement config; that edit is
    /// committed so the next auto-fix cycle starts from a clean tree.
    pub async fn learn(&self, days: i64) -> Result<LearnReport> {
        let synthesis = self.synthesizer().generate_rules_from_recent_fixes(days).await?;

        let manager = self.rule_manager();
        let config_before = Fingerprint::of_file(&self.paths.enforcement_config).await;
        let mut activated = Vec::new();
        for rule in &synthesis.rules {
            match manager.activate_rule(rule).await {
                Ok(true) => activated.push(rule.id.clone()),
                Ok(false) => {}
                Err(e) => tracing::warn!("Could not activate rule {}: {}", rule.id, e),
            }
        }

        if !synthesis.is_empty() {
            self.index.rebuild().await?;
        }

        let commit = if Fingerprint::of_file(&self.paths.enforcement_config).await != config_before {
            Some(
                self.commit_enforcement_config(&activated)
                    .context("Committing enforcement config")?,
            )
        } else {
            None
        };

        tracing::info!(
            "Learning pass: {} pattern(s), {} rule(s), {} activated",
            synthesis.patterns.len(),
            synthesis.rules.len(),
            activated.len()
        );
        Ok(LearnReport {
            synthesis,
            activated,
            commit,
        })
    }

    fn commit_enforcement_config(&self, activated: &[String]) -> Result<String> {
        let message = format!(
            "chore(rsi): activate {} synthesized rule(s)\n\n[RSI Auto-Fix] Rules: {}",
            activated.len(),
            activated.join(", ")
        );
        self.vcs.stage(&[self.paths.enforcement_config.clone()])?;
        let commit = self.vcs.commit(&message, &CommitIdentity::from(&self.config.git))?;
        tracing::info!(
            "Committed {} as {}",
            self.paths.enforcement_config.display(),
            commit
        );
        Ok(commit)
    }
}
