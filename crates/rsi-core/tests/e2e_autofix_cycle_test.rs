//! E2E Test: Auto-fix cycle
//!
//! Drives the orchestrator through its gate, scan, apply, verify and commit
//! stages, both against recording fakes (to observe ordering and purity) and
//! against a real git repository (to observe reverts and rollbacks).

use async_trait::async_trait;
use rsi_core::autofix::{
    BuildCheck, ChangeType, CommitIdentity, ConfidenceInput, ConfidenceLevel, FileRewrite,
    FixProvider, FixSuggestion, GitRepository, ProviderRegistry, Reverted, SafetyGate, SkipCheck,
    SuggestionAction, VersionControl,
};
use rsi_core::feedback::FeedbackOutcome;
use rsi_core::orchestrator::SuggestionOutcome;
use rsi_core::{
    ChangeLedger, ChangeStatus, EffectivenessTracker, FixOrchestrator, OrchestratorOptions,
    Result, RsiConfig, RsiEngine,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<&'static str>>>;

fn record(events: &Events, event: &'static str) {
    events.lock().unwrap().push(event);
}

fn position(events: &[&str], event: &str) -> usize {
    events
        .iter()
        .position(|e| *e == event)
        .unwrap_or_else(|| panic!("{} never happened in {:?}", event, events))
}

fn identity() -> CommitIdentity {
    CommitIdentity {
        name: "Test".to_string(),
        email: "test@localhost".to_string(),
    }
}

struct RecordingVcs {
    events: Events,
    clean: bool,
}

impl VersionControl for RecordingVcs {
    fn is_clean(&self) -> Result<bool> {
        record(&self.events, "is_clean");
        Ok(self.clean)
    }

    fn stage(&self, _paths: &[PathBuf]) -> Result<()> {
        record(&self.events, "stage");
        Ok(())
    }

    fn commit(&self, _message: &str, _identity: &CommitIdentity) -> Result<String> {
        record(&self.events, "commit");
        Ok("abc123".to_string())
    }

    fn revert_last_commit(&self, _identity: &CommitIdentity) -> Result<Reverted> {
        record(&self.events, "revert");
        Ok(Reverted {
            reverted: "abc123".to_string(),
            commit: "def456".to_string(),
        })
    }

    fn hard_reset(&self) -> Result<()> {
        record(&self.events, "hard_reset");
        Ok(())
    }

    fn checkout_path(&self, _path: &Path) -> Result<()> {
        record(&self.events, "checkout");
        Ok(())
    }
}

struct RecordingCheck {
    events: Events,
}

#[async_trait]
impl BuildCheck for RecordingCheck {
    async fn run(&self, _selector: Option<&str>) -> Result<bool> {
        record(&self.events, "check");
        Ok(true)
    }
}

#[derive(Debug)]
struct RecordingAction {
    events: Events,
}

#[async_trait]
impl SuggestionAction for RecordingAction {
    async fn apply(&self) -> Result<bool> {
        record(&self.events, "apply");
        Ok(true)
    }

    async fn verify(&self) -> Result<bool> {
        record(&self.events, "verify");
        Ok(true)
    }
}

struct RecordingProvider {
    events: Events,
    confidence: f64,
}

#[async_trait]
impl FixProvider for RecordingProvider {
    fn name(&self) -> &str {
        "recording"
    }

    async fn scan(&self, _files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>> {
        record(&self.events, "scan");
        Ok(vec![FixSuggestion {
            id: "sug-1".to_string(),
            provider: "recording".to_string(),
            description: "Tidy src/app.ts".to_string(),
            files: vec![PathBuf::from("src/app.ts")],
            change_type: ChangeType::Format,
            confidence: ConfidenceInput::Raw(self.confidence),
            action: Box::new(RecordingAction {
                events: Arc::clone(&self.events),
            }),
        }])
    }
}

fn options(dry_run: bool) -> OrchestratorOptions {
    OrchestratorOptions {
        dry_run,
        min_confidence: ConfidenceLevel::Medium,
        require_passing_build: true,
        identity: identity(),
    }
}

fn recording_orchestrator(
    dir: &tempfile::TempDir,
    events: &Events,
    clean: bool,
    dry_run: bool,
) -> (FixOrchestrator, ChangeLedger) {
    recording_orchestrator_with(dir, events, clean, 0.95, options(dry_run))
}

fn recording_orchestrator_with(
    dir: &tempfile::TempDir,
    events: &Events,
    clean: bool,
    confidence: f64,
    options: OrchestratorOptions,
) -> (FixOrchestrator, ChangeLedger) {
    let vcs: Arc<dyn VersionControl> = Arc::new(RecordingVcs {
        events: Arc::clone(events),
        clean,
    });
    let check = Arc::new(RecordingCheck {
        events: Arc::clone(events),
    });
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(RecordingProvider {
        events: Arc::clone(events),
        confidence,
    }));

    let ledger = ChangeLedger::new(dir.path().join("change-ledger.json"));
    let tracker = EffectivenessTracker::new(dir.path().join("feedback-log.json"), ledger.clone());
    let orchestrator = FixOrchestrator::new(
        registry,
        SafetyGate::new(Arc::clone(&vcs), check),
        vcs,
        ledger.clone(),
        tracker,
        options,
    );
    (orchestrator, ledger)
}

/// E2E test: stage ordering
///
/// Clean-tree check precedes the build check, which precedes scanning;
/// apply precedes verify, which precedes the commit.
#[tokio::test]
async fn e2e_cycle_runs_stages_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let events: Events = Arc::default();
    let (orchestrator, ledger) = recording_orchestrator(&dir, &events, true, false);

    let report = orchestrator.run_cycle(None).await.expect("cycle should succeed");
    assert_eq!(report.committed(), 1);
    assert!(!report.is_failure());

    let events = events.lock().unwrap().clone();
    assert!(position(&events, "is_clean") < position(&events, "check"));
    assert!(position(&events, "check") < position(&events, "scan"));
    assert!(position(&events, "scan") < position(&events, "apply"));
    assert!(position(&events, "apply") < position(&events, "verify"));
    assert!(position(&events, "verify") < position(&events, "stage"));
    assert!(position(&events, "stage") < position(&events, "commit"));
    assert!(!events.contains(&"checkout"));

    let history = ledger.get_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ChangeStatus::Applied);
    assert_eq!(history[0].commit.as_deref(), Some("abc123"));
    assert_eq!(history[0].files, vec!["src/app.ts".to_string()]);
}

/// E2E test: dry run writes nothing and applies nothing
#[tokio::test]
async fn e2e_dry_run_is_pure() {
    let dir = tempfile::tempdir().unwrap();
    let events: Events = Arc::default();
    // A dirty tree does not block a dry run
    let (orchestrator, ledger) = recording_orchestrator(&dir, &events, false, true);

    let report = orchestrator.run_cycle(None).await.expect("dry run should succeed");
    assert!(report.dry_run);
    assert_eq!(report.dry_run_logged(), 1);
    assert_eq!(report.committed(), 0);
    assert!(!report.is_failure());

    let events = events.lock().unwrap().clone();
    assert_eq!(events, vec!["scan"]);
    assert!(!ledger.path().exists());
    assert!(!dir.path().join("feedback-log.json").exists());
}

/// E2E test: a MEDIUM suggestion is committed even when the minimum is HIGH
///
/// Only LOW suggestions are ever held back by the confidence threshold.
#[tokio::test]
async fn e2e_medium_confidence_commits_under_high_minimum() {
    let dir = tempfile::tempdir().unwrap();
    let events: Events = Arc::default();
    let mut options = options(false);
    options.min_confidence = ConfidenceLevel::High;
    let (orchestrator, ledger) = recording_orchestrator_with(&dir, &events, true, 0.8, options);

    let report = orchestrator.run_cycle(None).await.expect("cycle should succeed");
    assert_eq!(report.committed(), 1);
    assert_eq!(report.skipped(), 0);

    let events = events.lock().unwrap().clone();
    assert!(events.contains(&"apply"));
    assert!(events.contains(&"commit"));
    assert_eq!(ledger.get_history().await.unwrap().len(), 1);
}

/// E2E test: a dirty working tree aborts before anything else runs
#[tokio::test]
async fn e2e_dirty_tree_aborts_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let events: Events = Arc::default();
    let (orchestrator, ledger) = recording_orchestrator(&dir, &events, false, false);

    let err = orchestrator.run_cycle(None).await.unwrap_err();
    assert!(err.is_safety_violation());

    let events = events.lock().unwrap().clone();
    assert_eq!(events, vec!["is_clean"]);
    assert!(ledger.get_history().await.unwrap().is_empty());
}

fn git_workspace(dir: &tempfile::TempDir, content: &str) -> (Arc<GitRepository>, PathBuf) {
    git2::Repository::init(dir.path()).unwrap();
    let file = dir.path().join("app.ts");
    std::fs::write(&file, content).unwrap();
    let git = GitRepository::new(dir.path()).ignoring(&dir.path().join(".rsi"));
    git.stage(&[file.clone()]).unwrap();
    git.commit("initial", &identity()).unwrap();
    (Arc::new(git), file)
}

/// Passes the broad check, fails any check narrowed to a file
struct FailsPerFile;

#[async_trait]
impl BuildCheck for FailsPerFile {
    async fn run(&self, selector: Option<&str>) -> Result<bool> {
        Ok(selector.is_none())
    }
}

struct BreakingProvider {
    file: PathBuf,
}

#[async_trait]
impl FixProvider for BreakingProvider {
    fn name(&self) -> &str {
        "breaking"
    }

    async fn scan(&self, _files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>> {
        let transform = Arc::new(|_: &str| Some("const a: number = 'oops';\n".to_string()));
        Ok(vec![FixSuggestion {
            id: "sug-break".to_string(),
            provider: "breaking".to_string(),
            description: "Retype a".to_string(),
            files: vec![self.file.clone()],
            change_type: ChangeType::Format,
            confidence: ConfidenceInput::Raw(0.95),
            action: Box::new(
                FileRewrite::new(&self.file, transform).verified_by(Some(Arc::new(FailsPerFile))),
            ),
        }])
    }
}

/// E2E test: a suggestion whose verification fails is reverted and logged
#[tokio::test]
async fn e2e_failed_verification_reverts_file() {
    let dir = tempfile::tempdir().unwrap();
    let original = "const a = 1;\n";
    let (git, file) = git_workspace(&dir, original);
    let vcs: Arc<dyn VersionControl> = git.clone();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(BreakingProvider { file: file.clone() }));
    let state = dir.path().join(".rsi");
    let ledger = ChangeLedger::new(state.join("change-ledger.json"));
    let tracker = EffectivenessTracker::new(state.join("feedback-log.json"), ledger.clone());
    let orchestrator = FixOrchestrator::new(
        registry,
        SafetyGate::new(Arc::clone(&vcs), Arc::new(FailsPerFile)),
        vcs,
        ledger.clone(),
        tracker,
        options(false),
    );

    let report = orchestrator.run_cycle(None).await.expect("cycle should complete");
    assert_eq!(report.reverted(), 1);
    assert!(report.is_failure());
    match &report.suggestions[0].outcome {
        SuggestionOutcome::RevertedOnFailure { reason, .. } => {
            assert_eq!(reason, "verification failed")
        }
        other => panic!("expected a revert, got {:?}", other),
    }

    assert_eq!(std::fs::read_to_string(&file).unwrap(), original);
    assert!(git.is_clean().unwrap());

    let history = ledger.get_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ChangeStatus::Failed);
    assert!(history[0].commit.is_none());
}

/// E2E test: built-in providers through the engine, then rollback
#[tokio::test]
async fn e2e_engine_commits_then_rolls_back() {
    let dir = tempfile::tempdir().unwrap();
    let messy = "const a = 1;   \nconst b = 2;\n\n\n";
    let (git, file) = git_workspace(&dir, messy);

    let config = RsiConfig::default()
        .with_build_command(vec![])
        .with_min_confidence(ConfidenceLevel::Low);
    let paths = config.state_paths(dir.path());
    let engine = RsiEngine::with_collaborators(config, paths, git.clone(), Arc::new(SkipCheck));

    let report = engine
        .orchestrator()
        .await
        .unwrap()
        .run_cycle(None)
        .await
        .expect("cycle should succeed");
    assert_eq!(report.committed(), 1, "{:?}", report);
    assert_eq!(
        std::fs::read_to_string(&file).unwrap(),
        "const a = 1;\nconst b = 2;\n"
    );
    assert!(git.is_clean().unwrap());

    let history = engine.ledger().get_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ChangeStatus::Applied);
    let change_id = history[0].id.clone();

    let feedback = engine.tracker().get_feedback_for_change(&change_id).await.unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].outcome, FeedbackOutcome::Positive);

    // The committed fix was documented as knowledge
    let kb = engine.store().load().await;
    assert_eq!(kb.errors.len(), 1);
    assert_eq!(kb.errors[0].error_type, "auto-fix");

    let metrics = engine.tracker().calculate_metrics().await.unwrap();
    assert_eq!(metrics.total_changes, 1);
    assert!((metrics.success_rate - 1.0).abs() < f64::EPSILON);

    let outcome = engine.rollback_manager().rollback_last_commit().await.unwrap();
    assert_eq!(outcome.change_id.as_deref(), Some(change_id.as_str()));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), messy);

    let record = engine.ledger().find(&change_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChangeStatus::RolledBack);
    let metrics = engine.tracker().calculate_metrics().await.unwrap();
    assert!((metrics.rollback_rate - 1.0).abs() < f64::EPSILON);
}
