//! Change Ledger and Rollback Manager
//!
//! The ledger is the audit trail of every automated change the pipeline
//! attempted. Records are appended and never removed; the only mutation is
//! the status transition `applied -> rolled_back`.

use crate::autofix::vcs::{CommitIdentity, VersionControl};
use crate::autofix::ChangeType;
use crate::error::{LedgerError, Result, ResultExt};
use crate::storage;
use crate::types::{new_id, now, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Applied,
    Failed,
    RolledBack,
}

impl ChangeStatus {
    pub fn can_transition_to(&self, next: ChangeStatus) -> bool {
        matches!((self, next), (ChangeStatus::Applied, ChangeStatus::RolledBack))
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeStatus::Applied => "applied",
            ChangeStatus::Failed => "failed",
            ChangeStatus::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// One attempted automated change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: String,
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub files: Vec<String>,
    pub description: String,
    pub confidence_score: f64,
    pub status: ChangeStatus,
    /// Commit created for an applied change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl ChangeRecord {
    pub fn new(
        change_type: ChangeType,
        files: Vec<String>,
        description: impl Into<String>,
        confidence_score: f64,
        status: ChangeStatus,
    ) -> Self {
        Self {
            id: new_id("chg"),
            timestamp: now(),
            change_type,
            files,
            description: description.into(),
            confidence_score,
            status,
            commit: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }
}

/// File-backed, append-only change log
#[derive(Debug, Clone)]
pub struct ChangeLedger {
    path: PathBuf,
}

impl ChangeLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, oldest first. A missing ledger is empty; a corrupt one is
    /// an error, since audit data must not be silently dropped.
    pub async fn get_history(&self) -> Result<Vec<ChangeRecord>> {
        let history: Option<Vec<ChangeRecord>> = storage::read_json(&self.path)
            .await
            .with_context(|| format!("Reading change ledger {}", self.path.display()))?;
        Ok(history.unwrap_or_default())
    }

    pub async fn log_change(&self, record: ChangeRecord) -> Result<String> {
        let mut history = self.get_history().await?;
        let id = record.id.clone();
        tracing::debug!("Ledger: {} {} ({})", record.status, id, record.description);
        history.push(record);
        storage::write_json(&self.path, &history).await?;
        Ok(id)
    }

    pub async fn update_status(&self, id: &str, status: ChangeStatus) -> Result<()> {
        let mut history = self.get_history().await?;
        let record = history
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::ChangeNotFound(id.to_string()))?;

        if !record.status.can_transition_to(status) {
            return Err(LedgerError::InvalidStatusTransition {
                from: record.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }
        record.status = status;
        storage::write_json(&self.path, &history).await
    }

    pub async fn find(&self, id: &str) -> Result<Option<ChangeRecord>> {
        Ok(self.get_history().await?.into_iter().find(|r| r.id == id))
    }
}

/// Undoes automated changes through version control and keeps the ledger in step
#[derive(Clone)]
pub struct RollbackManager {
    ledger: ChangeLedger,
    vcs: Arc<dyn VersionControl>,
    identity: CommitIdentity,
}

/// What a rollback did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    /// Ledger record marked `rolled_back`, if any
    pub change_id: Option<String>,
    /// Inverse commit, when one was created
    pub commit: Option<String>,
}

impl RollbackManager {
    pub fn new(ledger: ChangeLedger, vcs: Arc<dyn VersionControl>, identity: CommitIdentity) -> Self {
        Self {
            ledger,
            vcs,
            identity,
        }
    }

    /// Revert HEAD with an inverse commit and mark the applied record for
    /// that commit as rolled back. A commit the ledger never recorded (a
    /// human commit, say) leaves every record as it was.
    pub async fn rollback_last_commit(&self) -> Result<RollbackOutcome> {
        let reverted = self.vcs.revert_last_commit(&self.identity)?;

        let history = self.ledger.get_history().await?;
        let target = history
            .iter()
            .rev()
            .filter(|r| r.status == ChangeStatus::Applied)
            .find(|r| r.commit.as_deref() == Some(reverted.reverted.as_str()))
            .map(|r| r.id.clone());

        if let Some(id) = &target {
            self.ledger.update_status(id, ChangeStatus::RolledBack).await?;
        }
        tracing::info!(
            "Rolled back commit {} (ledger record: {})",
            reverted.reverted,
            target.as_deref().unwrap_or("none")
        );
        Ok(RollbackOutcome {
            change_id: target,
            commit: Some(reverted.commit),
        })
    }

    /// Hard-reset the working tree, dropping every uncommitted change
    pub fn discard_changes(&self) -> Result<()> {
        self.vcs.hard_reset()?;
        tracing::info!("Discarded uncommitted changes");
        Ok(())
    }

    /// Discard uncommitted state and mark `id` rolled back.
    ///
    /// This does not revert the commit recorded for `id`; it is accurate only
    /// for the change still in flight. Use [`rollback_last_commit`](Self::rollback_last_commit)
    /// for committed changes.
    pub async fn rollback_change(&self, id: &str) -> Result<RollbackOutcome> {
        let record = self
            .ledger
            .find(id)
            .await?
            .ok_or_else(|| LedgerError::ChangeNotFound(id.to_string()))?;
        if !record.status.can_transition_to(ChangeStatus::RolledBack) {
            return Err(LedgerError::InvalidStatusTransition {
                from: record.status.to_string(),
                to: ChangeStatus::RolledBack.to_string(),
            }
            .into());
        }

        self.discard_changes()?;
        self.ledger.update_status(id, ChangeStatus::RolledBack).await?;
        Ok(RollbackOutcome {
            change_id: Some(record.id),
            commit: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofix::vcs::Reverted;
    use crate::error::RsiError;
    use std::sync::Mutex;

    fn record(status: ChangeStatus) -> ChangeRecord {
        ChangeRecord::new(
            ChangeType::Format,
            vec!["src/a.ts".to_string()],
            "Normalize whitespace in src/a.ts",
            0.99,
            status,
        )
    }

    #[derive(Default)]
    struct FakeVcs {
        head: Mutex<String>,
        resets: Mutex<usize>,
    }

    impl VersionControl for FakeVcs {
        fn is_clean(&self) -> Result<bool> {
            Ok(true)
        }
        fn stage(&self, _paths: &[PathBuf]) -> Result<()> {
            Ok(())
        }
        fn commit(&self, _message: &str, _identity: &CommitIdentity) -> Result<String> {
            Ok("unused".to_string())
        }
        fn revert_last_commit(&self, _identity: &CommitIdentity) -> Result<Reverted> {
            Ok(Reverted {
                reverted: self.head.lock().unwrap().clone(),
                commit: "inverse".to_string(),
            })
        }
        fn hard_reset(&self) -> Result<()> {
            *self.resets.lock().unwrap() += 1;
            Ok(())
        }
        fn checkout_path(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    fn identity() -> CommitIdentity {
        CommitIdentity {
            name: "t".to_string(),
            email: "t@t".to_string(),
        }
    }

    #[tokio::test]
    async fn log_and_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        assert!(ledger.get_history().await.unwrap().is_empty());

        let a = ledger.log_change(record(ChangeStatus::Applied)).await.unwrap();
        let b = ledger.log_change(record(ChangeStatus::Failed)).await.unwrap();

        let history = ledger.get_history().await.unwrap();
        let ids: Vec<&str> = history.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), b.as_str()]);
    }

    #[tokio::test]
    async fn records_serialize_with_wire_names() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        ledger
            .log_change(record(ChangeStatus::RolledBack).with_commit("abc"))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(ledger.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "format");
        assert_eq!(raw[0]["status"], "rolled_back");
        assert_eq!(raw[0]["confidenceScore"], 0.99);
        assert_eq!(raw[0]["commit"], "abc");
    }

    #[tokio::test]
    async fn only_applied_can_roll_back() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        let applied = ledger.log_change(record(ChangeStatus::Applied)).await.unwrap();
        let failed = ledger.log_change(record(ChangeStatus::Failed)).await.unwrap();

        ledger.update_status(&applied, ChangeStatus::RolledBack).await.unwrap();
        for (id, status) in [
            (&applied, ChangeStatus::Applied),
            (&applied, ChangeStatus::RolledBack),
            (&failed, ChangeStatus::RolledBack),
        ] {
            let err = ledger.update_status(id, status).await.unwrap_err();
            assert!(matches!(
                err,
                RsiError::Ledger(LedgerError::InvalidStatusTransition { .. })
            ));
        }
        assert!(matches!(
            ledger.update_status("chg-nope", ChangeStatus::RolledBack).await,
            Err(RsiError::Ledger(LedgerError::ChangeNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn corrupt_ledger_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        tokio::fs::write(ledger.path(), "[{").await.unwrap();
        let err = ledger.get_history().await.unwrap_err();
        assert!(err.to_string().contains("Reading change ledger"));
    }

    #[tokio::test]
    async fn rollback_last_commit_marks_the_reverted_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        let older = ledger
            .log_change(record(ChangeStatus::Applied).with_commit("c1"))
            .await
            .unwrap();
        let newer = ledger
            .log_change(record(ChangeStatus::Applied).with_commit("c2"))
            .await
            .unwrap();

        let vcs = Arc::new(FakeVcs::default());
        *vcs.head.lock().unwrap() = "c1".to_string();
        let manager = RollbackManager::new(ledger.clone(), vcs, identity());

        let outcome = manager.rollback_last_commit().await.unwrap();
        assert_eq!(outcome.change_id.as_deref(), Some(older.as_str()));
        assert_eq!(outcome.commit.as_deref(), Some("inverse"));

        let newer_status = ledger.find(&newer).await.unwrap().unwrap().status;
        assert_eq!(newer_status, ChangeStatus::Applied);
    }

    #[tokio::test]
    async fn rollback_of_unrecorded_commit_leaves_ledger_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        let applied = ledger
            .log_change(record(ChangeStatus::Applied).with_commit("c1"))
            .await
            .unwrap();

        let vcs = Arc::new(FakeVcs::default());
        *vcs.head.lock().unwrap() = "human".to_string();
        let manager = RollbackManager::new(ledger.clone(), vcs, identity());

        let outcome = manager.rollback_last_commit().await.unwrap();
        assert_eq!(outcome.change_id, None);
        assert_eq!(outcome.commit.as_deref(), Some("inverse"));
        assert_eq!(
            ledger.find(&applied).await.unwrap().unwrap().status,
            ChangeStatus::Applied
        );
    }

    #[tokio::test]
    async fn rollback_change_discards_and_marks() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChangeLedger::new(dir.path().join("ledger.json"));
        let id = ledger.log_change(record(ChangeStatus::Applied)).await.unwrap();
        let failed = ledger.log_change(record(ChangeStatus::Failed)).await.unwrap();

        let vcs = Arc::new(FakeVcs::default());
        let manager = RollbackManager::new(ledger.clone(), vcs.clone(), identity());

        manager.rollback_change(&id).await.unwrap();
        assert_eq!(*vcs.resets.lock().unwrap(), 1);
        assert_eq!(
            ledger.find(&id).await.unwrap().unwrap().status,
            ChangeStatus::RolledBack
        );

        // Terminal records are rejected before anything is reset.
        assert!(manager.rollback_change(&failed).await.is_err());
        assert_eq!(*vcs.resets.lock().unwrap(), 1);
    }
}
