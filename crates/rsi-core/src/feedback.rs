//! Effectiveness Tracker - outcome feedback and aggregate metrics
//!
//! Feedback records are appended to their own log. Aggregate metrics are
//! computed from the change ledger alone.

use crate::autofix::{ChangeType, ChangeTypeHistory};
use crate::error::{Result, ResultExt};
use crate::ledger::{ChangeLedger, ChangeStatus};
use crate::storage;
use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    Test,
    Build,
    User,
    PerformanceMetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackOutcome {
    Positive,
    Negative,
    Neutral,
}

/// Feedback about one change; `id` is the change record id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub timestamp: Timestamp,
    pub source: FeedbackSource,
    pub outcome: FeedbackOutcome,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<BTreeMap<String, f64>>,
}

impl FeedbackRecord {
    pub fn new(
        change_id: impl Into<String>,
        source: FeedbackSource,
        outcome: FeedbackOutcome,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: change_id.into(),
            timestamp: now(),
            source,
            outcome,
            details: details.into(),
            metrics: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value);
        self
    }
}

/// Aggregate effectiveness of the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_changes: usize,
    pub success_rate: f64,
    pub rollback_rate: f64,
    pub active_period_days: i64,
}

#[derive(Debug, Clone)]
pub struct EffectivenessTracker {
    path: PathBuf,
    ledger: ChangeLedger,
}

impl EffectivenessTracker {
    pub fn new(path: impl Into<PathBuf>, ledger: ChangeLedger) -> Self {
        Self {
            path: path.into(),
            ledger,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_log(&self) -> Result<Vec<FeedbackRecord>> {
        let log: Option<Vec<FeedbackRecord>> = storage::read_json(&self.path)
            .await
            .with_context(|| format!("Reading feedback log {}", self.path.display()))?;
        Ok(log.unwrap_or_default())
    }

    pub async fn log_feedback(&self, record: FeedbackRecord) -> Result<()> {
        let mut log = self.read_log().await?;
        tracing::debug!("Feedback for {}: {:?} from {:?}", record.id, record.outcome, record.source);
        log.push(record);
        storage::write_json(&self.path, &log).await
    }

    pub async fn get_feedback_for_change(&self, change_id: &str) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .read_log()
            .await?
            .into_iter()
            .filter(|r| r.id == change_id)
            .collect())
    }

    /// Success and rollback rates over the whole ledger. Failed and
    /// rolled-back changes both count against success. The active period is
    /// the whole days between the first and last change, at least 1.
    pub async fn calculate_metrics(&self) -> Result<Metrics> {
        let history = self.ledger.get_history().await?;
        let total = history.len();
        let applied = history
            .iter()
            .filter(|r| r.status == ChangeStatus::Applied)
            .count();
        let rolled_back = history
            .iter()
            .filter(|r| r.status == ChangeStatus::RolledBack)
            .count();

        let rate = |n: usize| if total == 0 { 0.0 } else { n as f64 / total as f64 };

        let first = history.iter().map(|r| r.timestamp).min();
        let last = history.iter().map(|r| r.timestamp).max();
        let active_period_days = match (first, last) {
            (Some(first), Some(last)) => (last - first).num_days().max(1),
            _ => 1,
        };

        Ok(Metrics {
            total_changes: total,
            success_rate: rate(applied),
            rollback_rate: rate(rolled_back),
            active_period_days,
        })
    }

    /// Per change type totals, for history-aware confidence scoring
    pub async fn change_type_stats(&self) -> Result<HashMap<ChangeType, ChangeTypeHistory>> {
        let mut stats: HashMap<ChangeType, ChangeTypeHistory> = HashMap::new();
        for record in self.ledger.get_history().await? {
            let entry = stats.entry(record.change_type).or_default();
            entry.total += 1;
            if record.status == ChangeStatus::Applied {
                entry.succeeded += 1;
            }
        }
        Ok(stats)
    }
}
