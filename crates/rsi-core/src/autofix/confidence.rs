//! Confidence Scorer - how sure the engine is about a proposed mutation
//!
//! Scores are in `[0, 1]` and banded into levels:
//!
//! | level  | score    |
//! |--------|----------|
//! | HIGH   | >= 0.90  |
//! | MEDIUM | >= 0.70  |
//! | LOW    | < 0.70   |
//!
//! A heuristic score starts from a base per [`ChangeType`] and is adjusted
//! by complexity, test coverage, and named risk factors. Providers that
//! compute their own confidence go through [`ConfidenceScorer::score_from_value`]
//! and land in the same bands.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const HIGH_THRESHOLD: f64 = 0.90;
pub const MEDIUM_THRESHOLD: f64 = 0.70;

/// History needed before a change type's track record affects its score
const MIN_HISTORY_FOR_PENALTY: usize = 5;
const POOR_HISTORY_SUCCESS_RATE: f64 = 0.5;
const POOR_HISTORY_PENALTY: f64 = 0.10;

/// Kind of mutation a suggestion makes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    Format,
    Lint,
    Refactor,
    LogicFix,
    Optimization,
    Unknown,
}

impl ChangeType {
    /// Starting score before adjustments
    pub fn base_score(&self) -> f64 {
        match self {
            ChangeType::Format | ChangeType::Lint => 0.99,
            ChangeType::Refactor => 0.85,
            ChangeType::LogicFix => 0.75,
            ChangeType::Optimization => 0.70,
            ChangeType::Unknown => 0.60,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Format => "format",
            ChangeType::Lint => "lint",
            ChangeType::Refactor => "refactor",
            ChangeType::LogicFix => "logic-fix",
            ChangeType::Optimization => "optimization",
            ChangeType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "format" => Ok(ChangeType::Format),
            "lint" => Ok(ChangeType::Lint),
            "refactor" => Ok(ChangeType::Refactor),
            "logic-fix" => Ok(ChangeType::LogicFix),
            "optimization" => Ok(ChangeType::Optimization),
            "unknown" => Ok(ChangeType::Unknown),
            other => Err(format!("unknown change type '{}'", other)),
        }
    }
}

/// Confidence band. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    #[serde(alias = "low")]
    Low,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "high")]
    High,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            ConfidenceLevel::High
        } else if score >= MEDIUM_THRESHOLD {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(ConfidenceLevel::Low),
            "medium" => Ok(ConfidenceLevel::Medium),
            "high" => Ok(ConfidenceLevel::High),
            other => Err(format!("unknown confidence level '{}'", other)),
        }
    }
}

/// A scored proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub score: f64,
    pub level: ConfidenceLevel,
    pub reasons: Vec<String>,
}

impl ConfidenceScore {
    fn new(score: f64, reasons: Vec<String>) -> Self {
        // Rounded so accumulated adjustments land on the band edges exactly.
        let score = (score.clamp(0.0, 1.0) * 1e6).round() / 1e6;
        Self {
            score,
            level: ConfidenceLevel::from_score(score),
            reasons,
        }
    }
}

/// Track record of one change type, as aggregated from the change ledger
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChangeTypeHistory {
    pub total: usize,
    pub succeeded: usize,
}

impl ChangeTypeHistory {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.succeeded as f64 / self.total as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    history: HashMap<ChangeType, ChangeTypeHistory>,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach per change type outcomes; types with a poor record score lower
    pub fn with_history(mut self, history: HashMap<ChangeType, ChangeTypeHistory>) -> Self {
        self.history = history;
        self
    }

    /// Heuristic score from change type, complexity and coverage in `[0, 1]`,
    /// and named risk factors
    pub fn score(
        &self,
        change_type: ChangeType,
        complexity: f64,
        coverage: f64,
        risk_factors: &[String],
    ) -> ConfidenceScore {
        let mut score = change_type.base_score();
        let mut reasons = vec![format!("base {:.2} for {}", score, change_type)];

        if complexity > 0.7 {
            score -= 0.15;
            reasons.push("high complexity (-0.15)".to_string());
        } else if complexity > 0.4 {
            score -= 0.05;
            reasons.push("moderate complexity (-0.05)".to_string());
        }

        if coverage > 0.8 {
            score += 0.05;
            reasons.push("well covered by tests (+0.05)".to_string());
        } else if coverage < 0.5 {
            score -= 0.10;
            reasons.push("low test coverage (-0.10)".to_string());
        }

        for risk in risk_factors {
            score -= 0.10;
            reasons.push(format!("risk: {} (-0.10)", risk));
        }

        if let Some(history) = self.history.get(&change_type) {
            if history.total >= MIN_HISTORY_FOR_PENALTY
                && history.success_rate() < POOR_HISTORY_SUCCESS_RATE
            {
                score -= POOR_HISTORY_PENALTY;
                reasons.push(format!(
                    "{} changes succeed {:.0}% of the time (-0.10)",
                    change_type,
                    history.success_rate() * 100.0
                ));
            }
        }

        ConfidenceScore::new(score, reasons)
    }

    /// Accept a provider-computed confidence as is
    pub fn score_from_value(&self, value: f64) -> ConfidenceScore {
        ConfidenceScore::new(value, vec![format!("provider confidence {:.2}", value)])
    }
}
