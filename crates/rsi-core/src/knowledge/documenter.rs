//! Fix Documenter - records an observed error and its accepted fix
//!
//! Documenting either appends the fix to an identical existing entry or adds
//! a new entry, links the entry to every similar stored error in the same
//! write, and refreshes the keyword index.

use crate::error::Result;
use crate::knowledge::index::KeywordIndex;
use crate::knowledge::similarity::{rank_similar, MatchContext};
use crate::knowledge::store::KnowledgeStore;
use crate::knowledge::types::{ErrorContext, ErrorEntry, Fix, Severity};

/// An error as reported to the documenter
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub error_type: String,
    pub category: String,
    pub severity: Severity,
    pub pattern: String,
    pub context: ErrorContext,
}

impl ErrorReport {
    pub fn new(
        error_type: impl Into<String>,
        category: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            category: category.into(),
            severity: Severity::default(),
            pattern: pattern.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }
}

/// Result of documenting a fix
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentOutcome {
    pub error_id: String,
    pub fix_id: String,
    /// True when the fix was appended to an already known error
    pub existing_error: bool,
    /// Errors newly linked as similar
    pub linked: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FixDocumenter {
    store: KnowledgeStore,
    index: KeywordIndex,
}

impl FixDocumenter {
    pub fn new(store: KnowledgeStore, index: KeywordIndex) -> Self {
        Self { store, index }
    }

    pub async fn document(&self, report: ErrorReport, fix: Fix) -> Result<DocumentOutcome> {
        let outcome = self
            .store
            .update(|kb| {
                let existing = kb
                    .find_exact(&report.error_type, &report.category, &report.pattern)
                    .map(|e| e.id.clone());

                let (error_id, existing_error) = match existing {
                    Some(id) => (id, true),
                    None => {
                        let entry = ErrorEntry::new(
                            report.error_type.clone(),
                            report.category.clone(),
                            report.pattern.clone(),
                        )
                        .with_severity(report.severity)
                        .with_context(report.context.clone());
                        (kb.add_error(entry), false)
                    }
                };
                let fix_id = kb.add_fix(&error_id, fix)?;

                let context = MatchContext {
                    error_type: Some(report.error_type.clone()),
                    category: Some(report.category.clone()),
                    severity: Some(report.severity),
                    file: report.context.file.clone(),
                };
                let already: Vec<String> = kb
                    .error(&error_id)
                    .map(|e| e.similar_errors.clone())
                    .unwrap_or_default();
                // Every stored error above the match threshold
                let candidates: Vec<String> =
                    rank_similar(kb, &report.pattern, &context, kb.errors.len())
                        .into_iter()
                        .map(|m| m.error.id)
                        .filter(|id| *id != error_id && !already.contains(id))
                        .collect();
                for other in &candidates {
                    kb.link_similar(&error_id, other)?;
                }

                Ok(DocumentOutcome {
                    error_id,
                    fix_id,
                    existing_error,
                    linked: candidates,
                })
            })
            .await?;

        self.index.rebuild().await?;
        tracing::info!(
            "Documented fix {} for error {} ({} similar link(s))",
            outcome.fix_id,
            outcome.error_id,
            outcome.linked.len()
        );
        Ok(outcome)
    }
}
