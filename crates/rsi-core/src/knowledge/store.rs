//! Knowledge Store - file-backed knowledge base
//!
//! The knowledge base is one JSON document. Every mutation helper loads the
//! whole document, changes it, and writes it back; there is no partial-record
//! locking, so one process must own the store for the duration of a run
//! (see [`crate::storage::StateLock`]).

use crate::error::{KnowledgeError, Result};
use crate::knowledge::types::*;
use crate::storage;
use crate::types::now;
use std::path::{Path, PathBuf};

/// Handle to the persisted knowledge base
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
}

impl KnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the knowledge base. A missing or unreadable file is an empty,
    /// valid knowledge base, so first runs bootstrap silently.
    pub async fn load(&self) -> KnowledgeBase {
        storage::read_json_or_default(&self.path).await
    }

    /// Persist the knowledge base, stamping `lastUpdated`
    pub async fn save(&self, kb: &mut KnowledgeBase) -> Result<()> {
        kb.last_updated = now();
        storage::write_json(&self.path, kb).await
    }

    /// Read-modify-write the whole document in one step. Nothing is written
    /// when `f` leaves the knowledge base unchanged.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut KnowledgeBase) -> Result<T>,
    {
        let mut kb = self.load().await;
        let before = kb.clone();
        let out = f(&mut kb)?;
        if kb != before {
            self.save(&mut kb).await?;
        }
        Ok(out)
    }

    pub async fn add_error(&self, entry: ErrorEntry) -> Result<String> {
        self.update(|kb| Ok(kb.add_error(entry))).await
    }

    pub async fn add_fix(&self, error_id: &str, fix: Fix) -> Result<String> {
        self.update(|kb| kb.add_fix(error_id, fix)).await
    }

    /// Returns `false` when a pattern with the same id already exists
    pub async fn add_pattern(&self, pattern: Pattern) -> Result<bool> {
        self.update(|kb| Ok(kb.add_pattern(pattern))).await
    }

    pub async fn add_rule(&self, rule: Rule) -> Result<bool> {
        self.update(|kb| Ok(kb.add_rule(rule))).await
    }

    pub async fn link_similar(&self, a: &str, b: &str) -> Result<()> {
        self.update(|kb| kb.link_similar(a, b)).await
    }

    pub async fn link_prevention_rule(&self, error_id: &str, rule_id: &str) -> Result<()> {
        self.update(|kb| kb.link_prevention_rule(error_id, rule_id)).await
    }

    pub async fn deprecate_rule(&self, rule_id: &str) -> Result<()> {
        self.update(|kb| kb.deprecate_rule(rule_id)).await
    }
}

impl KnowledgeBase {
    pub fn error(&self, id: &str) -> Option<&ErrorEntry> {
        self.errors.iter().find(|e| e.id == id)
    }

    fn error_mut(&mut self, id: &str) -> Result<&mut ErrorEntry> {
        self.errors
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| KnowledgeError::ErrorNotFound(id.to_string()).into())
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Append an error entry and return its id
    pub fn add_error(&mut self, entry: ErrorEntry) -> String {
        let id = entry.id.clone();
        self.errors.push(entry);
        id
    }

    /// Append a fix to an existing error and return the fix id
    pub fn add_fix(&mut self, error_id: &str, fix: Fix) -> Result<String> {
        let entry = self.error_mut(error_id)?;
        let fix_id = fix.id.clone();
        entry.fixes.push(fix);
        Ok(fix_id)
    }

    pub fn add_pattern(&mut self, pattern: Pattern) -> bool {
        if self.pattern(&pattern.id).is_some() {
            return false;
        }
        self.patterns.push(pattern);
        true
    }

    pub fn add_rule(&mut self, rule: Rule) -> bool {
        if self.rule(&rule.id).is_some() {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Link two errors in both directions. Self-links and repeats are no-ops.
    pub fn link_similar(&mut self, a: &str, b: &str) -> Result<()> {
        // Validate both ends before touching either so a bad id leaves no half link.
        self.error_mut(a)?;
        self.error_mut(b)?;
        if a == b {
            return Ok(());
        }

        let first = self.error_mut(a)?;
        if !first.similar_errors.iter().any(|id| id == b) {
            first.similar_errors.push(b.to_string());
        }
        let second = self.error_mut(b)?;
        if !second.similar_errors.iter().any(|id| id == a) {
            second.similar_errors.push(a.to_string());
        }
        Ok(())
    }

    pub fn link_prevention_rule(&mut self, error_id: &str, rule_id: &str) -> Result<()> {
        let entry = self.error_mut(error_id)?;
        if !entry.prevention_rules.iter().any(|id| id == rule_id) {
            entry.prevention_rules.push(rule_id.to_string());
        }
        Ok(())
    }

    pub fn deprecate_rule(&mut self, rule_id: &str) -> Result<()> {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| KnowledgeError::RuleNotFound(rule_id.to_string()))?;
        rule.deprecated = true;
        Ok(())
    }

    /// Find an entry with the same type, category and signature
    pub fn find_exact(&self, error_type: &str, category: &str, pattern: &str) -> Option<&ErrorEntry> {
        self.errors.iter().find(|e| {
            e.error_type == error_type && e.category == category && e.pattern == pattern
        })
    }

    pub fn fix_count(&self) -> usize {
        self.errors.iter().map(|e| e.fixes.len()).sum()
    }
}
