//! Keyword Index - derived inverted index over the knowledge base
//!
//! The index is wholly derived state. It can be deleted at any time; a search
//! against a missing index rebuilds it first.

use crate::error::Result;
use crate::knowledge::store::KnowledgeStore;
use crate::knowledge::types::{ErrorEntry, KnowledgeBase, Pattern};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Words that carry no signal for matching
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "not", "but",
    "have", "has", "had", "you", "your", "into", "when", "then", "than", "there", "their",
    "they", "them", "its", "all", "any", "can", "could", "should", "would", "will", "been",
    "being", "our", "out", "use", "used", "using", "via", "also", "each", "other", "some",
    "such", "only", "over", "more", "most", "very", "what", "which", "while", "who", "why",
    "how", "does", "did", "doing", "now", "too",
];

/// What an index entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Error,
    Pattern,
}

/// One searchable document in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub keywords: BTreeSet<String>,
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Query-time relevance; never persisted
    #[serde(skip)]
    pub score: u32,
}

/// Extract keywords: lower-case, whitespace split, no stop-words, longer than 2 chars
pub fn extract_keywords(text: &str) -> BTreeSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

impl IndexEntry {
    fn for_error(error: &ErrorEntry) -> Self {
        let mut keywords = BTreeSet::new();
        keywords.extend(extract_keywords(&error.pattern));
        keywords.extend(extract_keywords(&error.error_type));
        keywords.extend(extract_keywords(&error.category));
        if let Some(file) = &error.context.file {
            keywords.extend(extract_keywords(file));
        }
        for fix in &error.fixes {
            keywords.extend(extract_keywords(&fix.solution));
            keywords.extend(extract_keywords(&fix.prevention));
        }

        Self {
            id: error.id.clone(),
            entry_type: EntryType::Error,
            keywords,
            categories: vec![error.error_type.clone(), error.category.clone()],
            file: error.context.file.clone(),
            score: 0,
        }
    }

    fn for_pattern(pattern: &Pattern) -> Self {
        let mut keywords = BTreeSet::new();
        for field in [
            &pattern.name,
            &pattern.description,
            &pattern.detection,
            &pattern.fix,
            &pattern.prevention,
        ] {
            keywords.extend(extract_keywords(field));
        }

        Self {
            id: pattern.id.clone(),
            entry_type: EntryType::Pattern,
            keywords,
            categories: vec!["pattern".to_string()],
            file: None,
            score: 0,
        }
    }

    /// +1 for every (query, entry) keyword pair where one contains the other,
    /// +2 more when they are identical
    fn relevance(&self, query: &BTreeSet<String>) -> u32 {
        let mut score = 0;
        for q in query {
            for k in &self.keywords {
                if k.contains(q.as_str()) || q.contains(k.as_str()) {
                    score += 1;
                }
                if k == q {
                    score += 2;
                }
            }
        }
        score
    }
}

/// Compute index entries for a knowledge base, errors first, document order
pub fn entries_for(kb: &KnowledgeBase) -> Vec<IndexEntry> {
    kb.errors
        .iter()
        .map(IndexEntry::for_error)
        .chain(kb.patterns.iter().map(IndexEntry::for_pattern))
        .collect()
}

/// Persisted keyword index over a [`KnowledgeStore`]
#[derive(Debug, Clone)]
pub struct KeywordIndex {
    path: PathBuf,
    store: KnowledgeStore,
}

impl KeywordIndex {
    pub fn new(path: impl Into<PathBuf>, store: KnowledgeStore) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recompute the index from the knowledge store and persist it
    pub async fn build(&self) -> Result<Vec<IndexEntry>> {
        let kb = self.store.load().await;
        let entries = entries_for(&kb);
        storage::write_json(&self.path, &entries).await?;
        tracing::debug!(
            "Built keyword index with {} entries at {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    /// Alias of [`build`](Self::build), called after knowledge base mutations
    pub async fn rebuild(&self) -> Result<Vec<IndexEntry>> {
        self.build().await
    }

    /// Search the index; results sorted by descending score, ties in index order
    pub async fn search(&self, query: &str) -> Result<Vec<IndexEntry>> {
        let entries = match storage::read_json::<Vec<IndexEntry>>(&self.path).await {
            Ok(Some(entries)) => entries,
            Ok(None) => self.build().await?,
            Err(e) => {
                tracing::warn!("Keyword index unreadable ({}), rebuilding", e);
                self.build().await?
            }
        };

        let query = extract_keywords(query);
        let mut hits: Vec<IndexEntry> = entries
            .into_iter()
            .filter_map(|mut entry| {
                entry.score = entry.relevance(&query);
                (entry.score > 0).then_some(entry)
            })
            .collect();

        // Vec::sort_by is stable, so equal scores keep document order.
        hits.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(hits)
    }
}
