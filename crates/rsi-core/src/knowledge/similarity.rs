//! Similarity Matcher - fuzzy lookup of past errors
//!
//! A candidate's score blends how close its signature is to the new message
//! with how much of its context (file, type, category, severity) agrees:
//!
//! ```text
//! score = 0.6 * message + 0.4 * context + 0.3 [type ==] + 0.2 [category ==]
//! context = 0.3 * file + 0.5 [type ==] + 0.3 [category ==] + 0.2 [severity ==]
//! ```
//!
//! Only candidates scoring above 0.5 are returned.

use crate::knowledge::store::KnowledgeStore;
use crate::knowledge::types::{ErrorEntry, Fix, KnowledgeBase, Severity};
use serde::Serialize;

/// Candidates must score strictly above this to be reported
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Default number of matches returned
pub const DEFAULT_LIMIT: usize = 5;

/// How many matches feed fix suggestions
const SUGGESTION_MATCHES: usize = 3;

const MESSAGE_WEIGHT: f64 = 0.6;
const CONTEXT_WEIGHT: f64 = 0.4;
const TYPE_BONUS: f64 = 0.3;
const CATEGORY_BONUS: f64 = 0.2;

/// What is known about the error being looked up
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    pub error_type: Option<String>,
    pub category: Option<String>,
    pub severity: Option<Severity>,
    pub file: Option<String>,
}

impl MatchContext {
    pub fn of_type(error_type: impl Into<String>) -> Self {
        Self {
            error_type: Some(error_type.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Context describing a stored entry, used when linking entries to each other
    pub fn of_entry(entry: &ErrorEntry) -> Self {
        Self {
            error_type: Some(entry.error_type.clone()),
            category: Some(entry.category.clone()),
            severity: Some(entry.severity),
            file: entry.context.file.clone(),
        }
    }
}

/// A stored error that resembles the query
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarError {
    pub error: ErrorEntry,
    pub score: f64,
    pub matched_fields: Vec<String>,
    pub reason: String,
}

/// A fix from a similar past error
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixRecommendation {
    pub error_id: String,
    pub fix: Fix,
    pub score: f64,
    pub reason: String,
}

/// Levenshtein distance over chars
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Case-insensitive normalized similarity in `[0, 1]`
pub fn string_similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn same(query: Option<&str>, stored: &str) -> bool {
    query.is_some_and(|q| q == stored)
}

/// Score one candidate, returning the score and the fields that agreed
fn score_candidate(message: &str, context: &MatchContext, candidate: &ErrorEntry) -> (f64, f64, Vec<String>) {
    let mut matched = Vec::new();

    let message_similarity = string_similarity(message, &candidate.pattern);
    if message_similarity > MATCH_THRESHOLD {
        matched.push("pattern".to_string());
    }

    let file_similarity = match (&context.file, &candidate.context.file) {
        (Some(q), Some(c)) => string_similarity(q, c),
        _ => 0.0,
    };
    if file_similarity > MATCH_THRESHOLD {
        matched.push("file".to_string());
    }

    let type_match = same(context.error_type.as_deref(), &candidate.error_type);
    let category_match = same(context.category.as_deref(), &candidate.category);
    let severity_match = context.severity == Some(candidate.severity);

    let mut context_similarity = file_similarity * 0.3;
    if type_match {
        context_similarity += 0.5;
        matched.push("errorType".to_string());
    }
    if category_match {
        context_similarity += 0.3;
        matched.push("category".to_string());
    }
    if severity_match {
        context_similarity += 0.2;
        matched.push("severity".to_string());
    }

    let mut score = message_similarity * MESSAGE_WEIGHT + context_similarity * CONTEXT_WEIGHT;
    if type_match {
        score += TYPE_BONUS;
    }
    if category_match {
        score += CATEGORY_BONUS;
    }

    (score, message_similarity, matched)
}

fn explain(message_similarity: f64, matched: &[String]) -> String {
    let context: Vec<&str> = matched
        .iter()
        .map(String::as_str)
        .filter(|f| *f != "pattern")
        .collect();
    if context.is_empty() {
        format!("message {:.0}% similar", message_similarity * 100.0)
    } else {
        format!(
            "message {:.0}% similar; same {}",
            message_similarity * 100.0,
            context.join(", ")
        )
    }
}

/// Rank stored errors against a message and context
pub fn rank_similar(
    kb: &KnowledgeBase,
    message: &str,
    context: &MatchContext,
    limit: usize,
) -> Vec<SimilarError> {
    let mut results: Vec<SimilarError> = kb
        .errors
        .iter()
        .filter_map(|candidate| {
            let (score, message_similarity, matched) = score_candidate(message, context, candidate);
            (score > MATCH_THRESHOLD).then(|| SimilarError {
                error: candidate.clone(),
                score,
                reason: explain(message_similarity, &matched),
                matched_fields: matched,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

/// Similarity lookups over a [`KnowledgeStore`]
#[derive(Debug, Clone)]
pub struct SimilarityMatcher {
    store: KnowledgeStore,
}

impl SimilarityMatcher {
    pub fn new(store: KnowledgeStore) -> Self {
        Self { store }
    }

    pub async fn find_similar_errors(
        &self,
        message: &str,
        context: &MatchContext,
        limit: usize,
    ) -> Vec<SimilarError> {
        let kb = self.store.load().await;
        rank_similar(&kb, message, context, limit)
    }

    /// The most recent fix of each of the top three matches.
    ///
    /// Recency, not fix quality, decides which fix of a match is offered.
    pub async fn get_fix_suggestions(&self, message: &str, context: &MatchContext) -> Vec<FixRecommendation> {
        self.find_similar_errors(message, context, SUGGESTION_MATCHES)
            .await
            .into_iter()
            .filter_map(|m| {
                let fix = m.error.latest_fix()?.clone();
                Some(FixRecommendation {
                    error_id: m.error.id.clone(),
                    fix,
                    score: m.score,
                    reason: m.reason,
                })
            })
            .collect()
    }
}
