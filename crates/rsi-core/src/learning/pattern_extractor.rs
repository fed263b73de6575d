//! Pattern Extractor - finds what repeated fixes have in common
//!
//! A token qualifies when it is at least four characters long and appears
//! in at least half of the fixes, counted once per fix. The solutions corpus
//! is examined before the preventions corpus; the first qualifying token in
//! order of first appearance names the pattern.

use crate::knowledge::Fix;
use std::collections::HashSet;

/// Fewer fixes than this never form a pattern
pub const MIN_FIX_COUNT_FOR_RULE: usize = 3;

const MIN_TOKEN_LEN: usize = 4;

/// What a group of fixes shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPattern {
    /// First qualifying common token
    pub name: String,
    pub common_solution_tokens: Vec<String>,
    pub common_prevention_tokens: Vec<String>,
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .collect()
}

/// Tokens present in at least half of `texts`, in order of first appearance
fn common_tokens<'a>(texts: impl Iterator<Item = &'a str>) -> Vec<String> {
    let tokenized: Vec<Vec<String>> = texts.map(tokens).collect();
    let per_text: Vec<HashSet<&String>> = tokenized.iter().map(|t| t.iter().collect()).collect();
    let inputs = per_text.len();

    let mut order: Vec<&String> = Vec::new();
    let mut seen = HashSet::new();
    for token in tokenized.iter().flatten() {
        if seen.insert(token) {
            order.push(token);
        }
    }

    order
        .into_iter()
        .filter(|token| {
            let hits = per_text.iter().filter(|set| set.contains(token)).count();
            hits * 2 >= inputs
        })
        .cloned()
        .collect()
}

/// Generalize a group of fixes, or `None` when there is not enough evidence
pub fn extract_pattern(fixes: &[&Fix]) -> Option<ExtractedPattern> {
    if fixes.len() < MIN_FIX_COUNT_FOR_RULE {
        return None;
    }

    let solutions = common_tokens(fixes.iter().map(|f| f.solution.as_str()));
    let preventions = common_tokens(fixes.iter().map(|f| f.prevention.as_str()));
    let name = solutions.first().or_else(|| preventions.first())?.clone();

    Some(ExtractedPattern {
        name,
        common_solution_tokens: solutions,
        common_prevention_tokens: preventions,
    })
}
