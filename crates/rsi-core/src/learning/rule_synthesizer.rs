//! Rule Synthesizer - turns repeated fixes into patterns and rules
//!
//! Fixes documented inside the window are grouped by their error's cluster
//! key (`<errorType>-<category>`). Each group with enough evidence becomes
//! one [`Pattern`] (id = cluster key) and one [`Rule`] derived from it.
//! Groups whose pattern id already exists are skipped, so re-running over
//! the same window adds nothing.
//!
//! Rule shape is chosen heuristically from the bad-code sample:
//!
//! - `obj.member(` → `CallExpression[callee.object.name='obj'][callee.property.name='member']`
//! - `name(` → `CallExpression[callee.name='name']`
//! - otherwise a regex matching the escaped detection text

use crate::error::Result;
use crate::knowledge::{
    DetectionKind, Enforcement, ErrorEntry, Fix, KnowledgeBase, KnowledgeStore, Pattern, Rule,
    RuleImplementation, RuleSource,
};
use crate::learning::pattern_extractor::{extract_pattern, ExtractedPattern};
use crate::types::now;
use chrono::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    static ref MEMBER_CALL: Regex =
        Regex::new(r"([A-Za-z_$][\w$]*)\s*\.\s*([A-Za-z_$][\w$]*)\s*\(").expect("member call regex is valid");
    static ref PLAIN_CALL: Regex =
        Regex::new(r"([A-Za-z_$][\w$]*)\s*\(").expect("call regex is valid");
}

/// Words followed by `(` that are not calls
const NON_CALLEES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "typeof", "new", "match",
];

/// What a synthesis run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisReport {
    pub patterns: Vec<Pattern>,
    pub rules: Vec<Rule>,
}

impl SynthesisReport {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.rules.is_empty()
    }
}

/// Detection expression for a bad-code sample
pub fn synthesize_detection(bad_code: &str, detection: &str) -> (DetectionKind, String) {
    if let Some(caps) = MEMBER_CALL.captures(bad_code) {
        return (
            DetectionKind::AstSelector,
            format!(
                "CallExpression[callee.object.name='{}'][callee.property.name='{}']",
                &caps[1], &caps[2]
            ),
        );
    }
    let callee = PLAIN_CALL
        .captures_iter(bad_code)
        .map(|caps| caps[1].to_string())
        .find(|name| !NON_CALLEES.contains(&name.as_str()));
    if let Some(name) = callee {
        return (
            DetectionKind::AstSelector,
            format!("CallExpression[callee.name='{}']", name),
        );
    }
    (DetectionKind::Regex, regex::escape(detection))
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}

fn build_pattern(key: &str, errors: &[&ErrorEntry], extracted: &ExtractedPattern, latest: &Fix) -> Pattern {
    let sample = errors[errors.len() - 1];
    let prevention_terms = if extracted.common_prevention_tokens.is_empty() {
        latest.prevention.clone()
    } else {
        format!(
            "{} (recurring: {})",
            latest.prevention,
            extracted.common_prevention_tokens.join(", ")
        )
    };

    Pattern {
        id: key.to_string(),
        name: extracted.name.clone(),
        description: format!(
            "Recurring {} error in {} resolved {} way(s)",
            sample.error_type,
            sample.category,
            errors.iter().map(|e| e.fixes.len()).sum::<usize>()
        ),
        detection: sample.pattern.clone(),
        fix: latest.solution.clone(),
        prevention: prevention_terms.trim().to_string(),
        bad_pattern: Some(sample.pattern.clone()),
        good_pattern: latest.code_changes.clone(),
        created_at: now(),
        deprecated: false,
    }
}

/// Slug for a pattern's rule that no stored rule already uses. Keys that
/// differ only in case or punctuation get a numeric suffix.
fn unique_rule_slug(kb: &KnowledgeBase, pattern_id: &str) -> String {
    let base = slug(pattern_id);
    let taken = |candidate: &str| {
        let id = format!("rsi-{}", candidate);
        let rule_id = format!("rsi/{}", candidate);
        kb.rules
            .iter()
            .any(|r| r.id == id || r.rule_id.as_deref() == Some(rule_id.as_str()))
    };
    let mut candidate = base.clone();
    let mut n = 2;
    while taken(&candidate) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    candidate
}

fn build_rule(pattern: &Pattern, slug: &str, severity: crate::knowledge::Severity) -> Rule {
    let bad = pattern.bad_pattern.as_deref().unwrap_or(&pattern.detection);
    let (kind, expression) = synthesize_detection(bad, &pattern.detection);

    Rule {
        id: format!("rsi-{}", slug),
        name: format!("rsi/{}", slug),
        source: RuleSource::RsiSynthesized,
        enforcement: Enforcement::Automated,
        rule_id: Some(format!("rsi/{}", slug)),
        description: format!("{}: {}", pattern.name, pattern.prevention),
        severity,
        implementation: RuleImplementation {
            kind,
            expression,
            message: if pattern.prevention.is_empty() {
                pattern.fix.clone()
            } else {
                pattern.prevention.clone()
            },
        },
        pattern_id: Some(pattern.id.clone()),
        created_at: now(),
        deprecated: false,
    }
}

#[derive(Debug, Clone)]
pub struct RuleSynthesizer {
    store: KnowledgeStore,
}

impl RuleSynthesizer {
    pub fn new(store: KnowledgeStore) -> Self {
        Self { store }
    }

    /// Synthesize patterns and rules from fixes documented in the last `days` days
    pub async fn generate_rules_from_recent_fixes(&self, days: i64) -> Result<SynthesisReport> {
        let cutoff = now() - Duration::days(days);

        let report = self
            .store
            .update(|kb| {
                // key -> (errors in group, fixes in window)
                let mut groups: BTreeMap<String, (Vec<usize>, Vec<Fix>)> = BTreeMap::new();
                for (idx, error) in kb.errors.iter().enumerate() {
                    let recent: Vec<Fix> = error
                        .fixes
                        .iter()
                        .filter(|f| f.documented_at >= cutoff)
                        .cloned()
                        .collect();
                    if recent.is_empty() {
                        continue;
                    }
                    let group = groups.entry(error.cluster_key()).or_default();
                    group.0.push(idx);
                    group.1.extend(recent);
                }

                let mut report = SynthesisReport::default();
                for (key, (error_idx, mut fixes)) in groups {
                    if kb.pattern(&key).is_some() {
                        tracing::debug!("Pattern {} already exists, skipping", key);
                        continue;
                    }
                    let refs: Vec<&Fix> = fixes.iter().collect();
                    let Some(extracted) = extract_pattern(&refs) else {
                        tracing::debug!("Group {} has no common pattern ({} fixes)", key, fixes.len());
                        continue;
                    };
                    fixes.sort_by_key(|f| f.documented_at);
                    let Some(latest) = fixes.last() else {
                        continue;
                    };

                    let errors: Vec<&ErrorEntry> = error_idx.iter().map(|&i| &kb.errors[i]).collect();
                    let pattern = build_pattern(&key, &errors, &extracted, latest);
                    let severity = errors
                        .iter()
                        .map(|e| e.severity)
                        .max_by_key(|s| *s as u8)
                        .unwrap_or_default();
                    let rule = build_rule(&pattern, &unique_rule_slug(kb, &pattern.id), severity);

                    if !kb.add_pattern(pattern.clone()) {
                        continue;
                    }
                    if !kb.add_rule(rule.clone()) {
                        tracing::warn!("Rule {} already exists; pattern {} has no rule", rule.id, pattern.id);
                        continue;
                    }
                    for &i in &error_idx {
                        let id = kb.errors[i].id.clone();
                        kb.link_prevention_rule(&id, &rule.id)?;
                    }
                    tracing::info!("Synthesized pattern {} and rule {}", pattern.id, rule.id);
                    report.patterns.push(pattern);
                    report.rules.push(rule);
                }
                Ok(report)
            })
            .await?;

        Ok(report)
    }
}
