//! Learned-pattern provider: applies knowledge-base patterns that carry both
//! a bad-code sample and its replacement, as literal text substitution.

use crate::autofix::confidence::ChangeType;
use crate::autofix::provider::{
    ConfidenceInput, FileRewrite, FixProvider, FixSuggestion, Transform,
};
use crate::autofix::providers::SourceFiles;
use crate::autofix::safety::BuildCheck;
use crate::error::Result;
use crate::knowledge::{KnowledgeStore, Pattern};
use crate::types::new_id;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Replacements learned from history touch program logic; scored as a
/// moderately complex, moderately covered logic fix (MEDIUM).
const LEARNED_COMPLEXITY: f64 = 0.5;
const LEARNED_COVERAGE: f64 = 0.5;

pub struct LearnedPatternProvider {
    sources: SourceFiles,
    store: KnowledgeStore,
    check: Option<Arc<dyn BuildCheck>>,
}

impl LearnedPatternProvider {
    pub const NAME: &'static str = "learned-patterns";

    pub fn new(sources: SourceFiles, store: KnowledgeStore) -> Self {
        Self {
            sources,
            store,
            check: None,
        }
    }

    pub fn verified_by(mut self, check: Option<Arc<dyn BuildCheck>>) -> Self {
        self.check = check;
        self
    }
}

/// A usable replacement pair
fn replacement(pattern: &Pattern) -> Option<(String, String)> {
    if pattern.deprecated {
        return None;
    }
    let bad = pattern.bad_pattern.as_deref()?.trim();
    let good = pattern.good_pattern.as_deref()?.trim();
    if bad.is_empty() || bad == good {
        return None;
    }
    Some((bad.to_string(), good.to_string()))
}

fn replace_all(bad: String, good: String) -> Transform {
    Arc::new(move |content: &str| content.contains(&bad).then(|| content.replace(&bad, &good)))
}

#[async_trait]
impl FixProvider for LearnedPatternProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn scan(&self, files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>> {
        let kb = self.store.load().await;
        let replacements: Vec<(&Pattern, String, String)> = kb
            .patterns
            .iter()
            .filter_map(|p| replacement(p).map(|(bad, good)| (p, bad, good)))
            .collect();
        if replacements.is_empty() {
            return Ok(Vec::new());
        }

        let mut suggestions = Vec::new();
        for path in self.sources.resolve(files) {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            for (pattern, bad, good) in &replacements {
                let hits = content.matches(bad.as_str()).count();
                if hits == 0 {
                    continue;
                }
                suggestions.push(FixSuggestion {
                    id: new_id("sug"),
                    provider: Self::NAME.to_string(),
                    description: format!(
                        "Apply learned pattern {} ({} occurrence(s)) in {}",
                        pattern.id,
                        hits,
                        self.sources.display(&path)
                    ),
                    files: vec![path.clone()],
                    change_type: ChangeType::LogicFix,
                    confidence: ConfidenceInput::heuristic(LEARNED_COMPLEXITY, LEARNED_COVERAGE),
                    action: Box::new(
                        FileRewrite::new(path.clone(), replace_all(bad.clone(), good.clone()))
                            .verified_by(self.check.clone()),
                    ),
                });
            }
        }
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofix::confidence::{ConfidenceLevel, ConfidenceScorer};
    use crate::types::now;

    fn pattern(id: &str, bad: Option<&str>, good: Option<&str>) -> Pattern {
        Pattern {
            id: id.to_string(),
            name: "validate".to_string(),
            description: String::new(),
            detection: String::new(),
            fix: String::new(),
            prevention: String::new(),
            bad_pattern: bad.map(str::to_string),
            good_pattern: good.map(str::to_string),
            created_at: now(),
            deprecated: false,
        }
    }

    #[tokio::test]
    async fn only_complete_live_patterns_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::new(dir.path().join(".rsi/kb.json"));
        store
            .add_pattern(pattern("TypeScript-api", Some("res.data.user"), Some("res.data?.user")))
            .await
            .unwrap();
        store
            .add_pattern(pattern("Lint-style", Some("var "), None))
            .await
            .unwrap();
        let mut retired = pattern("Old-one", Some("fetchUser("), Some("loadUser("));
        retired.deprecated = true;
        store.add_pattern(retired).await.unwrap();

        let file = dir.path().join("api.ts");
        tokio::fs::write(&file, "var u = res.data.user;\nfetchUser(1);\n").await.unwrap();

        let provider = LearnedPatternProvider::new(
            SourceFiles::new(dir.path(), vec!["ts".into()]),
            store,
        );
        let suggestions = provider.scan(None).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert!(suggestions[0].description.contains("TypeScript-api"));
        assert_eq!(
            suggestions[0].score_with(&ConfidenceScorer::new()).level,
            ConfidenceLevel::Medium
        );

        assert!(suggestions[0].action.apply().await.unwrap());
        let content = tokio::fs::read_to_string(&file).await.unwrap();
        assert_eq!(content, "var u = res.data?.user;\nfetchUser(1);\n");
    }

    #[tokio::test]
    async fn empty_knowledge_base_proposes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.ts"), "x\n").await.unwrap();
        let provider = LearnedPatternProvider::new(
            SourceFiles::new(dir.path(), vec!["ts".into()]),
            KnowledgeStore::new(dir.path().join("kb.json")),
        );
        assert!(provider.scan(None).await.unwrap().is_empty());
    }
}
