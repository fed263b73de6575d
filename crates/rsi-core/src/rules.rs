//! Rule Manager - publishes synthesized rules to where they are enforced
//!
//! AST-selector rules go into the lint configuration's `rules` block by
//! inserting text right after the block opens, so the rest of the file is
//! left exactly as written. Regex rules go to the custom-rules JSON list.
//! Duplicates and a missing `rules` block are reported as `false`.

use crate::error::{Result, ResultExt};
use crate::knowledge::{DetectionKind, Rule};
use crate::storage;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref RULES_BLOCK: Regex =
        Regex::new(r#"(?m)["']?rules["']?\s*:\s*\{"#).expect("rules block regex is valid");
}

#[derive(Debug, Clone)]
pub struct RuleManager {
    enforcement_config: PathBuf,
    custom_rules: PathBuf,
}

impl RuleManager {
    pub fn new(enforcement_config: impl Into<PathBuf>, custom_rules: impl Into<PathBuf>) -> Self {
        Self {
            enforcement_config: enforcement_config.into(),
            custom_rules: custom_rules.into(),
        }
    }

    pub fn custom_rules_path(&self) -> &Path {
        &self.custom_rules
    }

    /// Publish a rule. `Ok(false)` when it is already active or cannot be placed.
    pub async fn activate_rule(&self, rule: &Rule) -> Result<bool> {
        let activated = match rule.implementation.kind {
            DetectionKind::AstSelector => self.inject_selector_rule(rule).await?,
            DetectionKind::Regex => self.append_custom_rule(rule).await?,
        };
        if activated {
            tracing::info!("Activated rule {} ({})", rule.id, rule.name);
        }
        Ok(activated)
    }

    pub async fn custom_rules(&self) -> Result<Vec<Rule>> {
        let rules: Option<Vec<Rule>> = storage::read_json(&self.custom_rules)
            .await
            .with_context(|| format!("Reading custom rules {}", self.custom_rules.display()))?;
        Ok(rules.unwrap_or_default())
    }

    async fn append_custom_rule(&self, rule: &Rule) -> Result<bool> {
        let mut rules = self.custom_rules().await?;
        let duplicate = rules.iter().any(|existing| {
            existing.id == rule.id
                || existing.name == rule.name
                || existing.implementation.expression == rule.implementation.expression
        });
        if duplicate {
            tracing::debug!("Rule {} already in custom rules", rule.id);
            return Ok(false);
        }
        rules.push(rule.clone());
        storage::write_json(&self.custom_rules, &rules).await?;
        Ok(true)
    }

    async fn inject_selector_rule(&self, rule: &Rule) -> Result<bool> {
        let content = match tokio::fs::read_to_string(&self.enforcement_config).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Enforcement config {} not found; rule {} not activated",
                    self.enforcement_config.display(),
                    rule.id
                );
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let key = rule_key(rule);
        let selector = quote(&rule.implementation.expression);
        if content.contains(&format!("'{}'", key)) || content.contains(&selector) {
            tracing::debug!("Rule {} already present in enforcement config", rule.id);
            return Ok(false);
        }

        let Some(block) = RULES_BLOCK.find(&content) else {
            tracing::warn!(
                "No rules block in {}; rule {} not activated",
                self.enforcement_config.display(),
                rule.id
            );
            return Ok(false);
        };

        let entry = format!(
            "\n    '{}': ['error', {{ selector: {}, message: {} }}],",
            key,
            selector,
            quote(&rule.implementation.message)
        );
        let mut updated = String::with_capacity(content.len() + entry.len());
        updated.push_str(&content[..block.end()]);
        updated.push_str(&entry);
        updated.push_str(&content[block.end()..]);

        tokio::fs::write(&self.enforcement_config, updated).await?;
        Ok(true)
    }
}

/// Key under which a rule is registered in the lint config
fn rule_key(rule: &Rule) -> String {
    rule.rule_id.clone().unwrap_or_else(|| rule.id.clone())
}

/// Double-quoted JS string literal
fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{Enforcement, RuleImplementation, RuleSource, Severity};
    use crate::types::now;

    fn rule(id: &str, kind: DetectionKind, expression: &str) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("rsi/{}", id),
            source: RuleSource::RsiSynthesized,
            enforcement: Enforcement::Automated,
            rule_id: None,
            description: String::new(),
            severity: Severity::Medium,
            implementation: RuleImplementation {
                kind,
                expression: expression.to_string(),
                message: "Validate API responses".to_string(),
            },
            pattern_id: Some("TypeScript-api".to_string()),
            created_at: now(),
            deprecated: false,
        }
    }

    const ESLINTRC: &str = "module.exports = {\n  extends: ['eslint:recommended'],\n  rules: {\n    'no-console': 'warn',\n  },\n};\n";

    #[tokio::test]
    async fn selector_rule_is_inserted_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(".eslintrc.js");
        tokio::fs::write(&config, ESLINTRC).await.unwrap();
        let manager = RuleManager::new(&config, dir.path().join("custom-rules.json"));

        let r = rule(
            "rsi-typescript-api",
            DetectionKind::AstSelector,
            "CallExpression[callee.name='fetchUser']",
        );
        assert!(manager.activate_rule(&r).await.unwrap());
        assert!(!manager.activate_rule(&r).await.unwrap());

        let content = tokio::fs::read_to_string(&config).await.unwrap();
        assert_eq!(content.matches("rsi-typescript-api").count(), 1);
        assert!(content.contains(
            "'rsi-typescript-api': ['error', { selector: \"CallExpression[callee.name='fetchUser']\", message: \"Validate API responses\" }],"
        ));
        // Everything else is untouched.
        assert!(content.starts_with("module.exports = {\n  extends: ['eslint:recommended'],\n  rules: {\n"));
        assert!(content.ends_with("    'no-console': 'warn',\n  },\n};\n"));
    }

    #[tokio::test]
    async fn missing_injection_point_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(".eslintrc.js");
        tokio::fs::write(&config, "module.exports = { extends: [] };\n").await.unwrap();
        let manager = RuleManager::new(&config, dir.path().join("custom-rules.json"));

        let r = rule("rsi-x", DetectionKind::AstSelector, "CallExpression[callee.name='x']");
        assert!(!manager.activate_rule(&r).await.unwrap());

        let absent = RuleManager::new(dir.path().join("nope.js"), dir.path().join("c.json"));
        assert!(!absent.activate_rule(&r).await.unwrap());
    }

    #[tokio::test]
    async fn regex_rules_go_to_custom_list_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RuleManager::new(dir.path().join(".eslintrc.js"), dir.path().join("custom-rules.json"));

        assert!(manager
            .activate_rule(&rule("rsi-a", DetectionKind::Regex, r"res\.data\.user"))
            .await
            .unwrap());
        // Same expression under another id is still a duplicate.
        assert!(!manager
            .activate_rule(&rule("rsi-b", DetectionKind::Regex, r"res\.data\.user"))
            .await
            .unwrap());

        let rules = manager.custom_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "rsi-a");
    }

    #[test]
    fn quoted_strings_escape_quotes() {
        assert_eq!(quote(r#"a "b" \c"#), r#""a \"b\" \\c""#);
    }
}
