//! Debug-statement provider: drops standalone `console.log(...)`,
//! `debugger;` and `dbg!(...)` lines.
//!
//! Detection is line based. Calls spanning several lines, or used as an
//! expression (`let x = dbg!(y);`), are not touched.

use crate::autofix::confidence::ChangeType;
use crate::autofix::provider::{
    ConfidenceInput, FileRewrite, FixProvider, FixSuggestion, Transform,
};
use crate::autofix::providers::SourceFiles;
use crate::autofix::safety::BuildCheck;
use crate::error::Result;
use crate::types::new_id;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;

lazy_static! {
    static ref DEBUG_LINE: Regex = Regex::new(
        r"^\s*(?:console\.log\(.*\)\s*;?|debugger\s*;?|dbg!\(.*\)\s*;)\s*$"
    )
    .expect("debug statement regex is valid");
}

pub struct DebugStatementProvider {
    sources: SourceFiles,
    check: Option<Arc<dyn BuildCheck>>,
}

impl DebugStatementProvider {
    pub const NAME: &'static str = "debug-statements";

    pub fn new(sources: SourceFiles) -> Self {
        Self {
            sources,
            check: None,
        }
    }

    pub fn verified_by(mut self, check: Option<Arc<dyn BuildCheck>>) -> Self {
        self.check = check;
        self
    }
}

fn is_debug_line(line: &str) -> bool {
    DEBUG_LINE.is_match(line.trim_end_matches(['\r', '\n']))
}

/// Content without debug lines, or `None` when there are none
pub fn strip_debug_statements(content: &str) -> Option<String> {
    let mut removed = 0;
    let kept: String = content
        .split_inclusive('\n')
        .filter(|line| {
            let debug = is_debug_line(line);
            if debug {
                removed += 1;
            }
            !debug
        })
        .collect();
    (removed > 0).then_some(kept)
}

#[async_trait]
impl FixProvider for DebugStatementProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn scan(&self, files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>> {
        let mut suggestions = Vec::new();
        for path in self.sources.resolve(files) {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            let count = content.split_inclusive('\n').filter(|l| is_debug_line(l)).count();
            if count == 0 {
                continue;
            }

            let transform: Transform = Arc::new(strip_debug_statements);
            suggestions.push(FixSuggestion {
                id: new_id("sug"),
                provider: Self::NAME.to_string(),
                description: format!(
                    "Remove {} debug statement(s) from {}",
                    count,
                    self.sources.display(&path)
                ),
                files: vec![path.clone()],
                change_type: ChangeType::Lint,
                confidence: ConfidenceInput::heuristic(0.2, 0.5),
                action: Box::new(FileRewrite::new(path, transform).verified_by(self.check.clone())),
            });
        }
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_standalone_statements_are_removed() {
        let source = "\
function load() {
  console.log('loading', id);
  debugger;
  const user = fetchUser(id);
  logger.console.log(user);
  return user;
}
";
        let stripped = strip_debug_statements(source).unwrap();
        assert_eq!(
            stripped,
            "\
function load() {
  const user = fetchUser(id);
  logger.console.log(user);
  return user;
}
"
        );
        assert!(strip_debug_statements(&stripped).is_none());
    }

    #[test]
    fn rust_dbg_needs_statement_form() {
        assert!(is_debug_line("    dbg!(&state);\n"));
        assert!(!is_debug_line("    let x = dbg!(y);\n"));
        assert!(!is_debug_line("    dbg!(y)\n"));
    }

    #[tokio::test]
    async fn scan_counts_statements_per_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("app.js"),
            "console.log(1)\nrun();\nconsole.log(2);\n",
        )
        .await
        .unwrap();

        let provider = DebugStatementProvider::new(SourceFiles::new(dir.path(), vec!["js".into()]));
        let suggestions = provider.scan(None).await.unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(
            suggestions[0].description,
            "Remove 2 debug statement(s) from app.js"
        );
        assert_eq!(suggestions[0].change_type, ChangeType::Lint);
    }
}
