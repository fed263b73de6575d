//! Whitespace provider: strips trailing whitespace and ensures a final newline

use crate::autofix::confidence::ChangeType;
use crate::autofix::provider::{
    ConfidenceInput, FileRewrite, FixProvider, FixSuggestion, Transform,
};
use crate::autofix::providers::SourceFiles;
use crate::autofix::safety::BuildCheck;
use crate::error::Result;
use crate::types::new_id;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

pub struct WhitespaceProvider {
    sources: SourceFiles,
    check: Option<Arc<dyn BuildCheck>>,
}

impl WhitespaceProvider {
    pub const NAME: &'static str = "whitespace";

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

/// Normalized content, or `None` when the text is already clean. Files with
/// CRLF line endings and empty files are left alone.
pub fn normalize_whitespace(content: &str) -> Option<String> {
    if content.is_empty() || content.contains('\r') {
        return None;
    }

    let mut out: String = content
        .split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n");
    let trimmed_len = out.trim_end_matches('\n').len();
    out.truncate(trimmed_len);
    out.push('\n');

    (out != content).then_some(out)
}

#[async_trait]
impl FixProvider for WhitespaceProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn scan(&self, files: Option<&[PathBuf]>) -> Result<Vec<FixSuggestion>> {
        let mut suggestions = Vec::new();
        for path in self.sources.resolve(files) {
            let Ok(content) = tokio::fs::read_to_string(&path).await else {
                continue;
            };
            if normalize_whitespace(&content).is_none() {
                continue;
            }

            let transform: Transform = Arc::new(normalize_whitespace);
            suggestions.push(FixSuggestion {
                id: new_id("sug"),
                provider: Self::NAME.to_string(),
                description: format!("Normalize whitespace in {}", self.sources.display(&path)),
                files: vec![path.clone()],
                change_type: ChangeType::Format,
                confidence: ConfidenceInput::heuristic(0.0, 0.5),
                action: Box::new(FileRewrite::new(path, transform).verified_by(self.check.clone())),
            });
        }
        Ok(suggestions)
    }
}
