//! Built-in fix providers
//!
//! - `whitespace`: trailing whitespace and final newline
//! - `debug-statements`: leftover `console.log`, `debugger` and `dbg!` lines
//! - `learned-patterns`: literal bad → good replacements learned in the knowledge base

pub mod debug_statements;
pub mod learned_patterns;
pub mod whitespace;

pub use debug_statements::DebugStatementProvider;
pub use learned_patterns::LearnedPatternProvider;
pub use whitespace::WhitespaceProvider;

use crate::autofix::provider::ProviderRegistry;
use crate::autofix::safety::BuildCheck;
use crate::config::{RsiConfig, StatePaths};
use crate::knowledge::KnowledgeStore;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source files a provider may look at
#[derive(Debug, Clone)]
pub struct SourceFiles {
    root: PathBuf,
    extensions: Vec<String>,
}

impl SourceFiles {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn wanted(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Explicit files (relative to the root unless absolute) filtered by
    /// extension, or every matching file under the root honoring `.gitignore`
    /// and skipping hidden entries. Sorted for stable output.
    pub fn resolve(&self, files: Option<&[PathBuf]>) -> Vec<PathBuf> {
        let mut found: Vec<PathBuf> = match files {
            Some(files) => files
                .iter()
                .map(|f| if f.is_absolute() { f.clone() } else { self.root.join(f) })
                .filter(|f| f.is_file() && self.wanted(f))
                .collect(),
            None => WalkBuilder::new(&self.root)
                .hidden(true)
                .git_ignore(true)
                .build()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|path| path.is_file() && self.wanted(path))
                .collect(),
        };
        found.sort();
        found
    }

    /// Path shown in suggestion descriptions
    pub fn display<'a>(&self, path: &'a Path) -> std::path::Display<'a> {
        path.strip_prefix(&self.root).unwrap_or(path).display()
    }
}

/// Register the providers named in `scan.providers`
pub fn builtin_registry(
    config: &RsiConfig,
    paths: &StatePaths,
    check: Option<Arc<dyn BuildCheck>>,
) -> ProviderRegistry {
    let sources = SourceFiles::new(&paths.root, config.scan.extensions.clone());
    let mut registry = ProviderRegistry::new();

    for name in &config.scan.providers {
        match name.as_str() {
            WhitespaceProvider::NAME => registry.register(Arc::new(
                WhitespaceProvider::new(sources.clone()).verified_by(check.clone()),
            )),
            DebugStatementProvider::NAME => registry.register(Arc::new(
                DebugStatementProvider::new(sources.clone()).verified_by(check.clone()),
            )),
            LearnedPatternProvider::NAME => registry.register(Arc::new(
                LearnedPatternProvider::new(sources.clone(), KnowledgeStore::new(&paths.knowledge))
                    .verified_by(check.clone()),
            )),
            other => tracing::warn!("Unknown fix provider '{}' in configuration, ignoring", other),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walk_filters_by_extension_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".rsi")).unwrap();
        fs::write(dir.path().join("src/a.ts"), "").unwrap();
        fs::write(dir.path().join("src/b.md"), "").unwrap();
        fs::write(dir.path().join(".rsi/c.ts"), "").unwrap();

        let sources = SourceFiles::new(dir.path(), vec![".TS".to_string()]);
        let files = sources.resolve(None);
        assert_eq!(files, vec![dir.path().join("src/a.ts")]);
    }

    #[test]
    fn explicit_files_resolve_against_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        let sources = SourceFiles::new(dir.path(), vec!["rs".to_string()]);

        let files = sources.resolve(Some(&[PathBuf::from("a.rs"), PathBuf::from("missing.rs")]));
        assert_eq!(files, vec![dir.path().join("a.rs")]);
    }

    #[test]
    fn registry_follows_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RsiConfig::default();
        config.scan.providers = vec!["debug-statements".to_string(), "nope".to_string()];
        let paths = config.state_paths(dir.path());

        let registry = builtin_registry(&config, &paths, None);
        assert_eq!(registry.names(), vec!["debug-statements"]);
    }
}
