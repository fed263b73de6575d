//! Safety Gate - preconditions for any automated mutation
//!
//! A non-dry-run cycle needs a clean working tree and, unless disabled, a
//! passing build check before anything is scanned. Suggestions reuse the
//! same build check, narrowed to the files they touched, as verification.

use crate::autofix::vcs::VersionControl;
use crate::error::{Result, RsiError, SafetyViolation};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Build or type-check collaborator
#[async_trait]
pub trait BuildCheck: Send + Sync {
    /// Run the check; `selector` narrows it (e.g. to one file) when supported
    async fn run(&self, selector: Option<&str>) -> Result<bool>;
}

/// External command check. The selector, when given, is appended as the
/// final argument.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandCheck {
    pub fn new(program: impl Into<String>, args: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl BuildCheck for CommandCheck {
    async fn run(&self, selector: Option<&str>) -> Result<bool> {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).current_dir(&self.cwd);
        if let Some(selector) = selector {
            command.arg(selector);
        }

        let output = command
            .output()
            .await
            .map_err(|e| RsiError::Check(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            tracing::debug!(
                "Check `{} {}` exited with {:?}: {}",
                self.program,
                self.args.join(" "),
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

/// Check used when no build command is configured; always passes
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipCheck;

#[async_trait]
impl BuildCheck for SkipCheck {
    async fn run(&self, _selector: Option<&str>) -> Result<bool> {
        Ok(true)
    }
}

/// Build the configured check; an empty argv disables checking
pub fn build_check_from_argv(argv: &[String], cwd: impl Into<PathBuf>) -> Arc<dyn BuildCheck> {
    match argv.split_first() {
        Some((program, args)) => Arc::new(CommandCheck::new(program.clone(), args.to_vec(), cwd)),
        None => {
            tracing::debug!("No build command configured; build checks are skipped");
            Arc::new(SkipCheck)
        }
    }
}

#[derive(Clone)]
pub struct SafetyGate {
    vcs: Arc<dyn VersionControl>,
    checks: Arc<dyn BuildCheck>,
}

impl SafetyGate {
    pub fn new(vcs: Arc<dyn VersionControl>, checks: Arc<dyn BuildCheck>) -> Self {
        Self { vcs, checks }
    }

    pub fn is_working_tree_clean(&self) -> Result<bool> {
        self.vcs.is_clean()
    }

    pub async fn checks_pass(&self, selector: Option<&str>) -> Result<bool> {
        self.checks.run(selector).await
    }

    /// Refuse to write empty content over a file
    pub fn validate_non_empty(content: &str) -> bool {
        !content.trim().is_empty()
    }

    /// Cycle precondition: clean tree first, then (optionally) the build check
    pub async fn ensure_ready(&self, require_passing_build: bool) -> Result<()> {
        if !self.is_working_tree_clean()? {
            return Err(SafetyViolation::DirtyWorkingTree.into());
        }
        if require_passing_build && !self.checks_pass(None).await? {
            return Err(SafetyViolation::ChecksFailing { selector: None }.into());
        }
        Ok(())
    }

    pub fn checks(&self) -> Arc<dyn BuildCheck> {
        Arc::clone(&self.checks)
    }
}
