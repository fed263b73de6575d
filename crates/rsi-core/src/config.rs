//! Engine configuration
//!
//! Loaded from `rsi.toml` at the workspace root. Every field has a default so
//! a missing file, or a file that only sets a few keys, is valid.
//!
//! ```toml
//! [pipeline]
//! min_confidence = "HIGH"
//!
//! [build]
//! command = ["cargo", "check", "--quiet"]
//! ```

use crate::autofix::ConfidenceLevel;
use crate::error::{Result, RsiError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, resolved against the workspace root
pub const DEFAULT_CONFIG_FILE: &str = "rsi.toml";

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiConfig {
    /// Where persisted state lives
    pub paths: PathsConfig,

    /// Auto-fix pipeline behaviour
    pub pipeline: PipelineConfig,

    /// Build/type-check collaborator
    pub build: BuildConfig,

    /// Commit identity
    pub git: GitConfig,

    /// Rule activation targets
    pub enforcement: EnforcementConfig,

    /// Pattern and rule synthesis
    pub learning: LearningConfig,

    /// Source discovery for providers
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// State directory, relative to the workspace root unless absolute
    pub state_dir: PathBuf,
    pub knowledge_file: String,
    pub index_file: String,
    pub ledger_file: String,
    pub feedback_file: String,
    pub custom_rules_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".rsi"),
            knowledge_file: "knowledge-base.json".to_string(),
            index_file: "knowledge-index.json".to_string(),
            ledger_file: "change-ledger.json".to_string(),
            feedback_file: "feedback-log.json".to_string(),
            custom_rules_file: "custom-rules.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dry_run: bool,
    /// LOW suggestions are skipped when this is MEDIUM or HIGH
    pub min_confidence: ConfidenceLevel,
    /// Run the broad build check before scanning
    pub require_passing_build: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            min_confidence: ConfidenceLevel::Medium,
            require_passing_build: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Program and arguments; an empty list disables the check
    pub command: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: vec!["npx".into(), "tsc".into(), "--noEmit".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub author_name: String,
    pub author_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            author_name: "RSI Auto-Fix".to_string(),
            author_email: "rsi@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnforcementConfig {
    /// Lint-style config receiving AST-selector rules
    pub config_file: PathBuf,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from(".eslintrc.js"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Only fixes documented within this many days feed synthesis
    pub window_days: i64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    /// Names of the built-in providers to register
    pub providers: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: ["ts", "tsx", "js", "jsx", "rs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            providers: vec![
                "whitespace".to_string(),
                "debug-statements".to_string(),
                "learned-patterns".to_string(),
            ],
        }
    }
}

/// Absolute locations of every persisted artifact for one workspace
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub knowledge: PathBuf,
    pub index: PathBuf,
    pub ledger: PathBuf,
    pub feedback: PathBuf,
    pub custom_rules: PathBuf,
    pub enforcement_config: PathBuf,
}

impl RsiConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)
                    .map_err(|e| e.context(format!("Reading {}", path.display())))?;
                tracing::debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RsiError::Config(e.to_string()))
    }

    /// Apply `RSI_STATE_DIR` and `RSI_MIN_CONFIDENCE` overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("RSI_STATE_DIR") {
            self.paths.state_dir = PathBuf::from(dir);
        }
        if let Ok(level) = std::env::var("RSI_MIN_CONFIDENCE") {
            self.pipeline.min_confidence = level
                .parse()
                .map_err(|e: String| RsiError::Config(format!("RSI_MIN_CONFIDENCE: {}", e)))?;
        }
        Ok(self)
    }

    /// Set dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.pipeline.dry_run = dry_run;
        self
    }

    /// Set the minimum confidence level
    pub fn with_min_confidence(mut self, level: ConfidenceLevel) -> Self {
        self.pipeline.min_confidence = level;
        self
    }

    /// Set the build/type-check command
    pub fn with_build_command(mut self, command: Vec<String>) -> Self {
        self.build.command = command;
        self
    }

    /// Resolve every artifact path against the workspace root
    pub fn state_paths(&self, root: &Path) -> StatePaths {
        let state_dir = if self.paths.state_dir.is_absolute() {
            self.paths.state_dir.clone()
        } else {
            root.join(&self.paths.state_dir)
        };
        let enforcement_config = if self.enforcement.config_file.is_absolute() {
            self.enforcement.config_file.clone()
        } else {
            root.join(&self.enforcement.config_file)
        };

        StatePaths {
            root: root.to_path_buf(),
            knowledge: state_dir.join(&self.paths.knowledge_file),
            index: state_dir.join(&self.paths.index_file),
            ledger: state_dir.join(&self.paths.ledger_file),
            feedback: state_dir.join(&self.paths.feedback_file),
            custom_rules: state_dir.join(&self.paths.custom_rules_file),
            enforcement_config,
            state_dir,
        }
    }
}
