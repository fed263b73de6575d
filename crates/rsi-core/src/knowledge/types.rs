//! Knowledge base document types
//!
//! Field names are camelCase on disk so the document stays readable by the
//! tooling that produced the first knowledge bases.

use crate::types::{new_id, now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Current on-disk document version
pub const KNOWLEDGE_BASE_VERSION: &str = "1.0";

/// The whole persisted knowledge base
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    pub version: String,
    pub last_updated: Timestamp,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self {
            version: KNOWLEDGE_BASE_VERSION.to_string(),
            last_updated: now(),
            errors: Vec::new(),
            patterns: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// Error severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Where an error was observed. Known fields are typed; anything else a
/// reporter attaches lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn for_file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::default()
        }
    }
}

/// A knowledge entry: one observed error signature and its accepted fixes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub id: String,
    pub error_type: String,
    pub category: String,
    #[serde(default)]
    pub severity: Severity,
    /// Free-text signature of the bad code or message
    pub pattern: String,
    #[serde(default)]
    pub context: ErrorContext,
    #[serde(default)]
    pub fixes: Vec<Fix>,
    #[serde(default)]
    pub similar_errors: Vec<String>,
    #[serde(default)]
    pub prevention_rules: Vec<String>,
    #[serde(default = "now")]
    pub first_seen: Timestamp,
}

impl ErrorEntry {
    pub fn new(
        error_type: impl Into<String>,
        category: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id("err"),
            error_type: error_type.into(),
            category: category.into(),
            severity: Severity::default(),
            pattern: pattern.into(),
            context: ErrorContext::default(),
            fixes: Vec::new(),
            similar_errors: Vec::new(),
            prevention_rules: Vec::new(),
            first_seen: now(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    /// Cluster key used by pattern synthesis
    pub fn cluster_key(&self) -> String {
        format!("{}-{}", self.error_type, self.category)
    }

    /// Most recently appended fix
    pub fn latest_fix(&self) -> Option<&Fix> {
        self.fixes.last()
    }
}

/// Who documented a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentedBy {
    System,
    User,
}

/// An accepted fix, owned by exactly one error entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub id: String,
    pub solution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_changes: Option<String>,
    #[serde(default)]
    pub prevention: String,
    pub documented_at: Timestamp,
    pub documented_by: DocumentedBy,
}

impl Fix {
    pub fn new(
        solution: impl Into<String>,
        prevention: impl Into<String>,
        documented_by: DocumentedBy,
    ) -> Self {
        Self {
            id: new_id("fix"),
            solution: solution.into(),
            code_changes: None,
            prevention: prevention.into(),
            documented_at: now(),
            documented_by,
        }
    }

    pub fn with_code_changes(mut self, code: impl Into<String>) -> Self {
        self.code_changes = Some(code.into());
        self
    }

    pub fn documented_at(mut self, at: Timestamp) -> Self {
        self.documented_at = at;
        self
    }
}

/// A generalized, reusable description of a recurring problem and its fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    pub detection: String,
    pub fix: String,
    pub prevention: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good_pattern: Option<String>,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default)]
    pub deprecated: bool,
}

/// Who created a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleSource {
    System,
    User,
    RsiSynthesized,
}

/// How a rule is enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Automated,
    Manual,
}

/// Shape of a rule's detection expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionKind {
    /// Regular expression over source text
    Regex,
    /// ESLint-style AST selector (`CallExpression[callee.name='x']`)
    AstSelector,
}

/// A mechanically checkable detection plus the message reported on a hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleImplementation {
    pub kind: DetectionKind,
    pub expression: String,
    pub message: String,
}

/// An enforceable instantiation of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub source: RuleSource,
    pub enforcement: Enforcement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    pub implementation: RuleImplementation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,
    #[serde(default = "now")]
    pub created_at: Timestamp,
    #[serde(default)]
    pub deprecated: bool,
}
