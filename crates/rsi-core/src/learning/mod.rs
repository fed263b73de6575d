//! Learning from accumulated fixes
//!
//! [`pattern_extractor`] decides whether a group of fixes shares enough to
//! generalize; [`rule_synthesizer`] groups recent fixes, materializes
//! patterns, and derives enforceable rules from them.

pub mod pattern_extractor;
pub mod rule_synthesizer;

pub use pattern_extractor::{extract_pattern, ExtractedPattern, MIN_FIX_COUNT_FOR_RULE};
pub use rule_synthesizer::{synthesize_detection, RuleSynthesizer, SynthesisReport};
