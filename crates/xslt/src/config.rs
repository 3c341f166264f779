//! Runtime and compile-time knobs.

use crate::error::XsltError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TransformConfig {
    /// Nested template invocations allowed before the run is aborted.
    pub max_recursion_depth: usize,
    /// Report a warning when two rules tie on score, priority and precedence.
    pub warn_on_rule_conflicts: bool,
    /// Drop whitespace-only text nodes from template bodies (`xsl:text` is kept).
    pub strip_stylesheet_whitespace: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 256,
            warn_on_rule_conflicts: true,
            strip_stylesheet_whitespace: true,
        }
    }
}

impl TransformConfig {
    pub fn from_json(text: &str) -> Result<Self, XsltError> {
        Ok(serde_json::from_str(text)?)
    }
}
