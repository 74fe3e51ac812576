//! Type definitions for design document extraction and transformation.
//!
//! These types represent the structured output from Claude when extracting
//! implementation details from a design document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// The full extracted design containing both the spec and phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDesign {
    /// The extracted specification details
    pub spec: ExtractedSpec,
    /// The generated phases with TDD pairing
    pub phases: Vec<Phase>,
}

/// Extracted specification from a design document.
///
/// This represents a focused, implementation-ready spec
/// derived from the full design document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSpec {
    /// Title of the implementation
    pub title: String,
    /// Path to the source design document
    pub source: PathBuf,
    /// One paragraph summary of what to build
    pub goal: String,
    /// Components to be implemented
    pub components: Vec<Component>,
    /// Code patterns extracted from the design doc
    #[serde(default)]
    pub patterns: Vec<CodePattern>,
    /// Verifiable acceptance criteria
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

/// A component to be implemented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Name of the component
    pub name: String,
    /// Description of what it does
    pub description: String,
    /// Names of other components this depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Complexity level
    pub complexity: Complexity,
}

/// Complexity level for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
        }
    }
}

/// A code pattern extracted from the design document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePattern {
    /// Name of the pattern
    pub name: String,
    /// Code example from the design doc
    pub code: String,
}
