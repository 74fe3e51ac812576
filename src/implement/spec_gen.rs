//! Spec markdown generation from extracted design.
//!
//! This module transforms an ExtractedSpec into a markdown file
//! suitable for use as a .forge/spec.md.

use chrono::Utc;

use super::types::ExtractedSpec;

/// Generate a markdown spec from an ExtractedSpec.
///
/// The generated markdown follows the format:
/// - Header with title and metadata
/// - Goal section
/// - Components table
/// - Code patterns (if any)
/// - Acceptance criteria checklist
///
/// # Arguments
/// * `spec` - The extracted specification
///
/// # Returns
/// A markdown string ready to be written to .forge/spec.md
pub fn generate_spec_markdown(spec: &ExtractedSpec) -> String {
    let mut lines = Vec::new();

    // Header
    lines.push(format!("# Implementation Spec: {}", spec.title));
    lines.push(String::new());
    lines.push(format!("> Generated from: {}", spec.source));
    lines.push(format!("> Generated at: {}", Utc::now().to_rfc3339()));
    lines.push(String::new());

    // Goal
    lines.push("## Goal".to_string());
    lines.push(String::new());
    lines.push(spec.goal.clone());
    lines.push(String::new());

    // Components table
    lines.push("## Components".to_string());
    lines.push(String::new());
    lines.push("| Component | Description | Complexity | Dependencies |".to_string());
    lines.push("|-----------|-------------|------------|--------------|".to_string());

    for component in &spec.components {
        let deps = if component.dependencies.is_empty() {
            "-".to_string()
        } else {
            component.dependencies.join(", ")
        };
        lines.push(format!(
            "| {} | {} | {} | {} |",
            component.name, component.description, component.complexity, deps
        ));
    }
    lines.push(String::new());

    // Code patterns (if any)
    if !spec.patterns.is_empty() {
        lines.push("## Code Patterns".to_string());
        lines.push(String::new());

        for pattern in &spec.patterns {
            lines.push(format!("### {}", pattern.name));
            lines.push(String::new());
            lines.push("```".to_string());
            lines.push(pattern.code.clone());
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }

    // Acceptance criteria
    if !spec.acceptance_criteria.is_empty() {
        lines.push("## Acceptance Criteria".to_string());
        lines.push(String::new());

        for criterion in &spec.acceptance_criteria {
            lines.push(format!("- [ ] {}", criterion));
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("---".to_string());
    lines.push("*This spec was auto-generated from a design document.*".to_string());
    lines.push(format!("*Original design: {}*", spec.source));
    lines.push(String::new());

    lines.join("\n")
}
