//! Skills and Templates System for Forge.
//!
//! This module provides reusable prompt fragments loaded on-demand that reduce
//! repetition and provide specialized context for different phase types.
//!
//! # Skill Structure
//!
//! Skills are stored as markdown files in `.forge/skills/`:
//!
//! ```text
//! .forge/skills/
//! ├── rust-conventions/
//! │   └── SKILL.md      # Rust-specific guidance
//! ├── testing-strategy/
//! │   └── SKILL.md      # Testing approach
//! └── api-design/
//!     └── SKILL.md      # REST/GraphQL patterns
//! ```
//!
//! # Phase Integration
//!
//! Phases can reference skills in their JSON definition:
//!
//! ```json
//! {
//!   "number": "03",
//!   "name": "API implementation",
//!   "skills": ["rust-conventions", "api-design"],
//!   "promise": "API COMPLETE"
//! }
//! ```
//!
//! Skills are injected into the phase prompt between the specification and task sections.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The name of the skills directory within .forge
pub const SKILLS_DIR: &str = "skills";

/// The filename for skill content
pub const SKILL_FILE: &str = "SKILL.md";

/// A loaded skill with its content and metadata.
#[derive(Debug, Clone)]
pub struct Skill {
    /// The skill name (directory name)
    pub name: String,
    /// The full path to the skill directory
    pub path: PathBuf,
    /// The content of SKILL.md
    pub content: String,
}

impl Skill {
    /// Create a new Skill from a path and content.
    pub fn new(name: &str, path: PathBuf, content: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            content,
        }
    }

    /// Get the skill content formatted for injection into a prompt.
    pub fn as_prompt_section(&self) -> String {
        format!(
            "## SKILL: {}\n\n{}",
            self.name.to_uppercase().replace('-', " "),
            self.content.trim()
        )
    }
}

/// Skills loader that manages loading and caching of skills.
#[derive(Debug)]
pub struct SkillsLoader {
    /// Path to the skills directory (.forge/skills)
    skills_dir: PathBuf,
    /// Cache of loaded skills
    cache: HashMap<String, Skill>,
    /// Whether verbose logging is enabled
    verbose: bool,
}

impl SkillsLoader {
    /// Create a new SkillsLoader for the given forge directory.
    pub fn new(forge_dir: &Path, verbose: bool) -> Self {
        Self {
            skills_dir: forge_dir.join(SKILLS_DIR),
            cache: HashMap::new(),
            verbose,
        }
    }

    /// Load a single skill by name.
    ///
    /// Returns None if the skill doesn't exist (with a warning if verbose).
    /// Returns an error only for I/O failures on existing skills.
    pub fn load_skill(&mut self, name: &str) -> Result<Option<Skill>> {
        // Check cache first
        if let Some(skill) = self.cache.get(name) {
            return Ok(Some(skill.clone()));
        }

        let skill_dir = self.skills_dir.join(name);
        let skill_file = skill_dir.join(SKILL_FILE);

        if !skill_file.exists() {
            if self.verbose {
                eprintln!("Warning: Skill '{}' not found at {}", name, skill_file.display());
            }
            return Ok(None);
        }

        let content = std::fs::read_to_string(&skill_file)
            .with_context(|| format!("Failed to read skill file: {}", skill_file.display()))?;

        let skill = Skill::new(name, skill_dir, content);
        self.cache.insert(name.to_string(), skill.clone());

        Ok(Some(skill))
    }

    /// Load multiple skills by name.
    ///
    /// Returns all successfully loaded skills, skipping missing ones.
    pub fn load_skills(&mut self, names: &[String]) -> Result<Vec<Skill>> {
        let mut skills = Vec::new();
        for name in names {
            if let Some(skill) = self.load_skill(name)? {
                skills.push(skill);
            }
        }
        Ok(skills)
    }

    /// Generate a prompt section from a list of skill names.
    ///
    /// This is the main entry point for integrating skills into prompts.
    /// Returns an empty string if no skills are found.
    pub fn generate_skills_section(&mut self, skill_names: &[String]) -> Result<String> {
        let skills = self.load_skills(skill_names)?;

        if skills.is_empty() {
            return Ok(String::new());
        }

        let sections: Vec<String> = skills.iter().map(|s| s.as_prompt_section()).collect();

        Ok(format!(
            "## SKILLS AND CONVENTIONS\n\nThe following skills provide guidance for this phase:\n\n{}\n\n",
            sections.join("\n\n---\n\n")
        ))
    }

    /// List all available skills in the skills directory.
    pub fn list_skills(&self) -> Result<Vec<String>> {
        if !self.skills_dir.exists() {
            return Ok(Vec::new());
        }

        let mut skills = Vec::new();
        let entries = std::fs::read_dir(&self.skills_dir)
            .with_context(|| format!("Failed to read skills directory: {}", self.skills_dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir()
                && path.join(SKILL_FILE).exists()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                skills.push(name.to_string());
            }
        }

        skills.sort();
        Ok(skills)
    }

    /// Get the path where a new skill should be created.
    pub fn skill_path(&self, name: &str) -> PathBuf {
        self.skills_dir.join(name)
    }

    /// Check if the skills directory exists.
    pub fn skills_dir_exists(&self) -> bool {
        self.skills_dir.exists()
    }

    /// Get the skills directory path.
    pub fn skills_dir(&self) -> &Path {
        &self.skills_dir
    }
}

/// Create the skills directory structure.
pub fn ensure_skills_directory(forge_dir: &Path) -> Result<PathBuf> {
    let skills_dir = forge_dir.join(SKILLS_DIR);
    std::fs::create_dir_all(&skills_dir)
        .with_context(|| format!("Failed to create skills directory: {}", skills_dir.display()))?;
    Ok(skills_dir)
}

/// Create a new skill with the given name and content.
pub fn create_skill(forge_dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    let skills_dir = ensure_skills_directory(forge_dir)?;
    let skill_dir = skills_dir.join(name);
    std::fs::create_dir_all(&skill_dir)
        .with_context(|| format!("Failed to create skill directory: {}", skill_dir.display()))?;

    let skill_file = skill_dir.join(SKILL_FILE);
    std::fs::write(&skill_file, content)
        .with_context(|| format!("Failed to write skill file: {}", skill_file.display()))?;

    Ok(skill_dir)
}

/// Delete a skill by name.
pub fn delete_skill(forge_dir: &Path, name: &str) -> Result<()> {
    let skill_dir = forge_dir.join(SKILLS_DIR).join(name);
    if skill_dir.exists() {
        std::fs::remove_dir_all(&skill_dir)
            .with_context(|| format!("Failed to delete skill: {}", skill_dir.display()))?;
    }
    Ok(())
}
