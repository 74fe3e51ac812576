//! Sub-phase delegation module for Forge.
//!
//! This module provides functionality for:
//! - Spawning sub-phases when scope discovery occurs
//! - Managing sub-phase execution flow
//! - Coordinating parent-child phase relationships
//! - Budget carving from parent phases

mod executor;
mod manager;

pub use executor::SubPhaseExecutor;
pub use manager::SubPhaseManager;

use crate::phase::{Phase, SubPhase};
use crate::signals::SubPhaseSpawnSignal;

/// Result of a sub-phase spawn request validation.
#[derive(Debug, Clone)]
pub enum SpawnValidation {
    /// The spawn request is valid and can proceed.
    Valid,
    /// The budget exceeds the parent's remaining budget.
    InsufficientBudget {
        requested: u32,
        available: u32,
    },
    /// The promise tag is invalid (e.g., empty or duplicate).
    InvalidPromise(String),
    /// The name is invalid (e.g., empty).
    InvalidName(String),
    /// Too many sub-phases already spawned.
    TooManySubPhases {
        current: usize,
        max: usize,
    },
}

impl SpawnValidation {
    /// Check if the validation passed.
    pub fn is_valid(&self) -> bool {
        matches!(self, SpawnValidation::Valid)
    }

    /// Get an error message if validation failed.
    pub fn error_message(&self) -> Option<String> {
        match self {
            SpawnValidation::Valid => None,
            SpawnValidation::InsufficientBudget { requested, available } => {
                Some(format!(
                    "Requested budget {} exceeds available budget {}",
                    requested, available
                ))
            }
            SpawnValidation::InvalidPromise(reason) => {
                Some(format!("Invalid promise: {}", reason))
            }
            SpawnValidation::InvalidName(reason) => {
                Some(format!("Invalid name: {}", reason))
            }
            SpawnValidation::TooManySubPhases { current, max } => {
                Some(format!(
                    "Too many sub-phases: {} already spawned (max {})",
                    current, max
                ))
            }
        }
    }
}

/// Configuration for sub-phase spawning behavior.
#[derive(Debug, Clone)]
pub struct SubPhaseConfig {
    /// Maximum number of sub-phases that can be spawned from a single parent.
    pub max_sub_phases: usize,
    /// Minimum budget that must remain in parent after spawning.
    pub min_parent_budget_reserve: u32,
    /// Whether to auto-approve sub-phase spawns.
    pub auto_approve_spawns: bool,
}

impl Default for SubPhaseConfig {
    fn default() -> Self {
        Self {
            max_sub_phases: 10,
            min_parent_budget_reserve: 1,
            auto_approve_spawns: false,
        }
    }
}

/// Validate a sub-phase spawn signal against the parent phase.
pub fn validate_spawn(
    signal: &SubPhaseSpawnSignal,
    parent: &Phase,
    config: &SubPhaseConfig,
) -> SpawnValidation {
    // Check name
    if signal.name.trim().is_empty() {
        return SpawnValidation::InvalidName("Name cannot be empty".to_string());
    }

    // Check promise
    if signal.promise.trim().is_empty() {
        return SpawnValidation::InvalidPromise("Promise cannot be empty".to_string());
    }

    // Check for duplicate promise in existing sub-phases
    if parent.sub_phases.iter().any(|sp| sp.promise == signal.promise) {
        return SpawnValidation::InvalidPromise(format!(
            "Promise '{}' already used by another sub-phase",
            signal.promise
        ));
    }

    // Check budget
    let available = parent.remaining_budget().saturating_sub(config.min_parent_budget_reserve);
    if signal.budget > available {
        return SpawnValidation::InsufficientBudget {
            requested: signal.budget,
            available,
        };
    }

    // Check sub-phase count
    if parent.sub_phases.len() >= config.max_sub_phases {
        return SpawnValidation::TooManySubPhases {
            current: parent.sub_phases.len(),
            max: config.max_sub_phases,
        };
    }

    SpawnValidation::Valid
}

/// Create a SubPhase from a spawn signal.
pub fn spawn_from_signal(signal: &SubPhaseSpawnSignal, parent: &Phase) -> SubPhase {
    let order = parent.sub_phases.len() as u32 + 1;
    let mut sub_phase = SubPhase::new(
        &parent.number,
        order,
        &signal.name,
        &signal.promise,
        signal.budget,
        &signal.reasoning,
    );
    sub_phase.skills = signal.skills.clone();
    sub_phase
}
