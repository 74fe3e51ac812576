//! DAG scheduler for parallel phase execution.
//!
//! This module provides phase-level parallelism through a directed acyclic graph (DAG)
//! scheduler. It builds a dependency graph from phases.json and executes phases in
//! parallel waves while respecting dependencies.
//!
//! ## Architecture
//!
//! The DAG scheduler has three main components:
//!
//! 1. **Builder** - Constructs a DAG from phases with their dependencies
//! 2. **Scheduler** - Computes execution waves and manages ready states
//! 3. **Executor** - Runs phases in parallel with review integration
//!
//! ## Example
//!
//! ```no_run
//! use forge::dag::{DagScheduler, DagConfig};
//! use forge::phase::Phase;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let phases = vec![
//!     Phase::new("01", "Setup", "SETUP DONE", 5, "Initial setup", vec![]),
//!     Phase::new("02", "Core", "CORE DONE", 10, "Core work", vec!["01".to_string()]),
//!     Phase::new("03", "Tests", "TESTS DONE", 8, "Testing", vec!["01".to_string()]),
//!     Phase::new("04", "Docs", "DOCS DONE", 5, "Documentation", vec!["02".to_string(), "03".to_string()]),
//! ];
//!
//! let config = DagConfig::default();
//! let scheduler = DagScheduler::from_phases(&phases, config)?;
//!
//! // Compute execution waves
//! let waves = scheduler.compute_waves();
//! // Wave 0: [01] - no dependencies
//! // Wave 1: [02, 03] - both depend only on 01
//! // Wave 2: [04] - depends on 02 and 03
//! # Ok(())
//! # }
//! ```

mod builder;
mod executor;
mod scheduler;
mod state;

pub use builder::DagBuilder;
pub use executor::{DagExecutor, ExecutionResult, ExecutorConfig, PhaseEvent};
pub use scheduler::{DagConfig, DagScheduler, PhaseNode, PhaseStatus, ReviewConfig, ReviewMode, SwarmBackend};
pub use state::{DagState, DagSummary, PhaseResult};
