//! Sequential phase orchestration.
//!
//! This module owns the single-threaded execution path (`forge run`):
//! one phase at a time, iterated until the phase emits its promise tag or
//! exhausts its iteration budget.  Parallel multi-phase execution lives in
//! [`crate::dag`] instead.
//!
//! ## Persistence Ownership
//!
//! Multiple subsystems write durable state, but each owns a distinct concern:
//!
//! | Layer                    | What it persists                                              |
//! |--------------------------|---------------------------------------------------------------|
//! | `orchestrator/state.rs`        | Phase completion state: which phases are done, iteration count|
//! | `audit/logger.rs`              | Audit trail: signals emitted, tool calls, raw Claude output   |
//! | `orchestrator/repository.rs`   | Checkpoints and structured logs for the graph engine          |
//! | `orchestrator/events.rs`       | Event stream: batched, priority-filtered observability records|
//! | `orchestrator/errors_aggregator.rs` | Deduplicated, fingerprinted error records with severity  |
//! | `compaction/tracker.rs`        | Context-window management: session IDs, compaction summaries  |
//!
//! `StateManager` (in `state.rs`) is the canonical source of truth for
//! *checkpoint recovery* for the sequential phase path; `repository.rs`'s
//! `Repository` trait plays the same role for the graph engine's
//! checkpoint/interrupt model. Neither the audit logger, the event store,
//! nor the error aggregator drive control flow — they are append-only
//! observation layers the graph consults only through explicit reads.

pub mod agent_runner;
pub mod budget;
pub mod errors_aggregator;
pub mod escalation;
pub mod events;
pub mod handoff;
pub mod iterative_loop;
pub mod repository;
pub mod review_integration;
pub mod runner;
pub mod state;

pub use agent_runner::{invoke as invoke_agent, AgentInvocation, AgentResult};
pub use budget::{BudgetManager, ComplexityTier, EnforceResult, ModelRouter};
pub use errors_aggregator::{AggregatedError, ErrorAggregator, ErrorSeverity, ErrorSource};
pub use escalation::{AutonomousDecision, EscalationPayload, ExecutionMode, HumanResponse};
pub use events::{Event, EventEmitter, EventPriority, EventStore};
pub use handoff::{HandoffBrief, HandoffGenerator};
pub use iterative_loop::{
    run_task_loop, IterationOutcome, LoopConfig, PreviousIterationContext, TestFramework,
    COMPLETION_TOKEN,
};
pub use repository::{Checkpoint, FileRepository, Repository};
pub use review_integration::{
    DefaultSpecialist, PhaseWithReviewResult, ReviewIntegration, ReviewIntegrationConfig,
};
pub use runner::{ClaudeRunner, IterationFeedback, PromptContext};
pub use state::StateManager;
