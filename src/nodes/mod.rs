//! The node library: concrete [`crate::graph::Node`] implementations that
//! a caller wires into a [`crate::graph::GraphBuilder`] to assemble the
//! full workflow graph (planning, the task subgraph, dual-review
//! validation/verification, the fixer subgraph, human escalation).
//!
//! Each submodule owns one cohesive slice of node + router pairs rather
//! than one file per node — `task_subgraph` in particular groups five
//! nodes that only make sense wired together.

pub mod fixer;
pub mod gates;
pub mod human_escalation;
pub mod planning;
pub mod task_subgraph;
pub mod validation;
pub mod worktree;

pub use fixer::{
    ErrorDispatch, FixerApply, FixerConfig, FixerDiagnose, FixerResearch, FixerTriage, FixerValidate,
    FixerVerify, FIXER_APPLY_NODE, FIXER_DIAGNOSE_NODE, FIXER_RESEARCH_NODE, FIXER_TRIAGE_NODE,
    FIXER_VALIDATE_NODE, FIXER_VERIFY_NODE,
};
pub use gates::{QualityGates, QUALITY_GATES_NODE};
pub use human_escalation::{HumanEscalation, HumanEscalationConfig, HUMAN_ESCALATION_NODE};
pub use planning::{Planning, PlanningConfig, PLANNING_NODE, TASK_BREAKDOWN_NODE};
pub use task_subgraph::{
    build_verification_router, BuildVerification, FixBug, ImplementTask, SelectTask, TaskSubgraphConfig,
    VerifyTask, WriteTests, BUILD_VERIFICATION_NODE, ESCALATE_NODE, FIX_BUG_NODE, IMPLEMENT_TASK_NODE,
    SELECT_TASK_NODE, VERIFY_TASK_NODE, WRITE_TESTS_NODE,
};
pub use validation::{
    plan_review_router, DualReviewConfig, DualReviewOutcome, DualReviewVerdict, PlanReview, ReviewerVerdict,
    SingleAgentPreference,
};
pub use worktree::Worktree;
