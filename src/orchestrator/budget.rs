//! Budget manager and model router.
//!
//! `enforce` is the gate every task iteration consults before spending:
//! proceed, retry cheaper, escalate, or abort. `ModelRouter` is a separate,
//! optional analytic path — it can recommend a cheaper model for a task's
//! complexity tier, but nothing in `enforce` depends on it running.
//! `suggest_budgets` (delegating to `crate::patterns::budget_suggester`)
//! is the same kind of optional, historical-pattern-matching suggestion,
//! scoped to iteration counts rather than dollars.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Static per-model pricing. Populated from the same kind of table the
/// cost-tracking/model-routing subsystem uses: $/1k input tokens, $/1k
/// output tokens, context window, and a capability tag set used to filter
/// candidates for a task's complexity tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub name: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub context_window: u32,
    pub capability_tier: ComplexityTier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
}

pub fn default_model_registry() -> Vec<ModelPricing> {
    vec![
        ModelPricing {
            name: "claude-haiku".to_string(),
            input_cost_per_1k: 0.0008,
            output_cost_per_1k: 0.004,
            context_window: 200_000,
            capability_tier: ComplexityTier::Simple,
        },
        ModelPricing {
            name: "claude-sonnet".to_string(),
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            context_window: 200_000,
            capability_tier: ComplexityTier::Moderate,
        },
        ModelPricing {
            name: "claude-opus".to_string(),
            input_cost_per_1k: 0.015,
            output_cost_per_1k: 0.075,
            context_window: 200_000,
            capability_tier: ComplexityTier::Complex,
        },
    ]
}

/// Picks the cheapest model meeting a task's complexity tier, and can
/// report the estimated savings against always using the most capable
/// model. Purely advisory — `BudgetManager::enforce` doesn't call this.
pub struct ModelRouter {
    registry: Vec<ModelPricing>,
}

impl ModelRouter {
    pub fn new(registry: Vec<ModelPricing>) -> Self {
        Self { registry }
    }

    pub fn with_default_registry() -> Self {
        Self::new(default_model_registry())
    }

    pub fn select_for_tier(&self, tier: ComplexityTier) -> Option<&ModelPricing> {
        self.registry
            .iter()
            .filter(|m| m.capability_tier >= tier)
            .min_by(|a, b| {
                a.input_cost_per_1k
                    .partial_cmp(&b.input_cost_per_1k)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    pub fn estimated_savings(
        &self,
        tier: ComplexityTier,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Option<f64> {
        let chosen = self.select_for_tier(tier)?;
        let most_capable = self
            .registry
            .iter()
            .max_by(|a, b| a.capability_tier.cmp(&b.capability_tier))?;
        let cost = |m: &ModelPricing| {
            (input_tokens as f64 / 1000.0) * m.input_cost_per_1k
                + (output_tokens as f64 / 1000.0) * m.output_cost_per_1k
        };
        Some(cost(most_capable) - cost(chosen))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforceResult {
    pub allowed: bool,
    pub use_fallback_model: bool,
    pub should_escalate: bool,
    pub should_abort: bool,
    pub limit: f64,
    pub current: f64,
    pub remaining: f64,
    pub message: String,
}

/// Tracks cumulative cost per task and per project, and applies the
/// proceed / fallback / escalate / abort ladder from `enforce`.
pub struct BudgetManager {
    limit: f64,
    hard_limit: f64,
    fallback_ratio: f64,
    task_spend: HashMap<String, f64>,
    project_spend: f64,
}

impl BudgetManager {
    pub fn new(limit: f64, hard_limit: f64, fallback_ratio: f64) -> Self {
        Self {
            limit,
            hard_limit,
            fallback_ratio,
            task_spend: HashMap::new(),
            project_spend: 0.0,
        }
    }

    pub fn record_spend(&mut self, task_id: &str, cost: f64) {
        *self.task_spend.entry(task_id.to_string()).or_insert(0.0) += cost;
        self.project_spend += cost;
    }

    pub fn task_spend(&self, task_id: &str) -> f64 {
        self.task_spend.get(task_id).copied().unwrap_or(0.0)
    }

    pub fn project_spend(&self) -> f64 {
        self.project_spend
    }

    /// The policy ladder: within limit → allowed; else fallback-adjusted
    /// cost fits → use a cheaper model; else current spend already over the
    /// hard limit → abort; else escalate to a human/autonomous decision.
    pub fn enforce(&self, task_id: &str, estimated_cost: f64) -> EnforceResult {
        let current = self.task_spend(task_id);
        let projected = current + estimated_cost;

        if projected <= self.limit {
            return EnforceResult {
                allowed: true,
                use_fallback_model: false,
                should_escalate: false,
                should_abort: false,
                limit: self.limit,
                current,
                remaining: self.limit - current,
                message: format!("within budget: {projected:.4} <= {:.4}", self.limit),
            };
        }

        let fallback_projected = current + estimated_cost * self.fallback_ratio;
        if fallback_projected <= self.limit {
            return EnforceResult {
                allowed: true,
                use_fallback_model: true,
                should_escalate: false,
                should_abort: false,
                limit: self.limit,
                current,
                remaining: self.limit - current,
                message: "over budget at current model; fallback model keeps this under the limit"
                    .to_string(),
            };
        }

        if current >= self.hard_limit {
            return EnforceResult {
                allowed: false,
                use_fallback_model: false,
                should_escalate: false,
                should_abort: true,
                limit: self.limit,
                current,
                remaining: 0.0,
                message: format!(
                    "task '{task_id}' has already spent {current:.4}, at or beyond the hard limit {:.4}",
                    self.hard_limit
                ),
            };
        }

        EnforceResult {
            allowed: false,
            use_fallback_model: false,
            should_escalate: true,
            should_abort: false,
            limit: self.limit,
            current,
            remaining: (self.limit - current).max(0.0),
            message: format!(
                "task '{task_id}' projected cost {projected:.4} exceeds the budget {:.4} even with fallback",
                self.limit
            ),
        }
    }
}
