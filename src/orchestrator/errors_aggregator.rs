//! Deduplicating error aggregator.
//!
//! Concurrent occurrences of "the same" error (same type, same phase, same
//! agent, same task, same leading message text) collapse into one
//! `AggregatedError` with a bumped `occurrence_count` rather than flooding
//! the handoff brief with duplicates. See `orchestrator::handoff` for the
//! consumer and `orchestrator::escalation` for where errors are reported in.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where an error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Graph,
    IterativeLoop,
    Reviewer,
    Fixer,
    Budget,
    Human,
}

/// Severity bucket used for sorting and for the handoff brief's grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Critical,
    Error,
    Warning,
}

/// Substring categories used to auto-classify severity when the caller
/// doesn't supply one explicitly. Checked in order; first match wins.
const ERROR_CATEGORIES: &[(&str, ErrorSeverity)] = &[
    ("budget_exceeded", ErrorSeverity::Critical),
    ("budget_limit", ErrorSeverity::Critical),
    ("autonomous_abort", ErrorSeverity::Critical),
    ("user_abort", ErrorSeverity::Critical),
    ("worktree_error", ErrorSeverity::Error),
    ("planning_error", ErrorSeverity::Error),
    ("implementation_error", ErrorSeverity::Error),
    ("verification_failed", ErrorSeverity::Error),
    ("validation_failed", ErrorSeverity::Error),
    ("task_failed", ErrorSeverity::Error),
    ("research_phase_error", ErrorSeverity::Warning),
    ("escalation_timeout", ErrorSeverity::Warning),
    ("task_clarification_needed", ErrorSeverity::Warning),
];

fn classify_severity(error_type: &str, message: &str) -> ErrorSeverity {
    let haystack = format!("{error_type} {message}").to_lowercase();
    for (needle, severity) in ERROR_CATEGORIES {
        if haystack.contains(needle) {
            return *severity;
        }
    }
    ErrorSeverity::Warning
}

/// A single deduplicated error record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedError {
    pub fingerprint: String,
    pub error_type: String,
    pub message: String,
    pub source: ErrorSource,
    pub severity: ErrorSeverity,
    pub phase: Option<String>,
    pub agent: Option<String>,
    pub task_id: Option<String>,
    pub occurrence_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AggregatedError {
    /// `sha256(error_type | message[:100] | phase | agent | task_id)`, truncated to 16 hex chars.
    ///
    /// The source system fingerprinted with MD5; this reimplementation uses
    /// the SHA-256 this workspace already depends on for the same purpose —
    /// deduplication, not cryptographic integrity, so the choice of hash
    /// family is immaterial as long as it's stable.
    pub fn fingerprint(
        error_type: &str,
        message: &str,
        phase: Option<&str>,
        agent: Option<&str>,
        task_id: Option<&str>,
    ) -> String {
        let truncated: String = message.chars().take(100).collect();
        let joined = format!(
            "{}|{}|{}|{}|{}",
            error_type,
            truncated,
            phase.unwrap_or(""),
            agent.unwrap_or(""),
            task_id.unwrap_or(""),
        );
        let digest = Sha256::digest(joined.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Deduplicating, capacity-bounded collector of workflow errors.
pub struct ErrorAggregator {
    max_unresolved: usize,
    prune_percentage: f64,
    errors: HashMap<String, AggregatedError>,
}

impl Default for ErrorAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self {
            max_unresolved: 500,
            prune_percentage: 0.25,
            errors: HashMap::new(),
        }
    }

    /// Rebuild an aggregator from previously-serialized errors (e.g. a
    /// graph state's `errors` field), preserving occurrence counts and
    /// resolutions rather than re-deriving them through `add_error`.
    pub fn from_errors(errors: Vec<AggregatedError>) -> Self {
        let mut aggregator = Self::new();
        aggregator.errors = errors.into_iter().map(|e| (e.fingerprint.clone(), e)).collect();
        aggregator
    }

    #[cfg(test)]
    fn with_capacity(max_unresolved: usize, prune_percentage: f64) -> Self {
        Self {
            max_unresolved,
            prune_percentage,
            errors: HashMap::new(),
        }
    }

    /// Record an error occurrence, merging into an existing entry by fingerprint.
    pub fn add_error(
        &mut self,
        error_type: impl Into<String>,
        message: impl Into<String>,
        source: ErrorSource,
        phase: Option<String>,
        agent: Option<String>,
        task_id: Option<String>,
        severity: Option<ErrorSeverity>,
    ) -> String {
        let error_type = error_type.into();
        let message = message.into();
        let fingerprint = AggregatedError::fingerprint(
            &error_type,
            &message,
            phase.as_deref(),
            agent.as_deref(),
            task_id.as_deref(),
        );

        let now = Utc::now();
        if let Some(existing) = self.errors.get_mut(&fingerprint) {
            existing.occurrence_count += 1;
            existing.last_seen = now;
        } else {
            let severity = severity.unwrap_or_else(|| classify_severity(&error_type, &message));
            self.errors.insert(
                fingerprint.clone(),
                AggregatedError {
                    fingerprint: fingerprint.clone(),
                    error_type,
                    message: message.clone(),
                    source,
                    severity,
                    phase,
                    agent,
                    task_id,
                    occurrence_count: 1,
                    first_seen: now,
                    last_seen: now,
                    resolution: None,
                    resolved_at: None,
                },
            );
            self.prune_if_over_capacity();
        }
        fingerprint
    }

    /// Mark an error resolved; it is excluded from `get_unresolved` afterward
    /// but stays in the map (and so still counts toward capacity) until pruned.
    pub fn resolve_error(&mut self, fingerprint: &str, resolution: impl Into<String>) -> bool {
        if let Some(err) = self.errors.get_mut(fingerprint) {
            err.resolution = Some(resolution.into());
            err.resolved_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    fn prune_if_over_capacity(&mut self) {
        let unresolved_count = self.errors.values().filter(|e| !e.is_resolved()).count();
        if unresolved_count <= self.max_unresolved {
            return;
        }
        let to_prune = ((unresolved_count as f64) * self.prune_percentage).ceil() as usize;
        let mut unresolved_fingerprints: Vec<(String, DateTime<Utc>)> = self
            .errors
            .iter()
            .filter(|(_, e)| !e.is_resolved())
            .map(|(fp, e)| (fp.clone(), e.first_seen))
            .collect();
        unresolved_fingerprints.sort_by_key(|(_, first_seen)| *first_seen);
        for (fp, _) in unresolved_fingerprints.into_iter().take(to_prune) {
            self.errors.remove(&fp);
        }
    }

    /// Unresolved errors, most-severe first, then most-recently-seen first.
    pub fn get_unresolved(&self) -> Vec<&AggregatedError> {
        let mut out: Vec<&AggregatedError> =
            self.errors.values().filter(|e| !e.is_resolved()).collect();
        out.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        out
    }

    pub fn get_all_errors(&self) -> Vec<&AggregatedError> {
        self.errors.values().collect()
    }

    pub fn get_unresolved_by_severity(&self, severity: ErrorSeverity) -> Vec<&AggregatedError> {
        self.get_unresolved()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }

    pub fn summary(&self) -> ErrorSummary {
        let unresolved = self.get_unresolved();
        ErrorSummary {
            total: self.errors.len(),
            unresolved: unresolved.len(),
            critical: unresolved
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Critical)
                .count(),
            errors: unresolved
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Error)
                .count(),
            warnings: unresolved
                .iter()
                .filter(|e| e.severity == ErrorSeverity::Warning)
                .count(),
        }
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total: usize,
    pub unresolved: usize,
    pub critical: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_inputs() {
        let a = AggregatedError::fingerprint(
            "implementation_error",
            "panicked at foo.rs",
            Some("3"),
            Some("claude"),
            Some("t1"),
        );
        let b = AggregatedError::fingerprint(
            "implementation_error",
            "panicked at foo.rs",
            Some("3"),
            Some("claude"),
            Some("t1"),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_truncates_message_to_100_chars() {
        let long_a = "x".repeat(150);
        let long_b = format!("{}{}", "x".repeat(100), "y".repeat(50));
        let fp_a = AggregatedError::fingerprint("t", &long_a, None, None, None);
        let fp_b = AggregatedError::fingerprint("t", &long_b, None, None, None);
        assert_eq!(fp_a, fp_b);
    }

    #[test]
    fn duplicate_errors_merge_into_one_entry_with_bumped_count() {
        let mut agg = ErrorAggregator::new();
        for _ in 0..3 {
            agg.add_error(
                "implementation_error",
                "compile failed",
                ErrorSource::IterativeLoop,
                Some("3".into()),
                Some("claude".into()),
                Some("t1".into()),
                None,
            );
        }
        let unresolved = agg.get_unresolved();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].occurrence_count, 3);
    }

    #[test]
    fn resolved_errors_drop_out_of_unresolved() {
        let mut agg = ErrorAggregator::new();
        let fp = agg.add_error(
            "task_failed",
            "boom",
            ErrorSource::IterativeLoop,
            None,
            None,
            Some("t1".into()),
            None,
        );
        assert_eq!(agg.get_unresolved().len(), 1);
        assert!(agg.resolve_error(&fp, "fixer applied patch"));
        assert_eq!(agg.get_unresolved().len(), 0);
        assert_eq!(agg.get_all_errors().len(), 1);
    }

    #[test]
    fn severity_auto_classification_matches_known_substrings() {
        assert_eq!(
            classify_severity("budget_exceeded_error", "over limit"),
            ErrorSeverity::Critical
        );
        assert_eq!(
            classify_severity("implementation_error", "compile failed"),
            ErrorSeverity::Error
        );
        assert_eq!(
            classify_severity("task_clarification_needed", "which auth?"),
            ErrorSeverity::Warning
        );
    }

    #[test]
    fn capacity_prunes_oldest_quarter_of_unresolved() {
        let mut agg = ErrorAggregator::with_capacity(4, 0.25);
        for i in 0..5 {
            agg.add_error(
                "task_failed",
                format!("distinct message {i}"),
                ErrorSource::IterativeLoop,
                None,
                None,
                Some(format!("t{i}")),
                None,
            );
        }
        // Capacity is 4; inserting a 5th over-capacity item prunes ceil(5*0.25)=2 oldest.
        assert_eq!(agg.get_unresolved().len(), 3);
    }

    #[test]
    fn unresolved_sorts_critical_first_then_newest() {
        let mut agg = ErrorAggregator::new();
        agg.add_error(
            "research_phase_error",
            "warn",
            ErrorSource::Fixer,
            None,
            None,
            None,
            None,
        );
        agg.add_error(
            "budget_exceeded_error",
            "crit",
            ErrorSource::Budget,
            None,
            None,
            None,
            None,
        );
        let unresolved = agg.get_unresolved();
        assert_eq!(unresolved[0].severity, ErrorSeverity::Critical);
    }
}
