// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The dispatch loop and its surface types.
//!
//! Execution is a small state machine: seeding (`INIT`) places one token per
//! entry node on the queue, the drain cycle (`RUNNING`) dispatches tokens
//! strictly one at a time, and the run ends in exactly one of three ways —
//! `COMPLETED` (queue drained), `STOPPED` (cooperative stop), or `FAILED`
//! (surfaced as an error carrying the partial report).
//!
//! Scheduling is deliberately sequential: never more than one invocation in
//! flight, so ledger append order equals true temporal order and the shared
//! state needs no locking. Separate runs are fully independent and may
//! execute concurrently; all mutable state is run-scoped.

mod execution;
mod report;

pub use report::{ExecutionReport, NodeRun, RunStatus};

use serde_json::{Map, Value};

/// Default ceiling on node invocations per run.
///
/// Cycles are legal, so some bound is required; there is no wall-clock
/// timeout at this layer.
pub const DEFAULT_MAX_STEPS: u64 = 1000;

/// Per-run execution options.
///
/// # Example
///
/// ```rust
/// use tokenflow::RunOptions;
///
/// let options = RunOptions::new("prod-eu")
///     .with_max_steps(50)
///     .with_invoked_by("nightly-batch")
///     .with_extra("trigger", serde_json::json!("cron"));
/// assert_eq!(options.max_steps(), 50);
/// ```
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub(crate) deployment_id: String,
    pub(crate) entry_nodes: Option<Vec<String>>,
    pub(crate) max_steps: u64,
    pub(crate) invoked_by: Option<String>,
    pub(crate) extras: Map<String, Value>,
}

impl RunOptions {
    /// Options for a run under the given deployment id.
    pub fn new(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            entry_nodes: None,
            max_steps: DEFAULT_MAX_STEPS,
            invoked_by: None,
            extras: Map::new(),
        }
    }

    /// Seed these nodes instead of the graph's default entry set.
    #[must_use]
    pub fn with_entry_nodes(
        mut self,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entry_nodes = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    /// Cap the number of node invocations for this run.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Record who or what started this run.
    #[must_use]
    pub fn with_invoked_by(mut self, invoked_by: impl Into<String>) -> Self {
        self.invoked_by = Some(invoked_by.into());
        self
    }

    /// Attach one extra context entry, readable by every node.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// The deployment id this run executes under.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Caller-specified entry override, if any.
    #[must_use]
    pub fn entry_nodes(&self) -> Option<&[String]> {
        self.entry_nodes.as_deref()
    }

    /// The invocation ceiling.
    #[must_use]
    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Caller identity, if supplied.
    #[must_use]
    pub fn invoked_by(&self) -> Option<&str> {
        self.invoked_by.as_deref()
    }
}
