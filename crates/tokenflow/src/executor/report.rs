// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Execution reports — the immutable snapshot returned by the dispatch loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::context::RunContext;
use crate::ledger::{AuditEventKind, AuditLedger};
use crate::token::TokenId;

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The token queue drained.
    Completed,
    /// A node requested a cooperative stop.
    Stopped,
    /// The run aborted; reports with this status travel inside the error.
    Failed,
}

/// Captures a single node activation.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRun {
    /// Node that fired
    pub node: String,
    /// Token it processed
    pub token_id: TokenId,
    /// Value the invocable returned
    pub result: Value,
    /// When the invocation started
    pub started_at: DateTime<Utc>,
    /// When it returned
    pub finished_at: DateTime<Utc>,
}

/// Immutable snapshot of one run: per-node result history, the full audit
/// ledger, and the run context.
///
/// Owned exclusively by the caller after being returned; the engine retains
/// no reference. Together with the ledger it is the only surface a telemetry
/// or compliance collaborator may read.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    status: RunStatus,
    results: HashMap<String, Vec<NodeRun>>,
    ledger: AuditLedger,
    context: RunContext,
}

impl ExecutionReport {
    pub(crate) fn new(
        status: RunStatus,
        results: HashMap<String, Vec<NodeRun>>,
        ledger: AuditLedger,
        context: RunContext,
    ) -> Self {
        Self {
            status,
            results,
            ledger,
            context,
        }
    }

    /// Terminal state the run reached.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// The run's context.
    #[must_use]
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// The full ordered audit sequence.
    #[must_use]
    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    /// Invocation records for one node, in invocation order.
    ///
    /// A node invoked three times has three entries; a node that never fired
    /// has none.
    #[must_use]
    pub fn records(&self, node: &str) -> &[NodeRun] {
        self.results.get(node).map_or(&[], Vec::as_slice)
    }

    /// Just the returned values for one node, in invocation order.
    #[must_use]
    pub fn node_results(&self, node: &str) -> Vec<&Value> {
        self.records(node).iter().map(|record| &record.result).collect()
    }

    /// Names of nodes that completed at least once, in first-completion order.
    #[must_use]
    pub fn nodes_executed(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.ledger
            .iter()
            .filter(|event| event.kind == AuditEventKind::NodeCompleted)
            .filter_map(|event| event.source.as_deref())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}
