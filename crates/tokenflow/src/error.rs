// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for TokenFlow
//!
//! Registration errors fail fast during graph construction; no partially
//! built graph is usable. Runtime errors abort the run but carry the
//! [`ExecutionReport`] accumulated up to the failure point, so the audit
//! ledger is never lost — use [`Error::partial_report`] to retrieve it.

use thiserror::Error;

use crate::executor::ExecutionReport;
use crate::ledger::AuditLedger;
use crate::node::NodeError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by graph registration and execution.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A node with this name is already registered.
    #[error("node '{0}' is already registered")]
    DuplicateNode(String),

    /// An edge references a name that is not a registered node.
    #[error("edge endpoint '{name}' is not a registered node")]
    UnknownEndpoint {
        /// The unregistered endpoint name
        name: String,
    },

    /// The graph has no nodes and cannot be compiled.
    #[error("workload has no registered nodes")]
    EmptyWorkload,

    /// A digest string could not be parsed.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// `deployment_id` was empty when starting a run.
    #[error("deployment id must not be empty")]
    MissingDeploymentId,

    /// A caller-specified entry node is not registered.
    ///
    /// Raised before any token is seeded, so there is no partial report.
    #[error("entry node '{name}' is not registered")]
    InvalidEntryNode {
        /// The unregistered entry name
        name: String,
    },

    /// A node emitted to a target with no declared edge from it.
    #[error("no route from '{origin}' to '{target}' is registered")]
    UnknownRoute {
        /// Node that attempted the emission
        origin: String,
        /// Requested target node
        target: String,
        /// Report accumulated up to the failure, status `Failed`
        report: Box<ExecutionReport>,
    },

    /// The step ceiling was reached before the token queue drained.
    ///
    /// Cycles are legal; this is the only built-in bound on them. The
    /// report preserves every invocation that completed before the limit.
    #[error("step limit of {limit} reached before the token queue drained")]
    StepLimitExceeded {
        /// The configured ceiling
        limit: u64,
        /// Report accumulated up to the failure, status `Failed`
        report: Box<ExecutionReport>,
    },

    /// A node invocable returned an error.
    #[error("node '{node}' failed")]
    NodeFailure {
        /// Name of the failed node
        node: String,
        /// The error the invocable returned
        #[source]
        source: NodeError,
        /// Report accumulated up to the failure, status `Failed`
        report: Box<ExecutionReport>,
    },

    /// The current-thread runtime backing `execute_blocking` failed to start.
    #[error("failed to initialize the blocking runtime: {0}")]
    BlockingRuntime(#[source] std::io::Error),
}

impl Error {
    /// Report accumulated before a runtime failure, if one was captured.
    ///
    /// Present for [`Error::UnknownRoute`], [`Error::StepLimitExceeded`] and
    /// [`Error::NodeFailure`]; `None` for registration-time errors.
    #[must_use]
    pub fn partial_report(&self) -> Option<&ExecutionReport> {
        match self {
            Error::UnknownRoute { report, .. }
            | Error::StepLimitExceeded { report, .. }
            | Error::NodeFailure { report, .. } => Some(report),
            _ => None,
        }
    }

    /// The audit ledger accumulated before a runtime failure.
    #[must_use]
    pub fn ledger(&self) -> Option<&AuditLedger> {
        self.partial_report().map(ExecutionReport::ledger)
    }
}
