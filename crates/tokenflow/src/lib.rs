// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! # TokenFlow
//!
//! A token-passing execution engine for directed, possibly cyclic,
//! computation graphs — with a deterministic identity subsystem and a
//! complete, replayable audit trail.
//!
//! Nodes are registered into a [`WorkloadGraph`] with declared edges, then
//! frozen by [`WorkloadGraph::compile`] into a [`CompiledWorkload`].
//! Execution seeds one token per entry node and drains the queue strictly
//! sequentially: one invocation in flight, FIFO order, every routing and
//! lifecycle event appended to an [`AuditLedger`] whose position defines the
//! total order of the run. Nodes interact with the run only through the
//! [`RuntimeHandle`] — emitting tokens along declared edges, recording
//! custom events, touching the shared [`RunState`], or requesting a
//! cooperative stop.
//!
//! Graph structure hashes to stable identifiers: a [`Digest`] per node and a
//! logic id per graph, independent of registration order. Telemetry and
//! caching collaborators key on these across process restarts.
//!
//! ## Example
//!
//! ```rust,ignore
//! use serde_json::{json, Value};
//! use tokenflow::{NodeSpec, NodeResult, RunContext, RunOptions, RuntimeHandle, WorkloadGraph};
//!
//! fn ingest(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
//!     let lines = payload["document"].as_str().unwrap_or_default().lines().count();
//!     runtime.emit("summarize", json!({ "line_count": lines }))?;
//!     Ok(json!(lines))
//! }
//!
//! fn summarize(payload: Value, _runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
//!     Ok(payload)
//! }
//!
//! let mut graph = WorkloadGraph::new("DocAgent", "1.0.0");
//! graph.add_node_fn(NodeSpec::new("ingest", "parser"), ingest)?;
//! graph.add_node_fn(NodeSpec::new("summarize", "analyzer"), summarize)?;
//! graph.add_edge("ingest", "summarize")?;
//!
//! let app = graph.compile()?;
//! let report = app.execute(json!({"document": "L1\nL2"}), RunOptions::new("dev")).await?;
//! assert_eq!(report.node_results("summarize"), vec![&json!({"line_count": 2})]);
//! # Ok::<(), tokenflow::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! - **Determinism**: identical graph structure yields identical node and
//!   logic ids, regardless of registration order.
//! - **Audit-first**: runtime failures carry the report accumulated so far;
//!   audit data is never discarded.
//! - **Bounded cycles**: self-edges and feedback loops are legal; the step
//!   ceiling ([`DEFAULT_MAX_STEPS`]) is the only built-in bound.
//! - **Sequential dispatch**: ledger append order equals temporal order;
//!   shared state needs no locks. Separate runs are fully independent.

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod identity;
pub mod ledger;
pub mod node;
pub mod runtime;
pub mod state;
pub mod stream;
pub mod token;

pub use context::RunContext;
pub use error::{Error, Result};
pub use executor::{ExecutionReport, NodeRun, RunOptions, RunStatus, DEFAULT_MAX_STEPS};
pub use graph::{CompiledWorkload, WorkloadGraph, WorkloadMetadata};
pub use identity::Digest;
pub use ledger::{AuditEvent, AuditEventKind, AuditLedger};
pub use node::{BoxedInvocable, FnInvocable, Invocable, NodeError, NodeResult, NodeSpec};
pub use runtime::{RouteError, RuntimeHandle};
pub use state::RunState;
pub use stream::RunEvent;
pub use token::{Token, TokenId, ENTRY};
