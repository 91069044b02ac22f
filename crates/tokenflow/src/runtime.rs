// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The runtime handle exposed to an executing node.
//!
//! A handle lives for exactly one invocation. Through it a node can emit
//! tokens along declared edges, record custom audit events, read and write
//! the shared run state, and request a cooperative stop. Emissions are
//! validated immediately but enqueued after the invocation completes, so a
//! node's routing effects land in the ledger only once its completion event
//! has been recorded.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::graph::CompiledWorkload;
use crate::ledger::{AuditEvent, AuditEventKind, AuditLedger};
use crate::state::RunState;
use crate::token::{Token, TokenId};

/// A node emitted to a target with no declared edge from it.
///
/// Propagating this out of an invocable (the `?` operator boxes it into a
/// [`NodeError`](crate::NodeError)) fails the run with
/// [`Error::UnknownRoute`](crate::Error::UnknownRoute).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route from '{origin}' to '{target}' is registered")]
pub struct RouteError {
    /// Node that attempted the emission
    pub origin: String,
    /// Requested target node
    pub target: String,
}

/// Emission validated during an invocation, enqueued after it completes.
#[derive(Debug)]
pub(crate) struct PendingEmission {
    pub(crate) token: Token,
    pub(crate) target: String,
    pub(crate) metadata: Map<String, Value>,
}

/// Per-invocation view of the run handed to an executing node.
pub struct RuntimeHandle<'run> {
    workload: &'run CompiledWorkload,
    node: &'run str,
    token: &'run Token,
    ledger: &'run mut AuditLedger,
    state: &'run mut RunState,
    next_token_id: &'run mut u64,
    stop_requested: &'run mut bool,
    pending: Vec<PendingEmission>,
}

impl<'run> RuntimeHandle<'run> {
    pub(crate) fn new(
        workload: &'run CompiledWorkload,
        node: &'run str,
        token: &'run Token,
        ledger: &'run mut AuditLedger,
        state: &'run mut RunState,
        next_token_id: &'run mut u64,
        stop_requested: &'run mut bool,
    ) -> Self {
        Self {
            workload,
            node,
            token,
            ledger,
            state,
            next_token_id,
            stop_requested,
            pending: Vec::new(),
        }
    }

    /// Name of the node currently executing.
    #[must_use]
    pub fn node(&self) -> &str {
        self.node
    }

    /// The token being processed.
    #[must_use]
    pub fn token(&self) -> &Token {
        self.token
    }

    /// Read access to the shared run state.
    #[must_use]
    pub fn state(&self) -> &RunState {
        self.state
    }

    /// Write access to the shared run state. Last write wins; there is never
    /// another invocation in flight to race with.
    pub fn state_mut(&mut self) -> &mut RunState {
        self.state
    }

    /// Emit a token to `target` along a declared edge.
    ///
    /// The edge is validated now; the token is enqueued (and its
    /// `token-enqueued` event recorded) once this invocation returns
    /// successfully. Returns the id the new token was assigned.
    pub fn emit(&mut self, target: &str, payload: Value) -> Result<TokenId, RouteError> {
        self.emit_with_metadata(target, payload, Map::new())
    }

    /// Like [`emit`](Self::emit), with extra metadata merged into the
    /// `token-enqueued` audit event.
    pub fn emit_with_metadata(
        &mut self,
        target: &str,
        payload: Value,
        metadata: Map<String, Value>,
    ) -> Result<TokenId, RouteError> {
        if !self.workload.allows_route(self.node, target) {
            return Err(RouteError {
                origin: self.node.to_string(),
                target: target.to_string(),
            });
        }

        let id = TokenId::new(*self.next_token_id);
        *self.next_token_id += 1;

        let mut lineage = self.token.lineage().to_vec();
        lineage.push(self.node.to_string());

        let token = Token::new(id, payload, self.node, Some(self.token.id()), lineage);
        tracing::debug!(
            source = self.node,
            target,
            token_id = %id,
            "token emitted"
        );
        self.pending.push(PendingEmission {
            token,
            target: target.to_string(),
            metadata,
        });
        Ok(id)
    }

    /// Record a custom audit event tagged to the current node and token.
    ///
    /// Never fails validation; the event is appended to the ledger
    /// immediately, ahead of this invocation's completion event.
    pub fn record_event(&mut self, label: impl Into<String>, metadata: Map<String, Value>) {
        let event = AuditEvent::new(AuditEventKind::Custom, self.token.id())
            .with_source(self.node)
            .with_meta("event", Value::String(label.into()))
            .with_metadata(metadata);
        self.ledger.append(event);
    }

    /// Request a cooperative stop.
    ///
    /// Takes effect between dispatch cycles; the current invocation always
    /// runs to completion. Tokens still queued when the stop is honored are
    /// discarded and counted in the `run-stopped` event.
    pub fn stop(&mut self) {
        tracing::debug!(node = self.node, "stop requested");
        *self.stop_requested = true;
    }

    /// Whether a stop has been requested during this run.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        *self.stop_requested
    }

    /// Number of tokens emitted so far in this invocation.
    #[must_use]
    pub fn emissions(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingEmission> {
        std::mem::take(&mut self.pending)
    }
}
