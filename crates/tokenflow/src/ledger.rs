// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! The audit ledger — an append-only record of every routing and lifecycle
//! event in one run.
//!
//! Ledger position is authoritative: it defines the total order of the run.
//! Because dispatch is strictly sequential, append order equals true temporal
//! order. The ledger and the [`ExecutionReport`](crate::ExecutionReport) are
//! the only data a telemetry or compliance collaborator may read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::token::TokenId;

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventKind {
    /// A token was placed on the queue.
    TokenEnqueued,
    /// A token was taken off the queue for dispatch.
    TokenDequeued,
    /// A node invocation returned successfully.
    NodeCompleted,
    /// A node invocation returned an error.
    NodeFailed,
    /// A node recorded a custom event through the runtime handle.
    Custom,
    /// A cooperative stop ended the run.
    RunStopped,
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditEventKind::TokenEnqueued => "token-enqueued",
            AuditEventKind::TokenDequeued => "token-dequeued",
            AuditEventKind::NodeCompleted => "node-completed",
            AuditEventKind::NodeFailed => "node-failed",
            AuditEventKind::Custom => "custom",
            AuditEventKind::RunStopped => "run-stopped",
        };
        f.write_str(name)
    }
}

/// Structured record for audit and provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened
    pub kind: AuditEventKind,
    /// When it happened; ledger position remains the authoritative order
    pub timestamp: DateTime<Utc>,
    /// Token the event concerns
    pub token_id: TokenId,
    /// Node the event originated from, where applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Node the event was directed at, where applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl AuditEvent {
    /// Create an event stamped now, with no endpoints or metadata.
    #[must_use]
    pub fn new(kind: AuditEventKind, token_id: TokenId) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            token_id,
            source: None,
            target: None,
            metadata: Map::new(),
        }
    }

    /// Set the originating node.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the target node.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Merge a full metadata map.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// Append-only, totally-ordered event sequence for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLedger {
    events: Vec<AuditEvent>,
}

impl AuditLedger {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. There is no removal or reordering operation.
    pub fn append(&mut self, event: AuditEvent) {
        self.events.push(event);
    }

    /// The full ordered event sequence.
    #[must_use]
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Iterate events in ledger order.
    pub fn iter(&self) -> std::slice::Iter<'_, AuditEvent> {
        self.events.iter()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Event kinds in ledger order, a convenient view for assertions and
    /// coarse-grained consumers.
    #[must_use]
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.iter().map(|event| event.kind).collect()
    }
}

impl<'a> IntoIterator for &'a AuditLedger {
    type Item = &'a AuditEvent;
    type IntoIter = std::slice::Iter<'a, AuditEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
