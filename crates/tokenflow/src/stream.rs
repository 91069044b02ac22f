// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Streaming execution events.
//!
//! [`CompiledWorkload::stream`](crate::CompiledWorkload::stream) yields a
//! [`RunEvent`] per audit-ledger append, in ledger order, followed by a
//! terminal [`RunEvent::Finished`] carrying the report. A telemetry bridge
//! can consume live progress this way without ever reaching into engine
//! internals.

use serde::Serialize;

use crate::executor::ExecutionReport;
use crate::ledger::{AuditEvent, AuditEventKind};

/// Event yielded during streaming execution.
#[derive(Debug, Clone, Serialize)]
pub enum RunEvent {
    /// An audit event, yielded as it is appended to the ledger.
    Audit(AuditEvent),
    /// The run reached a non-error terminal state; always the final item.
    Finished(Box<ExecutionReport>),
}

impl RunEvent {
    /// Kind of the underlying audit event, `None` for [`RunEvent::Finished`].
    #[must_use]
    pub fn kind(&self) -> Option<AuditEventKind> {
        match self {
            RunEvent::Audit(event) => Some(event.kind),
            RunEvent::Finished(_) => None,
        }
    }

    /// The underlying audit event, if any.
    #[must_use]
    pub fn audit(&self) -> Option<&AuditEvent> {
        match self {
            RunEvent::Audit(event) => Some(event),
            RunEvent::Finished(_) => None,
        }
    }

    /// True for the terminal report event.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, RunEvent::Finished(_))
    }
}
