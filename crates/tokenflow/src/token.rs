// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Tokens — the immutable units of routed data.
//!
//! A token is never mutated after creation; "updating state" means emitting
//! a new token. Ids are assigned from a run-scoped monotonic counter, so
//! within one run they double as the enqueue sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Origin recorded on seed tokens, which have no producing node.
pub const ENTRY: &str = "__entry__";

/// Run-scoped monotonic token identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(u64);

impl TokenId {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The underlying sequence number.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work travelling between nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Token {
    id: TokenId,
    payload: Value,
    origin: String,
    parent_id: Option<TokenId>,
    lineage: Vec<String>,
    created_at: DateTime<Utc>,
}

impl Token {
    pub(crate) fn new(
        id: TokenId,
        payload: Value,
        origin: impl Into<String>,
        parent_id: Option<TokenId>,
        lineage: Vec<String>,
    ) -> Self {
        Self {
            id,
            payload,
            origin: origin.into(),
            parent_id,
            lineage,
            created_at: Utc::now(),
        }
    }

    /// Unique id within the run.
    #[must_use]
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// The routed payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Node that emitted this token, or [`ENTRY`] for seeds.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Token this one was emitted in response to, if any.
    #[must_use]
    pub fn parent_id(&self) -> Option<TokenId> {
        self.parent_id
    }

    /// Ordered node-name path that produced this token. Empty for seeds.
    #[must_use]
    pub fn lineage(&self) -> &[String] {
        &self.lineage
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// A token together with the node it is addressed to.
#[derive(Debug, Clone)]
pub(crate) struct QueuedToken {
    pub(crate) target: String,
    pub(crate) token: Token,
}
