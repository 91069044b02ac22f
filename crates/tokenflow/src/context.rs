// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Run context — read-only identifiers and metadata scoped to one execution.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identity::Digest;

/// Identifiers and caller-supplied metadata for one run.
///
/// Created once per execution and handed read-only to every node invocation.
/// The run id is freshly generated; everything else is derived from the
/// compiled workload and the caller's [`RunOptions`](crate::RunOptions).
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    workload_id: String,
    logic_id: Digest,
    run_id: String,
    deployment_id: String,
    org_namespace: String,
    workload_name: String,
    workload_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    invoked_by: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    extras: Map<String, Value>,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        workload_id: String,
        logic_id: Digest,
        deployment_id: String,
        org_namespace: String,
        workload_name: String,
        workload_version: String,
        invoked_by: Option<String>,
        extras: Map<String, Value>,
    ) -> Self {
        Self {
            workload_id,
            logic_id,
            run_id: Uuid::new_v4().to_string(),
            deployment_id,
            org_namespace,
            workload_name,
            workload_version,
            invoked_by,
            extras,
        }
    }

    /// Stable identifier of the workload class (`slug:version`).
    #[must_use]
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    /// Structural digest of the executing graph.
    #[must_use]
    pub fn logic_id(&self) -> Digest {
        self.logic_id
    }

    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Caller-supplied deployment identifier.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Organization scope the workload runs under.
    #[must_use]
    pub fn org_namespace(&self) -> &str {
        &self.org_namespace
    }

    /// Workload name as registered.
    #[must_use]
    pub fn workload_name(&self) -> &str {
        &self.workload_name
    }

    /// Workload version as registered.
    #[must_use]
    pub fn workload_version(&self) -> &str {
        &self.workload_version
    }

    /// Caller identity, if supplied.
    #[must_use]
    pub fn invoked_by(&self) -> Option<&str> {
        self.invoked_by.as_deref()
    }

    /// Caller-supplied extra metadata.
    #[must_use]
    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    /// Look up one extra by key.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RunContext {
        RunContext::new(
            "doc-agent:1.0.0".to_string(),
            Digest::from_bytes(b"logic"),
            "dev".to_string(),
            "acme".to_string(),
            "DocAgent".to_string(),
            "1.0.0".to_string(),
            Some("ci".to_string()),
            Map::new(),
        )
    }

    #[test]
    fn test_context_accessors() {
        let ctx = context();
        assert_eq!(ctx.workload_id(), "doc-agent:1.0.0");
        assert_eq!(ctx.deployment_id(), "dev");
        assert_eq!(ctx.invoked_by(), Some("ci"));
        assert!(ctx.extra("missing").is_none());
    }

    #[test]
    fn test_run_ids_are_unique_per_context() {
        assert_ne!(context().run_id(), context().run_id());
    }
}
