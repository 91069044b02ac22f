// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Node specifications and the invocable capability.
//!
//! A [`NodeSpec`] is the declared interface of a node: name, role, optional
//! schema descriptors and model metadata. Schemas are explicit JSON values
//! supplied at registration time; nothing is inferred from the callable.
//!
//! [`Invocable`] is the single execution capability behind every node.
//! Synchronous and asynchronous nodes share it: a synchronous closure wrapped
//! in [`FnInvocable`] is treated as an already-resolved asynchronous one, and
//! the dispatch loop always awaits full completion before touching the next
//! token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RunContext;
use crate::runtime::RuntimeHandle;

/// Error type node invocables may return.
pub type NodeError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of one node invocation.
pub type NodeResult = std::result::Result<Value, NodeError>;

/// Declared interface of a node.
///
/// Immutable once registered; its canonical form feeds the node id digest.
///
/// # Example
///
/// ```rust
/// use tokenflow::NodeSpec;
///
/// let spec = NodeSpec::new("summarize", "analyzer")
///     .with_input_schema(serde_json::json!({ "document": "string" }))
///     .with_model("gpt-4", "2024-05");
/// assert_eq!(spec.name(), "summarize");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    name: String,
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<String>,
}

impl NodeSpec {
    /// Create a spec with the required name and role.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            input_schema: None,
            output_schema: None,
            model_name: None,
            model_version: None,
        }
    }

    /// Declare the input schema descriptor.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Declare the output schema descriptor.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Record the model backing this node.
    #[must_use]
    pub fn with_model(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self.model_version = Some(version.into());
        self
    }

    /// Node name, the graph-wide unique key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role label.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Declared input schema, if any.
    #[must_use]
    pub fn input_schema(&self) -> Option<&Value> {
        self.input_schema.as_ref()
    }

    /// Declared output schema, if any.
    #[must_use]
    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }

    /// Model name, if declared.
    #[must_use]
    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    /// Model version, if declared.
    #[must_use]
    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    /// Canonical JSON form used for hashing.
    ///
    /// Keys are sorted by the underlying map; absent optional fields are
    /// omitted entirely so a schema-less spec degrades to a smaller document
    /// rather than hashing placeholder nulls.
    pub(crate) fn canonical_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".to_string(), Value::String(self.name.clone()));
        map.insert("role".to_string(), Value::String(self.role.clone()));
        if let Some(schema) = &self.input_schema {
            map.insert("input_schema".to_string(), schema.clone());
        }
        if let Some(schema) = &self.output_schema {
            map.insert("output_schema".to_string(), schema.clone());
        }
        if let Some(name) = &self.model_name {
            map.insert("model_name".to_string(), Value::String(name.clone()));
        }
        if let Some(version) = &self.model_version {
            map.insert("model_version".to_string(), Value::String(version.clone()));
        }
        Value::Object(map)
    }
}

/// The execution capability of a node.
///
/// Implementations receive the token payload, a [`RuntimeHandle`] scoped to
/// this single invocation, and the read-only [`RunContext`]. Returning `Err`
/// is terminal for the run.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use tokenflow::{Invocable, NodeResult, RunContext, RuntimeHandle};
///
/// struct WordCount;
///
/// #[async_trait]
/// impl Invocable for WordCount {
///     async fn invoke(
///         &self,
///         payload: Value,
///         runtime: &mut RuntimeHandle<'_>,
///         _context: &RunContext,
///     ) -> NodeResult {
///         let words = payload["text"].as_str().unwrap_or_default().split_whitespace().count();
///         runtime.emit("report", json!({ "words": words }))?;
///         Ok(json!(words))
///     }
/// }
/// ```
#[async_trait]
pub trait Invocable: Send + Sync {
    /// Execute one token. Awaited to completion before the next dispatch.
    async fn invoke(
        &self,
        payload: Value,
        runtime: &mut RuntimeHandle<'_>,
        context: &RunContext,
    ) -> NodeResult;
}

/// Boxed invocable stored in the graph.
pub type BoxedInvocable = Box<dyn Invocable>;

/// Adapter turning a synchronous closure into an [`Invocable`].
///
/// The closure runs inline on the dispatch loop; from the loop's point of
/// view it is an asynchronous invocable that resolves immediately.
///
/// # Example
///
/// ```rust,ignore
/// use serde_json::{json, Value};
/// use tokenflow::{FnInvocable, NodeResult, RunContext, RuntimeHandle};
///
/// let node = FnInvocable::new(
///     |payload: Value, _runtime: &mut RuntimeHandle<'_>, _context: &RunContext| -> NodeResult {
///         Ok(json!({ "echo": payload }))
///     },
/// );
/// ```
pub struct FnInvocable<F> {
    f: F,
}

impl<F> FnInvocable<F>
where
    F: Fn(Value, &mut RuntimeHandle<'_>, &RunContext) -> NodeResult + Send + Sync,
{
    /// Wrap a synchronous closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Invocable for FnInvocable<F>
where
    F: Fn(Value, &mut RuntimeHandle<'_>, &RunContext) -> NodeResult + Send + Sync,
{
    async fn invoke(
        &self,
        payload: Value,
        runtime: &mut RuntimeHandle<'_>,
        context: &RunContext,
    ) -> NodeResult {
        (self.f)(payload, runtime, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_accessors() {
        let spec = NodeSpec::new("ingest", "parser").with_model("claude", "3");
        assert_eq!(spec.name(), "ingest");
        assert_eq!(spec.role(), "parser");
        assert_eq!(spec.model_name(), Some("claude"));
        assert_eq!(spec.model_version(), Some("3"));
        assert!(spec.input_schema().is_none());
    }

    #[test]
    fn test_canonical_value_omits_absent_fields() {
        let bare = NodeSpec::new("ingest", "parser").canonical_value();
        let object = bare.as_object().map(Map::len);
        assert_eq!(object, Some(2));

        let full = NodeSpec::new("ingest", "parser")
            .with_input_schema(serde_json::json!({"text": "string"}))
            .canonical_value();
        assert!(full.get("input_schema").is_some());
        assert!(full.get("output_schema").is_none());
    }

    #[test]
    fn test_canonical_value_is_stable() {
        let spec = NodeSpec::new("ingest", "parser").with_model("m", "1");
        assert_eq!(
            spec.canonical_value().to_string(),
            spec.canonical_value().to_string()
        );
    }
}
