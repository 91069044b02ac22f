// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Graph registration and compilation.
//!
//! A [`WorkloadGraph`] is the mutable registry: nodes and edges are added
//! during construction and validated immediately. [`compile`](WorkloadGraph::compile)
//! freezes the structure into a [`CompiledWorkload`], the only type that can
//! execute — registration after execution starts is therefore not
//! expressible, rather than merely rejected.

use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::identity::{self, Digest};
use crate::node::{BoxedInvocable, FnInvocable, Invocable, NodeResult, NodeSpec};
use crate::runtime::RuntimeHandle;

/// Agent-class descriptor: the human-facing identity of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadMetadata {
    name: String,
    version: String,
    description: String,
    tags: Vec<String>,
}

impl WorkloadMetadata {
    /// Workload name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workload version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Free-form description; part of the logic id input.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Classification tags. Not part of any identity digest.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

struct NodeEntry {
    spec: NodeSpec,
    invocable: BoxedInvocable,
}

/// Mutable node/edge registry for one workload graph.
///
/// # Example
///
/// ```rust,ignore
/// use serde_json::{json, Value};
/// use tokenflow::{NodeSpec, NodeResult, RunContext, RunOptions, RuntimeHandle, WorkloadGraph};
///
/// fn ingest(payload: Value, runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
///     runtime.emit("count", payload.clone())?;
///     Ok(payload)
/// }
///
/// fn count(payload: Value, _runtime: &mut RuntimeHandle<'_>, _ctx: &RunContext) -> NodeResult {
///     Ok(json!(payload["text"].as_str().unwrap_or_default().split_whitespace().count()))
/// }
///
/// let mut graph = WorkloadGraph::new("DocAgent", "1.0.0");
/// graph.add_node_fn(NodeSpec::new("ingest", "parser"), ingest)?;
/// graph.add_node_fn(NodeSpec::new("count", "analyzer"), count)?;
/// graph.add_edge("ingest", "count")?;
///
/// let app = graph.compile()?;
/// let report = app.execute(json!({"text": "hello world"}), RunOptions::new("dev")).await?;
/// # Ok::<(), tokenflow::Error>(())
/// ```
pub struct WorkloadGraph {
    metadata: WorkloadMetadata,
    org_namespace: Option<String>,
    entry_override: Option<Vec<String>>,
    nodes: HashMap<String, NodeEntry>,
    order: Vec<String>,
    edges: BTreeSet<(String, String)>,
    predecessors: HashMap<String, HashSet<String>>,
    successors: HashMap<String, HashSet<String>>,
}

impl WorkloadGraph {
    /// Create an empty graph for the named workload class.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            metadata: WorkloadMetadata {
                name: name.into(),
                version: version.into(),
                description: String::new(),
                tags: Vec::new(),
            },
            org_namespace: None,
            entry_override: None,
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: BTreeSet::new(),
            predecessors: HashMap::new(),
            successors: HashMap::new(),
        }
    }

    /// Set the workload description. Feeds the logic id.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Attach classification tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.metadata.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the organization namespace the node ids are scoped to.
    ///
    /// When unset, the `ORG_NAMESPACE` environment variable is used, else the
    /// namespace is empty. Set this before registering nodes so every id is
    /// computed against the same scope.
    #[must_use]
    pub fn with_org_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.org_namespace = Some(namespace.into());
        self
    }

    /// Override the default seeding set for every run of this graph.
    ///
    /// Validated at [`compile`](Self::compile). Callers can still override
    /// per run through [`RunOptions`](crate::RunOptions).
    #[must_use]
    pub fn with_entry_nodes(
        mut self,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.entry_override = Some(entries.into_iter().map(Into::into).collect());
        self
    }

    /// Register a node. Returns its identity digest.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateNode`] when the name is already registered.
    pub fn add_node(
        &mut self,
        spec: NodeSpec,
        invocable: impl Invocable + 'static,
    ) -> Result<Digest> {
        let name = spec.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(Error::DuplicateNode(name));
        }

        let id = identity::node_id(&self.effective_org_namespace(), &spec);
        tracing::debug!(node = name.as_str(), node_id = %id, "node registered");

        self.nodes.insert(
            name.clone(),
            NodeEntry {
                spec,
                invocable: Box::new(invocable),
            },
        );
        self.order.push(name.clone());
        self.predecessors.entry(name.clone()).or_default();
        self.successors.entry(name).or_default();
        Ok(id)
    }

    /// Register a synchronous closure as a node.
    pub fn add_node_fn<F>(&mut self, spec: NodeSpec, f: F) -> Result<Digest>
    where
        F: Fn(Value, &mut RuntimeHandle<'_>, &RunContext) -> NodeResult + Send + Sync + 'static,
    {
        self.add_node(spec, FnInvocable::new(f))
    }

    /// Declare a permissible route from `source` to `target`.
    ///
    /// Self-edges are permitted; they are what makes loops expressible.
    /// Re-declaring an existing edge is a no-op — edges form a set.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownEndpoint`] when either name is unregistered.
    pub fn add_edge(&mut self, source: &str, target: &str) -> Result<()> {
        for name in [source, target] {
            if !self.nodes.contains_key(name) {
                return Err(Error::UnknownEndpoint {
                    name: name.to_string(),
                });
            }
        }

        if !self.edges.insert((source.to_string(), target.to_string())) {
            return Ok(());
        }
        self.successors
            .entry(source.to_string())
            .or_default()
            .insert(target.to_string());
        self.predecessors
            .entry(target.to_string())
            .or_default()
            .insert(source.to_string());
        Ok(())
    }

    /// Nodes with zero incoming edges, in registration order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.predecessors.get(*name).map_or(true, HashSet::is_empty))
            .cloned()
            .collect()
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of declared edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Stable identifier of the workload class (`slug:version`).
    #[must_use]
    pub fn workload_id(&self) -> String {
        let slug = self.metadata.name.trim().to_lowercase().replace(' ', "-");
        format!("{slug}:{}", self.metadata.version)
    }

    /// Identity digest of one registered node.
    #[must_use]
    pub fn node_id(&self, name: &str) -> Option<Digest> {
        let entry = self.nodes.get(name)?;
        Some(identity::node_id(&self.effective_org_namespace(), &entry.spec))
    }

    /// Structural digest of the graph as currently registered.
    ///
    /// Independent of registration order; recomputing after any node or edge
    /// change yields a different value.
    #[must_use]
    pub fn logic_id(&self) -> Digest {
        let org = self.effective_org_namespace();
        let ids: HashMap<&str, Digest> = self
            .nodes
            .iter()
            .map(|(name, entry)| (name.as_str(), identity::node_id(&org, &entry.spec)))
            .collect();

        let node_ids: Vec<Digest> = ids.values().copied().collect();
        let edges: Vec<(Digest, Digest)> = self
            .edges
            .iter()
            .filter_map(|(source, target)| {
                Some((*ids.get(source.as_str())?, *ids.get(target.as_str())?))
            })
            .collect();

        identity::logic_id(
            &self.metadata.name,
            &self.metadata.version,
            &self.metadata.description,
            &node_ids,
            &edges,
        )
    }

    /// Freeze the graph into an executable [`CompiledWorkload`].
    ///
    /// Resolves the organization namespace, caches every identity digest,
    /// validates the entry override, and computes the default seeding set.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyWorkload`] when no nodes were registered
    /// - [`Error::InvalidEntryNode`] when an entry override names an
    ///   unregistered node
    pub fn compile(self) -> Result<CompiledWorkload> {
        if self.nodes.is_empty() {
            return Err(Error::EmptyWorkload);
        }

        if let Some(entries) = &self.entry_override {
            for name in entries {
                if !self.nodes.contains_key(name) {
                    return Err(Error::InvalidEntryNode { name: name.clone() });
                }
            }
        }

        let logic_id = self.logic_id();
        let workload_id = self.workload_id();
        let org_namespace = self.effective_org_namespace();
        let node_ids: HashMap<String, Digest> = self
            .nodes
            .iter()
            .map(|(name, entry)| {
                (
                    name.clone(),
                    identity::node_id(&org_namespace, &entry.spec),
                )
            })
            .collect();

        // Default seeding set: explicit override, else inferred entries,
        // else every node (a wholly cyclic graph has no entry candidates).
        let inferred = self.entry_nodes();
        let default_entries = match self.entry_override {
            Some(entries) => entries,
            None if inferred.is_empty() => self.order.clone(),
            None => inferred,
        };

        tracing::debug!(
            workload = workload_id.as_str(),
            logic_id = %logic_id,
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "workload compiled"
        );

        Ok(CompiledWorkload {
            metadata: self.metadata,
            org_namespace,
            workload_id,
            logic_id,
            node_ids,
            nodes: self.nodes,
            order: self.order,
            edges: self.edges,
            successors: self.successors,
            predecessors: self.predecessors,
            default_entries,
        })
    }

    fn effective_org_namespace(&self) -> String {
        match &self.org_namespace {
            Some(ns) => ns.clone(),
            None => std::env::var("ORG_NAMESPACE").unwrap_or_default(),
        }
    }
}

/// An immutable, executable workload graph.
///
/// Produced by [`WorkloadGraph::compile`]. Structure and identifiers are
/// frozen; execution entry points live in the `executor` module
/// ([`execute`](CompiledWorkload::execute), [`stream`](CompiledWorkload::stream)).
pub struct CompiledWorkload {
    pub(crate) metadata: WorkloadMetadata,
    pub(crate) org_namespace: String,
    pub(crate) workload_id: String,
    pub(crate) logic_id: Digest,
    pub(crate) node_ids: HashMap<String, Digest>,
    pub(crate) nodes: HashMap<String, NodeEntry>,
    pub(crate) order: Vec<String>,
    pub(crate) edges: BTreeSet<(String, String)>,
    pub(crate) successors: HashMap<String, HashSet<String>>,
    predecessors: HashMap<String, HashSet<String>>,
    pub(crate) default_entries: Vec<String>,
}

impl CompiledWorkload {
    /// Agent-class descriptor.
    #[must_use]
    pub fn metadata(&self) -> &WorkloadMetadata {
        &self.metadata
    }

    /// Resolved organization namespace.
    #[must_use]
    pub fn org_namespace(&self) -> &str {
        &self.org_namespace
    }

    /// Stable identifier of the workload class (`slug:version`).
    #[must_use]
    pub fn workload_id(&self) -> &str {
        &self.workload_id
    }

    /// Structural digest of the graph.
    #[must_use]
    pub fn logic_id(&self) -> Digest {
        self.logic_id
    }

    /// Identity digest of one node.
    #[must_use]
    pub fn node_id(&self, name: &str) -> Option<Digest> {
        self.node_ids.get(name).copied()
    }

    /// Registered node names in registration order.
    #[must_use]
    pub fn node_names(&self) -> &[String] {
        &self.order
    }

    /// Declared spec of one node.
    #[must_use]
    pub fn spec(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.get(name).map(|entry| &entry.spec)
    }

    /// Nodes with zero incoming edges, in registration order.
    #[must_use]
    pub fn entry_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.predecessors.get(*name).map_or(true, HashSet::is_empty))
            .cloned()
            .collect()
    }

    pub(crate) fn allows_route(&self, source: &str, target: &str) -> bool {
        self.successors
            .get(source)
            .is_some_and(|targets| targets.contains(target))
    }

    pub(crate) fn invocable(&self, name: &str) -> Option<&BoxedInvocable> {
        self.nodes.get(name).map(|entry| &entry.invocable)
    }
}
