// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Deterministic identity digests for nodes and graph topologies.
//!
//! Node ids and logic ids are SHA-256 digests over canonical JSON. Composite
//! inputs are sorted before hashing, so two structurally identical graphs
//! built in different registration orders yield identical identifiers.
//! Telemetry and caching collaborators rely on these digests being stable
//! across process restarts; nothing here performs I/O or uses randomness.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest as _, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::node::NodeSpec;

/// A SHA-256 identity digest.
///
/// Used for node ids and logic ids. Exposed to collaborators as a
/// hex-encoded string; `Display` adds a `sha256:` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    /// Hash raw bytes into a digest.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Parse a digest from a hex string, with or without the `sha256:` prefix.
    pub fn from_hex(s: &str) -> Result<Self> {
        let hex_str = s.strip_prefix("sha256:").unwrap_or(s);

        if hex_str.len() != 64 {
            return Err(Error::InvalidDigest(format!(
                "expected 64 hex characters, got {}",
                hex_str.len()
            )));
        }

        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::InvalidDigest(format!("invalid hex: {e}")))?;

        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| Error::InvalidDigest(format!("expected 32 bytes, got {}", v.len())))?;

        Ok(Self(array))
    }

    /// The raw 32-byte digest.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded digest without prefix — the wire form of node and logic ids.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl std::str::FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// Compute a node's identity digest.
///
/// Hashes the organization namespace together with the canonical JSON form
/// of the spec (sorted keys, absent optional fields omitted). A spec without
/// declared schemas simply hashes without them; omission is a documented
/// fallback, not an error.
#[must_use]
pub fn node_id(org_namespace: &str, spec: &NodeSpec) -> Digest {
    let canonical = spec.canonical_value().to_string();
    let to_hash = format!("{org_namespace} {canonical}");
    Digest::from_bytes(to_hash.trim().as_bytes())
}

/// Compute a graph's logic id.
///
/// Hashes the agent-class descriptor, the sorted set of node ids, and the
/// sorted set of edges expressed as (source id, target id) pairs. Sorting
/// happens here so callers never have to care about registration order.
#[must_use]
pub fn logic_id(
    name: &str,
    version: &str,
    description: &str,
    node_ids: &[Digest],
    edges: &[(Digest, Digest)],
) -> Digest {
    let mut nodes: Vec<String> = node_ids.iter().map(Digest::to_hex).collect();
    nodes.sort_unstable();

    let mut topology: Vec<(String, String)> = edges
        .iter()
        .map(|(source, target)| (source.to_hex(), target.to_hex()))
        .collect();
    topology.sort_unstable();

    let mut root = Map::new();
    root.insert(
        "agent_class".to_string(),
        json!({ "name": name, "version": version, "description": description }),
    );
    root.insert("nodes".to_string(), json!(nodes));
    root.insert(
        "topology".to_string(),
        Value::Array(
            topology
                .into_iter()
                .map(|(source, target)| json!({ "source": source, "target": target }))
                .collect(),
        ),
    );

    Digest::from_bytes(Value::Object(root).to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn spec() -> NodeSpec {
        NodeSpec::new("ingest", "parser")
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = Digest::from_bytes(b"hello world");
        assert_eq!(
            digest.to_string(),
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(Digest::from_hex(&digest.to_hex()).unwrap(), digest);
        assert_eq!(digest.to_string().parse::<Digest>().unwrap(), digest);
    }

    #[test]
    fn test_digest_rejects_malformed_hex() {
        assert!(Digest::from_hex("not-valid-hex").is_err());
        assert!(Digest::from_hex("sha256:abc").is_err());
    }

    #[test]
    fn test_node_id_is_deterministic() {
        assert_eq!(node_id("acme", &spec()), node_id("acme", &spec()));
    }

    #[test]
    fn test_node_id_covers_every_field() {
        let base = node_id("acme", &spec());
        assert_ne!(base, node_id("other-org", &spec()));
        assert_ne!(base, node_id("acme", &NodeSpec::new("ingest", "analyzer")));
        assert_ne!(
            base,
            node_id(
                "acme",
                &spec().with_input_schema(serde_json::json!({"document": "string"}))
            )
        );
        assert_ne!(base, node_id("acme", &spec().with_model("gpt-4", "2024-05")));
    }

    #[test]
    fn test_missing_schema_degrades_to_omission() {
        // A schema-less spec hashes fine; it just hashes without those keys.
        let without = node_id("", &spec());
        let with = node_id("", &spec().with_output_schema(serde_json::json!({})));
        assert_ne!(without, with);
    }

    #[test]
    fn test_logic_id_ignores_registration_order() {
        let a = node_id("", &NodeSpec::new("a", "start"));
        let b = node_id("", &NodeSpec::new("b", "end"));

        let forward = logic_id("Agent", "1.0.0", "", &[a, b], &[(a, b)]);
        let reversed = logic_id("Agent", "1.0.0", "", &[b, a], &[(a, b)]);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn test_logic_id_tracks_structure() {
        let a = node_id("", &NodeSpec::new("a", "start"));
        let b = node_id("", &NodeSpec::new("b", "end"));

        let base = logic_id("Agent", "1.0.0", "", &[a, b], &[(a, b)]);
        assert_ne!(base, logic_id("Agent", "1.0.1", "", &[a, b], &[(a, b)]));
        assert_ne!(base, logic_id("Agent", "1.0.0", "", &[a, b], &[(b, a)]));
        assert_ne!(base, logic_id("Agent", "1.0.0", "", &[a], &[]));
    }
}
