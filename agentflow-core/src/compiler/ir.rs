//! Runtime-facing graph vocabulary.
//!
//! The lowered graph keeps the same shape as the authoring graph (entry plus
//! id-keyed node/edge collections) but collapses node kinds to the three the
//! runtime executes, with every implied edge materialized.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::authoring::FallbackDto;

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

/// Node persistence mode. A total two-way partition of the authoring
/// `backend` field: no third state exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceMode {
    Ephemeral,
    Persistent,
}

impl PersistenceMode {
    /// `"memory"`, `""`, absent, and `"ephemeral"` are ephemeral; every
    /// other value is persistent. Case-sensitive.
    pub fn from_backend(raw: Option<&str>) -> Self {
        match raw {
            None | Some("") | Some("memory") | Some("ephemeral") => PersistenceMode::Ephemeral,
            Some(_) => PersistenceMode::Persistent,
        }
    }
}

impl Default for PersistenceMode {
    fn default() -> Self {
        PersistenceMode::Ephemeral
    }
}

// ── Nodes ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IRNodeKind {
    /// Executable step. Kind-specific configuration rides as one opaque
    /// sub-object the runtime interprets.
    Worker {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        config: Value,
    },
    /// Human gate.
    Human {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    /// Routing/ensemble logic.
    Logic {
        #[serde(default, skip_serializing_if = "Value::is_null")]
        config: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRNode {
    pub id: String,
    #[serde(flatten)]
    pub kind: IRNodeKind,
    #[serde(default)]
    pub mode: PersistenceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_fail: Option<FallbackDto>,
}

// ── Edges ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IREdge {
    pub from: String,
    pub to: String,
    /// Routing key for edges materialized from declared branches. Derived
    /// from the source id and branch order, stable across compilations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ── Graph ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IRGraph {
    pub entry: String,
    pub nodes: Vec<IRNode>,
    pub edges: Vec<IREdge>,
}

impl IRGraph {
    /// Node lookup by id.
    pub fn node(&self, id: &str) -> Option<&IRNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Outgoing edges of a node, in materialization order.
    pub fn outgoing(&self, id: &str) -> Vec<&IREdge> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Deterministic JSON: clone, sort nodes by id, sort edges by
    /// (from, to, key), serialize to pretty JSON.
    pub fn deterministic_json(&self) -> String {
        let mut graph = self.clone();
        graph.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        graph.edges.sort_by(|a, b| {
            a.from
                .cmp(&b.from)
                .then_with(|| a.to.cmp(&b.to))
                .then_with(|| a.key.cmp(&b.key))
        });
        serde_json::to_string_pretty(&graph).unwrap_or_default()
    }

    /// SHA-256 over the deterministic JSON form — the artifact version key.
    pub fn version_hash(&self) -> String {
        let digest = Sha256::digest(self.deterministic_json().as_bytes());
        hex_encode(&digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_partition_is_total() {
        use PersistenceMode::*;
        assert_eq!(PersistenceMode::from_backend(None), Ephemeral);
        assert_eq!(PersistenceMode::from_backend(Some("")), Ephemeral);
        assert_eq!(PersistenceMode::from_backend(Some("memory")), Ephemeral);
        assert_eq!(PersistenceMode::from_backend(Some("ephemeral")), Ephemeral);
        assert_eq!(PersistenceMode::from_backend(Some("redis")), Persistent);
        assert_eq!(PersistenceMode::from_backend(Some("sql")), Persistent);
        assert_eq!(PersistenceMode::from_backend(Some("persistent")), Persistent);
        // Case-sensitive: only the exact lowercase literals are ephemeral.
        assert_eq!(PersistenceMode::from_backend(Some("Memory")), Persistent);
    }

    fn worker(id: &str) -> IRNode {
        IRNode {
            id: id.to_string(),
            kind: IRNodeKind::Worker {
                config: Value::Null,
            },
            mode: PersistenceMode::Ephemeral,
            on_fail: None,
        }
    }

    #[test]
    fn version_hash_ignores_declaration_order() {
        let edge = |from: &str, to: &str| IREdge {
            from: from.to_string(),
            to: to.to_string(),
            key: None,
            condition: None,
        };
        let g1 = IRGraph {
            entry: "a".to_string(),
            nodes: vec![worker("b"), worker("a")],
            edges: vec![edge("b", "a"), edge("a", "b")],
        };
        let g2 = IRGraph {
            entry: "a".to_string(),
            nodes: vec![worker("a"), worker("b")],
            edges: vec![edge("a", "b"), edge("b", "a")],
        };
        assert_eq!(g1.version_hash(), g2.version_hash());
    }

    #[test]
    fn version_hash_changes_with_content() {
        let g1 = IRGraph {
            entry: "a".to_string(),
            nodes: vec![worker("a")],
            edges: Vec::new(),
        };
        let mut g2 = g1.clone();
        g2.nodes[0].mode = PersistenceMode::Persistent;
        assert_ne!(g1.version_hash(), g2.version_hash());
    }
}
