//! Parse-boundary DTOs for the authoring vocabulary.
//!
//! Node kinds are a closed tagged enum; a node whose `kind` tag is not in the
//! vocabulary parses into the `Unknown` fallback instead of failing, so the
//! lowering table stays a total, compile-time-checked function.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::compose::Document;
use crate::error::ComposeError;

// ── Top-level DTO ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub edges: Vec<EdgeDto>,
}

impl WorkflowDto {
    /// Deserialize a fully-resolved document into the authoring shape.
    pub fn from_document(doc: &Document) -> Result<Self, ComposeError> {
        serde_yaml::from_value(doc.root.clone()).map_err(|e| ComposeError::Parse {
            path: doc.path.clone(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Edge ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDto {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    /// Opaque routing expression evaluated by the runtime, never here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

// ── Recovery / branching sub-objects ──

/// Recovery route to another node. `retries` and `delay_ms` are copied
/// through lowering untouched; negative values are permitted and left to
/// runtime interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackDto {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub retries: i64,
    #[serde(default)]
    pub delay_ms: i64,
}

/// One declared branch of a router. `when` is an opaque routing expression;
/// a branch without `when` is the default route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(default)]
    pub to: String,
}

// ── Node (tagged enum with unknown-kind fallback) ──

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeDto {
    Known(KnownNodeDto),
    Unknown(UnknownNodeDto),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KnownNodeDto {
    /// Worker/agent step.
    Agent {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Human-in-the-loop gate.
    #[serde(alias = "hitl")]
    Human {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Conditional branching. Each declared branch becomes a materialized
    /// conditional edge during lowering.
    Router {
        id: String,
        #[serde(default)]
        branches: Vec<BranchDto>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Scoring/judge step.
    Evaluator {
        id: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        criteria: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threshold: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Generative solver (propose/refine loop).
    Solver {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        objective: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_rounds: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Multi-participant ensemble. Its configuration lowers as one opaque
    /// sub-object.
    Council {
        id: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        members: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        strategy: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Runtime-vocabulary worker. Lowers verbatim (fixpoint).
    Worker {
        id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        config: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        backend: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
    /// Runtime-vocabulary logic node. Lowers verbatim (fixpoint).
    Logic {
        id: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        config: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        on_fail: Option<FallbackDto>,
    },
}

/// Fallback shape for node kinds outside the vocabulary. Carried through
/// parsing and validation; rejected by the lowering table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownNodeDto {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(flatten)]
    pub config: serde_yaml::Mapping,
}

// ── NodeDto helpers ──

impl NodeDto {
    /// Returns the id regardless of variant.
    pub fn id(&self) -> &str {
        match self {
            NodeDto::Known(known) => known.id(),
            NodeDto::Unknown(u) => &u.id,
        }
    }

    /// The authoring kind tag.
    pub fn kind_name(&self) -> &str {
        match self {
            NodeDto::Known(known) => known.kind_name(),
            NodeDto::Unknown(u) => &u.kind,
        }
    }

    /// Implicit next-step pointer, if declared.
    pub fn next(&self) -> Option<&str> {
        match self {
            NodeDto::Known(known) => known.next(),
            NodeDto::Unknown(_) => None,
        }
    }

    /// Recovery route, if declared.
    pub fn on_fail(&self) -> Option<&FallbackDto> {
        match self {
            NodeDto::Known(known) => known.on_fail(),
            NodeDto::Unknown(_) => None,
        }
    }
}

impl KnownNodeDto {
    pub fn id(&self) -> &str {
        match self {
            KnownNodeDto::Agent { id, .. }
            | KnownNodeDto::Human { id, .. }
            | KnownNodeDto::Router { id, .. }
            | KnownNodeDto::Evaluator { id, .. }
            | KnownNodeDto::Solver { id, .. }
            | KnownNodeDto::Council { id, .. }
            | KnownNodeDto::Worker { id, .. }
            | KnownNodeDto::Logic { id, .. } => id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            KnownNodeDto::Agent { .. } => "agent",
            KnownNodeDto::Human { .. } => "human",
            KnownNodeDto::Router { .. } => "router",
            KnownNodeDto::Evaluator { .. } => "evaluator",
            KnownNodeDto::Solver { .. } => "solver",
            KnownNodeDto::Council { .. } => "council",
            KnownNodeDto::Worker { .. } => "worker",
            KnownNodeDto::Logic { .. } => "logic",
        }
    }

    pub fn next(&self) -> Option<&str> {
        match self {
            KnownNodeDto::Agent { next, .. }
            | KnownNodeDto::Human { next, .. }
            | KnownNodeDto::Evaluator { next, .. }
            | KnownNodeDto::Solver { next, .. }
            | KnownNodeDto::Council { next, .. }
            | KnownNodeDto::Worker { next, .. }
            | KnownNodeDto::Logic { next, .. } => next.as_deref(),
            KnownNodeDto::Router { .. } => None,
        }
    }

    pub fn on_fail(&self) -> Option<&FallbackDto> {
        match self {
            KnownNodeDto::Agent { on_fail, .. }
            | KnownNodeDto::Human { on_fail, .. }
            | KnownNodeDto::Router { on_fail, .. }
            | KnownNodeDto::Evaluator { on_fail, .. }
            | KnownNodeDto::Solver { on_fail, .. }
            | KnownNodeDto::Council { on_fail, .. }
            | KnownNodeDto::Worker { on_fail, .. }
            | KnownNodeDto::Logic { on_fail, .. } => on_fail.as_ref(),
        }
    }
}

// ── Graph (validated authoring topology) ──

/// The validated authoring graph: entry point plus node/edge collections.
/// All relationships are identifier lookups, never pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub entry: String,
    pub nodes: Vec<NodeDto>,
    pub edges: Vec<EdgeDto>,
}

impl Graph {
    /// Node lookup by id.
    pub fn node(&self, id: &str) -> Option<&NodeDto> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Deterministic JSON: clone, sort nodes by id, sort edges by (from, to),
    /// serialize to pretty JSON.
    pub fn deterministic_json(&self) -> String {
        let mut graph = self.clone();
        graph.nodes.sort_by(|a, b| a.id().cmp(b.id()));
        graph
            .edges
            .sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.to.cmp(&b.to)));
        serde_json::to_string_pretty(&graph).unwrap_or_default()
    }
}
