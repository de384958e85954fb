//! Graph topology builder and structural validator.
//!
//! Validation is pure and total: the whole graph is examined before
//! returning, so one pass surfaces every structural problem. Rule order is
//! fixed so error output is deterministic: V1 duplicate ids, V2 entry point,
//! V3 dangling edges (every violating edge, both endpoints), V4 fallback
//! targets.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use tracing::debug;

use super::dto::{Graph, KnownNodeDto, NodeDto, WorkflowDto};
use crate::compose::Document;
use crate::error::{
    EdgeEndpoint, PipelineError, StructuralViolation, ValidationReport, ValidationWarning,
};

/// A validated graph plus non-fatal findings.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub graph: Graph,
    pub warnings: Vec<ValidationWarning>,
}

/// Build a graph from a fully-resolved document and validate it. Returns the
/// graph on success; on failure the report enumerates every violation found.
pub fn build_and_validate(doc: &Document) -> Result<BuildOutput, PipelineError> {
    let dto = WorkflowDto::from_document(doc)?;
    build_and_validate_dto(&dto)
}

/// Same as [`build_and_validate`], starting from an already-parsed DTO.
pub fn build_and_validate_dto(dto: &WorkflowDto) -> Result<BuildOutput, PipelineError> {
    let violations = validate_workflow(dto);
    if !violations.is_empty() {
        return Err(PipelineError::Validation(ValidationReport { violations }));
    }

    let graph = Graph {
        entry: dto.entry.clone().unwrap_or_default(),
        nodes: dto.nodes.clone(),
        edges: dto.edges.clone(),
    };
    let warnings = reachability_warnings(&graph);
    debug!(
        "validated graph: {} node(s), {} edge(s), {} warning(s)",
        graph.nodes.len(),
        graph.edges.len(),
        warnings.len()
    );
    Ok(BuildOutput { graph, warnings })
}

/// Run every structural rule and return all violations found.
pub fn validate_workflow(dto: &WorkflowDto) -> Vec<StructuralViolation> {
    let mut violations = Vec::new();

    // V1: node ids must be unique. A broken identifier space makes the
    // remaining checks meaningless, so it runs first.
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for node in &dto.nodes {
        *counts.entry(node.id()).or_default() += 1;
    }
    let mut reported: HashSet<&str> = HashSet::new();
    for node in &dto.nodes {
        let id = node.id();
        if counts[id] > 1 && reported.insert(id) {
            violations.push(StructuralViolation::DuplicateId {
                id: id.to_string(),
                count: counts[id],
            });
        }
    }

    let ids: HashSet<&str> = dto.nodes.iter().map(NodeDto::id).collect();

    // V2: the entry point must name a node.
    let entry = dto.entry.as_deref().unwrap_or_default();
    if !ids.contains(entry) {
        violations.push(StructuralViolation::MissingEntryPoint {
            entry: entry.to_string(),
        });
    }

    // V3: every edge endpoint must name a node. Every violating edge is
    // reported, not only the first.
    for edge in &dto.edges {
        if !ids.contains(edge.from.as_str()) {
            violations.push(StructuralViolation::DanglingEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                endpoint: EdgeEndpoint::From,
            });
        }
        if !ids.contains(edge.to.as_str()) {
            violations.push(StructuralViolation::DanglingEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                endpoint: EdgeEndpoint::To,
            });
        }
    }

    // V4: every on_fail target must name a node.
    for node in &dto.nodes {
        if let Some(fallback) = node.on_fail() {
            if !ids.contains(fallback.target.as_str()) {
                violations.push(StructuralViolation::DanglingFallback {
                    node: node.id().to_string(),
                    target: fallback.target.clone(),
                });
            }
        }
    }

    violations
}

/// Non-fatal reachability pass: BFS from the entry over every route an
/// execution could take (edges, `next` pointers, branches, fallbacks).
fn reachability_warnings(graph: &Graph) -> Vec<ValidationWarning> {
    let mut dg: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for node in &graph.nodes {
        let idx = dg.add_node(node.id());
        index.insert(node.id(), idx);
    }

    let link = |dg: &mut DiGraph<&str, ()>, from: &str, to: &str| {
        if let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) {
            dg.add_edge(a, b, ());
        }
    };
    for edge in &graph.edges {
        link(&mut dg, &edge.from, &edge.to);
    }
    for node in &graph.nodes {
        if let Some(next) = node.next() {
            link(&mut dg, node.id(), next);
        }
        if let Some(fallback) = node.on_fail() {
            link(&mut dg, node.id(), &fallback.target);
        }
        if let NodeDto::Known(KnownNodeDto::Router { id, branches, .. }) = node {
            for branch in branches {
                link(&mut dg, id, &branch.to);
            }
        }
    }

    let Some(&start) = index.get(graph.entry.as_str()) else {
        return Vec::new();
    };
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut bfs = Bfs::new(&dg, start);
    while let Some(idx) = bfs.next(&dg) {
        visited.insert(idx);
    }

    graph
        .nodes
        .iter()
        .filter(|node| !visited.contains(&index[node.id()]))
        .map(|node| ValidationWarning::Unreachable {
            node: node.id().to_string(),
        })
        .collect()
}
