//! Lowering from the authoring vocabulary to the runtime vocabulary.
//!
//! The mapping table is an exhaustive match over the closed node-kind enum:
//! agent/evaluator/solver become workers, router/council become logic nodes,
//! human gates pass through, and the runtime kinds (worker/logic) are
//! fixpoints, so lowering an already-lowered vocabulary changes nothing.
//! Implicit `next` pointers and declared branches are materialized as
//! explicit edges; branch routing keys are derived from the source id and
//! branch order only, never from iteration order.

use std::collections::HashSet;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::ir::{IREdge, IRGraph, IRNode, IRNodeKind, PersistenceMode};
use crate::authoring::{Graph, KnownNodeDto, NodeDto};
use crate::error::LoweringError;

/// Lower a validated graph into the runtime vocabulary.
pub fn lower(graph: &Graph) -> Result<IRGraph, LoweringError> {
    let mut nodes: Vec<IRNode> = Vec::with_capacity(graph.nodes.len());
    let mut edges: Vec<IREdge> = Vec::new();

    for node in &graph.nodes {
        let known = match node {
            NodeDto::Known(known) => known,
            NodeDto::Unknown(u) => {
                return Err(LoweringError::UnknownKind {
                    id: u.id.clone(),
                    kind: u.kind.clone(),
                })
            }
        };

        if let Some(next) = known.next() {
            edges.push(IREdge {
                from: known.id().to_string(),
                to: next.to_string(),
                key: None,
                condition: None,
            });
        }

        let ir = match known {
            KnownNodeDto::Agent {
                id,
                name,
                model,
                prompt,
                tools,
                backend,
                on_fail,
                ..
            } => IRNode {
                id: id.clone(),
                kind: IRNodeKind::Worker {
                    config: agent_config(name, model, prompt, tools),
                },
                mode: PersistenceMode::from_backend(backend.as_deref()),
                on_fail: on_fail.clone(),
            },

            KnownNodeDto::Human {
                id,
                prompt,
                channel,
                on_fail,
                ..
            } => IRNode {
                id: id.clone(),
                kind: IRNodeKind::Human {
                    prompt: prompt.clone(),
                    channel: channel.clone(),
                },
                mode: PersistenceMode::Ephemeral,
                on_fail: on_fail.clone(),
            },

            KnownNodeDto::Router {
                id,
                branches,
                on_fail,
            } => {
                if branches.is_empty() {
                    return Err(LoweringError::EmptyRouter { id: id.clone() });
                }
                for (index, branch) in branches.iter().enumerate() {
                    edges.push(IREdge {
                        from: id.clone(),
                        to: branch.to.clone(),
                        key: Some(format!("{}:b{}", id, index)),
                        condition: branch.when.clone(),
                    });
                }
                IRNode {
                    id: id.clone(),
                    kind: IRNodeKind::Logic { config: Value::Null },
                    mode: PersistenceMode::Ephemeral,
                    on_fail: on_fail.clone(),
                }
            }

            KnownNodeDto::Evaluator {
                id,
                criteria,
                threshold,
                backend,
                on_fail,
                ..
            } => {
                let mut config = Mapping::new();
                if !criteria.is_empty() {
                    config.insert(
                        Value::String("criteria".to_string()),
                        Value::Sequence(
                            criteria.iter().cloned().map(Value::String).collect(),
                        ),
                    );
                }
                if let Some(threshold) = threshold {
                    config.insert(
                        Value::String("threshold".to_string()),
                        Value::Number((*threshold).into()),
                    );
                }
                IRNode {
                    id: id.clone(),
                    kind: IRNodeKind::Worker {
                        config: non_empty(config),
                    },
                    mode: PersistenceMode::from_backend(backend.as_deref()),
                    on_fail: on_fail.clone(),
                }
            }

            KnownNodeDto::Solver {
                id,
                objective,
                max_rounds,
                backend,
                on_fail,
                ..
            } => {
                let mut config = Mapping::new();
                if let Some(objective) = objective {
                    config.insert(
                        Value::String("objective".to_string()),
                        Value::String(objective.clone()),
                    );
                }
                if let Some(max_rounds) = max_rounds {
                    config.insert(
                        Value::String("max_rounds".to_string()),
                        Value::Number((*max_rounds).into()),
                    );
                }
                IRNode {
                    id: id.clone(),
                    kind: IRNodeKind::Worker {
                        config: non_empty(config),
                    },
                    mode: PersistenceMode::from_backend(backend.as_deref()),
                    on_fail: on_fail.clone(),
                }
            }

            KnownNodeDto::Council {
                id,
                members,
                strategy,
                on_fail,
                ..
            } => {
                // Ensemble configuration is carried as one opaque sub-object;
                // its internal fields are not lowered further.
                let mut config = Mapping::new();
                config.insert(
                    Value::String("members".to_string()),
                    Value::Sequence(members.iter().cloned().map(Value::String).collect()),
                );
                if let Some(strategy) = strategy {
                    config.insert(
                        Value::String("strategy".to_string()),
                        Value::String(strategy.clone()),
                    );
                }
                IRNode {
                    id: id.clone(),
                    kind: IRNodeKind::Logic {
                        config: Value::Mapping(config),
                    },
                    mode: PersistenceMode::Ephemeral,
                    on_fail: on_fail.clone(),
                }
            }

            KnownNodeDto::Worker {
                id,
                config,
                backend,
                on_fail,
                ..
            } => IRNode {
                id: id.clone(),
                kind: IRNodeKind::Worker {
                    config: config.clone(),
                },
                mode: PersistenceMode::from_backend(backend.as_deref()),
                on_fail: on_fail.clone(),
            },

            KnownNodeDto::Logic {
                id,
                config,
                on_fail,
                ..
            } => IRNode {
                id: id.clone(),
                kind: IRNodeKind::Logic {
                    config: config.clone(),
                },
                mode: PersistenceMode::Ephemeral,
                on_fail: on_fail.clone(),
            },
        };
        nodes.push(ir);
    }

    for edge in &graph.edges {
        edges.push(IREdge {
            from: edge.from.clone(),
            to: edge.to.clone(),
            key: None,
            condition: edge.condition.clone(),
        });
    }

    // Branch/next materialization is where fresh dangling references could
    // appear, so referential integrity is re-checked on the lowered graph.
    let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &edges {
        if !ids.contains(edge.from.as_str()) || !ids.contains(edge.to.as_str()) {
            return Err(LoweringError::DanglingEdge {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
        }
    }

    debug!(
        "lowered graph: {} node(s), {} edge(s)",
        nodes.len(),
        edges.len()
    );
    Ok(IRGraph {
        entry: graph.entry.clone(),
        nodes,
        edges,
    })
}

/// Worker configuration for an agent node: fields copied verbatim.
fn agent_config(
    name: &Option<String>,
    model: &Option<String>,
    prompt: &Option<String>,
    tools: &[String],
) -> Value {
    let mut config = Mapping::new();
    let mut put = |key: &str, value: Value| {
        config.insert(Value::String(key.to_string()), value);
    };
    if let Some(name) = name {
        put("name", Value::String(name.clone()));
    }
    if let Some(model) = model {
        put("model", Value::String(model.clone()));
    }
    if let Some(prompt) = prompt {
        put("prompt", Value::String(prompt.clone()));
    }
    if !tools.is_empty() {
        put(
            "tools",
            Value::Sequence(tools.iter().cloned().map(Value::String).collect()),
        );
    }
    non_empty(config)
}

fn non_empty(config: Mapping) -> Value {
    if config.is_empty() {
        Value::Null
    } else {
        Value::Mapping(config)
    }
}
