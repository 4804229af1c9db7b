//! Ordering and cycle detection over DATA_FLOW edges
//!
//! FEEDBACK edges are resolved from history of earlier iterations, so they
//! never constrain the order within one iteration and are ignored here.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::model::{Graph, Node, NodeId};

/// Adjacency lists of DATA_FLOW edges by dense node index.
/// Edges with dangling endpoints are skipped.
pub(crate) fn data_flow_adjacency(graph: &Graph) -> Vec<Vec<usize>> {
    let index: FxHashMap<&NodeId, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (&n.id, i))
        .collect();
    let mut adjacency = vec![Vec::new(); graph.nodes.len()];
    for edge in graph.edges.iter().filter(|e| !e.is_feedback()) {
        if let (Some(&s), Some(&t)) = (index.get(&edge.source), index.get(&edge.target)) {
            adjacency[s].push(t);
        }
    }
    adjacency
}

/// Kahn's algorithm over node indices; `None` when a cycle prevents a full order
pub(crate) fn topological_order(graph: &Graph) -> Option<Vec<usize>> {
    let adjacency = data_flow_adjacency(graph);
    let mut in_degree = vec![0usize; adjacency.len()];
    for targets in &adjacency {
        for &t in targets {
            in_degree[t] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..adjacency.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(adjacency.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &t in &adjacency[i] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                queue.push_back(t);
            }
        }
    }

    (order.len() == adjacency.len()).then_some(order)
}

/// Nodes in an order where every DATA_FLOW edge points forward.
///
/// Returns `None` rather than a partial order when the DATA_FLOW edges form
/// a cycle.
#[must_use]
pub fn topological_sort(graph: &Graph) -> Option<Vec<&Node>> {
    topological_order(graph).map(|order| order.into_iter().map(|i| &graph.nodes[i]).collect())
}

#[must_use]
pub fn has_cycle(graph: &Graph) -> bool {
    topological_order(graph).is_none()
}

/// The first DATA_FLOW cycle found, as a node id sequence
#[must_use]
pub fn detect_cycle(graph: &Graph) -> Option<Vec<NodeId>> {
    cycles(graph, true).into_iter().next()
}

/// Every cycle closed by a back edge during a depth-first search.
///
/// Each cycle is reported once per back edge, starting at the node the back
/// edge returns to. This finds at least one cycle per strongly connected
/// component but not every elementary cycle.
#[must_use]
pub fn find_cycles(graph: &Graph) -> Vec<Vec<NodeId>> {
    cycles(graph, false)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

fn cycles(graph: &Graph, first_only: bool) -> Vec<Vec<NodeId>> {
    let adjacency = data_flow_adjacency(graph);
    let mut marks = vec![Mark::Unvisited; adjacency.len()];
    let mut found = Vec::new();

    for root in 0..adjacency.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        // (node, index of the next outgoing edge to explore)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        marks[root] = Mark::OnStack;

        while let Some(frame) = stack.last_mut() {
            let (node, next) = *frame;
            if let Some(&target) = adjacency[node].get(next) {
                frame.1 += 1;
                match marks[target] {
                    Mark::Unvisited => {
                        marks[target] = Mark::OnStack;
                        stack.push((target, 0));
                    }
                    Mark::OnStack => {
                        let start = stack.iter().position(|&(n, _)| n == target).unwrap_or(0);
                        found.push(
                            stack[start..]
                                .iter()
                                .map(|&(n, _)| graph.nodes[n].id.clone())
                                .collect(),
                        );
                        if first_only {
                            return found;
                        }
                    }
                    Mark::Done => {}
                }
            } else {
                marks[node] = Mark::Done;
                stack.pop();
            }
        }
    }
    found
}
