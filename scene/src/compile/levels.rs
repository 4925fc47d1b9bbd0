use crate::tree::{walk_graph, GraphVisitor};
use crate::{NodeId, SceneGraph, SceneNode};

use super::CompileError;

/// Assigns levels depth-first from the root, then recomputes primitive counts.
///
/// A child is only touched (and descended into) when its level is not already
/// deeper than its parent's, so shared subtrees settle on the deepest level any
/// path requires.
///
/// # Errors
/// Returns [`CompileError::CycleDetected`] if a cycle is reachable from the root.
pub fn assign_levels(graph: &mut SceneGraph) -> Result<(), CompileError> {
    if let Some(node) = find_cycle(graph) {
        return Err(CompileError::CycleDetected { node });
    }

    let root = graph.root();
    graph.node_mut(root).level = 0;

    let mut pending = vec![root];
    while let Some(node_id) = pending.pop() {
        let level = graph.node(node_id).level;
        // Reversed so the first child is popped first
        for position in (0..graph.node(node_id).children.len()).rev() {
            let child_id = graph.node(node_id).children[position];
            let child = graph.node_mut(child_id);
            if child.level <= level {
                child.level = child.required_level(level);
                pending.push(child_id);
            }
        }
    }

    update_primitive_counts(graph);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    OnPath,
    Done,
}

/// Returns a node on a cycle reachable from the root, if there is one.
///
/// Iterative depth-first search; an edge into a node that is still on the
/// current path closes a cycle.
fn find_cycle(graph: &SceneGraph) -> Option<NodeId> {
    let root = graph.root();
    let mut marks = vec![Mark::Unseen; graph.len()];
    marks[root as usize] = Mark::OnPath;
    let mut path = vec![(root, 0usize)];

    while let Some(frame) = path.last_mut() {
        let (node_id, next) = *frame;
        match graph.node(node_id).children().get(next) {
            Some(&child_id) => {
                frame.1 += 1;
                match marks[child_id as usize] {
                    Mark::OnPath => return Some(child_id),
                    Mark::Unseen => {
                        marks[child_id as usize] = Mark::OnPath;
                        path.push((child_id, 0));
                    }
                    Mark::Done => {}
                }
            }
            None => {
                marks[node_id as usize] = Mark::Done;
                path.pop();
            }
        }
    }
    None
}

/// Visitor summing triangle counts bottom-up.
struct PrimitiveCounter {
    totals: Vec<u64>,
    visited: Vec<NodeId>,
}

impl GraphVisitor for PrimitiveCounter {
    fn enter_node(&mut self, _node: &SceneNode) -> bool {
        true
    }

    fn exit_node(&mut self, node: &SceneNode) {
        let children: u64 = node.children().iter().map(|&c| self.totals[c as usize]).sum();
        self.totals[node.id as usize] = node.num_triangles as u64 + children;
        self.visited.push(node.id);
    }
}

/// Recomputes `total_primitive_count` for every node reachable from the root.
pub(crate) fn update_primitive_counts(graph: &mut SceneGraph) {
    let mut counter = PrimitiveCounter {
        totals: vec![0; graph.len()],
        visited: Vec::new(),
    };
    walk_graph(graph, graph.root(), &mut counter);

    for id in counter.visited {
        graph.node_mut(id).total_primitive_count = counter.totals[id as usize];
    }
}
