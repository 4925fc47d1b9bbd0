use rayon::prelude::*;

use crate::common::Aabb;
use crate::tree::{walk_graph, GraphVisitor};
use crate::{NodeId, SceneGraph, SceneNode};

use super::CompileError;

/// Visitor that computes bounding boxes bottom-up.
///
/// A node's box is the union of its children's boxes, each moved into the
/// node's space by the child's object-to-world transform, and the vertices
/// of the triangles it references directly.
struct BoundingBoxCollector<'a> {
    graph: &'a SceneGraph,
    bounds: Vec<Option<Aabb>>,
    visited: Vec<NodeId>,
    error: Option<CompileError>,
}

impl<'a> BoundingBoxCollector<'a> {
    fn new(graph: &'a SceneGraph) -> Self {
        Self {
            graph,
            bounds: vec![None; graph.len()],
            visited: Vec::new(),
            error: None,
        }
    }

    fn geometry_bounds(&self, node: &SceneNode) -> Result<Option<Aabb>, CompileError> {
        let Some(start) = node.index_buffer_index else {
            return Ok(None);
        };

        let mut bounds = None;
        for triangle in 0..node.num_triangles {
            let corners = self
                .graph
                .buffers
                .triangle(start, triangle)
                .ok_or(CompileError::GeometryOutOfRange { node: node.id, triangle })?;
            bounds = Aabb::merge_opt(bounds, Aabb::from_points(&corners));
        }
        Ok(bounds)
    }
}

impl GraphVisitor for BoundingBoxCollector<'_> {
    fn enter_node(&mut self, _node: &SceneNode) -> bool {
        self.error.is_none()
    }

    fn exit_node(&mut self, node: &SceneNode) {
        if self.error.is_some() {
            return;
        }

        let child_bounds = node.children().iter().fold(None, |acc, &child_id| {
            let child = self.graph.node(child_id);
            let moved =
                self.bounds[child_id as usize].map(|b| b.transform(&child.object_to_world()));
            Aabb::merge_opt(acc, moved)
        });

        match self.geometry_bounds(node) {
            Ok(own) => {
                self.bounds[node.id as usize] = Aabb::merge_opt(child_bounds, own);
                self.visited.push(node.id);
            }
            Err(err) => self.error = Some(err),
        }
    }
}

/// Clears every cached box.
pub fn reset_bounds(graph: &mut SceneGraph) {
    graph.nodes.par_iter_mut().for_each(|node| node.aabb = None);
}

/// Recomputes the boxes of every node reachable from the root.
pub fn compute_bounds(graph: &mut SceneGraph) -> Result<(), CompileError> {
    reset_bounds(graph);
    compute_subtree_bounds(graph, graph.root())
}

/// Recomputes the boxes of `node_id` and everything below it.
pub(crate) fn compute_subtree_bounds(
    graph: &mut SceneGraph,
    node_id: NodeId,
) -> Result<(), CompileError> {
    let mut collector = BoundingBoxCollector::new(graph);
    walk_graph(graph, node_id, &mut collector);

    let BoundingBoxCollector { bounds, visited, error, .. } = collector;
    if let Some(err) = error {
        return Err(err);
    }

    for id in visited {
        graph.node_mut(id).aabb = bounds[id as usize];
    }
    Ok(())
}
