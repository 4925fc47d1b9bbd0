use std::collections::HashMap;

use rayon::prelude::*;

use crate::node::{DUMMY_BLAS_NAME, DUMMY_TLAS_NAME};
use crate::{NodeId, SceneGraph, SceneNode, Tier};

use super::levels::update_primitive_counts;

/// Number of synthesized nodes added by [`normalize_parity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParityStats {
    pub dummy_blas: usize,
    pub dummy_tlas: usize,
}

/// Structural identity of a dummy node. Two dummies with equal keys are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DummyKey {
    children: Vec<NodeId>,
    index_buffer_index: Option<u32>,
    num_triangles: u32,
}

impl DummyKey {
    fn new(children: &[NodeId], index_buffer_index: Option<u32>, num_triangles: u32) -> Self {
        let mut children = children.to_vec();
        children.sort_unstable();
        children.dedup();
        Self {
            children,
            index_buffer_index,
            num_triangles,
        }
    }
}

/// A child reference inside a plan: either a node already in the arena or
/// the n-th dummy the plan will append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChildRef {
    Node(NodeId),
    Dummy(usize),
}

#[derive(Debug)]
struct NodeEdit {
    node: NodeId,
    children: Vec<ChildRef>,
    clear_geometry: bool,
}

/// Edits for one parity partition, computed against an immutable graph.
#[derive(Debug, Default)]
struct PartitionPlan {
    dummies: Vec<SceneNode>,
    edits: Vec<NodeEdit>,
    /// Existing dummies reused from a shallower parent that must move down.
    level_raises: Vec<(NodeId, u32)>,
    lookup: HashMap<DummyKey, ChildRef>,
}

impl PartitionPlan {
    /// Seeds the lookup with dummies of `name` already present in the graph.
    fn with_existing(graph: &SceneGraph, reachable: &[bool], name: &str) -> Self {
        let mut plan = Self::default();
        for node in graph.nodes.iter().filter(|n| reachable[n.id as usize] && n.name == name) {
            let key = DummyKey::new(node.children(), node.index_buffer_index, node.num_triangles);
            plan.lookup.entry(key).or_insert(ChildRef::Node(node.id));
        }
        plan
    }

    /// Finds a dummy with the same structure or plans a new one.
    fn dummy_for(
        &mut self,
        graph: &SceneGraph,
        name: &str,
        parent_level: u32,
        children: Vec<NodeId>,
        geometry: Option<(Option<u32>, u32)>,
    ) -> ChildRef {
        let (index_buffer_index, num_triangles) = geometry.unwrap_or((None, 0));
        let key = DummyKey::new(&children, index_buffer_index, num_triangles);
        let level = parent_level + 1;

        match self.lookup.get(&key) {
            Some(&ChildRef::Node(id)) => {
                if graph.node(id).level < level {
                    self.level_raises.push((id, level));
                }
                ChildRef::Node(id)
            }
            Some(&ChildRef::Dummy(slot)) => {
                let dummy = &mut self.dummies[slot];
                dummy.level = dummy.level.max(level);
                ChildRef::Dummy(slot)
            }
            None => {
                let mut dummy = SceneNode::new_dummy(name, parent_level, children);
                dummy.index_buffer_index = index_buffer_index;
                dummy.num_triangles = num_triangles;
                let slot = ChildRef::Dummy(self.dummies.len());
                self.dummies.push(dummy);
                self.lookup.insert(key, slot);
                slot
            }
        }
    }
}

fn split_by_parity(graph: &SceneGraph, node: &SceneNode) -> (Vec<NodeId>, Vec<NodeId>) {
    node.children()
        .iter()
        .copied()
        .partition(|&c| graph.node(c).tier() == Tier::Instance)
}

/// Even nodes holding geometry or even children get a DummyBLAS below them.
fn plan_even(graph: &SceneGraph, nodes: &[NodeId], reachable: &[bool]) -> PartitionPlan {
    let mut plan = PartitionPlan::with_existing(graph, reachable, DUMMY_BLAS_NAME);

    for &id in nodes {
        let node = graph.node(id);
        let (even, odd) = split_by_parity(graph, node);
        if even.is_empty() && !node.has_geometry() {
            continue;
        }

        let geometry = node
            .has_geometry()
            .then_some((node.index_buffer_index, node.num_triangles));
        let dummy = plan.dummy_for(graph, DUMMY_BLAS_NAME, node.level, even, geometry);

        let mut children: Vec<ChildRef> = odd.into_iter().map(ChildRef::Node).collect();
        children.push(dummy);
        plan.edits.push(NodeEdit {
            node: id,
            children,
            clear_geometry: true,
        });
    }

    plan
}

/// Odd nodes with odd children get a DummyTLAS wrapping those children.
fn plan_odd(graph: &SceneGraph, nodes: &[NodeId], reachable: &[bool]) -> PartitionPlan {
    let mut plan = PartitionPlan::with_existing(graph, reachable, DUMMY_TLAS_NAME);

    for &id in nodes {
        let node = graph.node(id);
        let (even, odd) = split_by_parity(graph, node);
        if odd.is_empty() {
            continue;
        }

        let dummy = plan.dummy_for(graph, DUMMY_TLAS_NAME, node.level, odd, None);

        let mut children: Vec<ChildRef> = even.into_iter().map(ChildRef::Node).collect();
        children.push(dummy);
        plan.edits.push(NodeEdit {
            node: id,
            children,
            clear_geometry: false,
        });
    }

    plan
}

/// Appends the plan's dummies and applies its edits. Returns the number of
/// dummies added.
fn commit(graph: &mut SceneGraph, plan: PartitionPlan) -> usize {
    let base = graph.len() as NodeId;
    let added = plan.dummies.len();
    for dummy in plan.dummies {
        graph.push_node(dummy);
    }

    let resolve = |child: ChildRef| match child {
        ChildRef::Node(id) => id,
        ChildRef::Dummy(slot) => base + slot as NodeId,
    };

    for edit in plan.edits {
        let node = graph.node_mut(edit.node);
        node.children = edit.children.into_iter().map(resolve).collect();
        if edit.clear_geometry {
            node.clear_geometry();
        }
    }
    for (id, level) in plan.level_raises {
        let node = graph.node_mut(id);
        node.level = node.level.max(level);
    }

    added
}

/// Drops every child whose subtree holds no primitives.
pub(crate) fn prune_empty_children(graph: &mut SceneGraph) {
    update_primitive_counts(graph);
    let totals: Vec<u64> = graph.nodes.iter().map(|n| n.total_primitive_count).collect();
    graph
        .nodes
        .par_iter_mut()
        .for_each(|node| node.children.retain(|&c| totals[c as usize] > 0));
}

/// Enforces strict alternation between instance (even) and geometry (odd)
/// levels by inserting shared dummy nodes.
///
/// Both partitions are planned concurrently against the unchanged graph and
/// committed afterwards, DummyTLAS nodes first.
pub fn normalize_parity(graph: &mut SceneGraph) -> ParityStats {
    prune_empty_children(graph);

    let reachable = graph.reachable();
    let (even, odd): (Vec<NodeId>, Vec<NodeId>) = graph
        .nodes
        .iter()
        .filter(|n| reachable[n.id as usize])
        .map(|n| n.id)
        .partition(|&id| graph.node(id).tier() == Tier::Instance);

    let shared: &SceneGraph = graph;
    let (even_plan, odd_plan) = rayon::join(
        || plan_even(shared, &even, &reachable),
        || plan_odd(shared, &odd, &reachable),
    );

    let stats = ParityStats {
        dummy_tlas: commit(graph, odd_plan),
        dummy_blas: commit(graph, even_plan),
    };

    prune_empty_children(graph);
    graph.rebuild_parents();
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::assign_levels;
    use cgmath::{Matrix4, Point3, SquareMatrix};

    fn triangle() -> [Point3<f32>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    fn assert_alternates(graph: &SceneGraph) {
        let reachable = graph.reachable();
        for node in graph.nodes.iter().filter(|n| reachable[n.id as usize]) {
            for &child in node.children() {
                let child = graph.node(child);
                assert!(child.level > node.level, "{} -> {}", node, child);
                assert_ne!(child.level % 2, node.level % 2, "{} -> {}", node, child);
            }
            if node.tier() == Tier::Instance {
                assert!(!node.has_geometry(), "{}", node);
            }
        }
    }

    #[test]
    fn test_root_geometry_moves_into_dummy_blas() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let (start, count) = graph.buffers.push_triangles(&triangle(), &[0, 1, 2, 0, 2, 1]);
        graph.node_mut(root).index_buffer_index = Some(start);
        graph.node_mut(root).num_triangles = count;
        assign_levels(&mut graph).unwrap();

        let stats = normalize_parity(&mut graph);

        assert_eq!(stats, ParityStats { dummy_blas: 1, dummy_tlas: 0 });
        let root_node = graph.node(root);
        assert!(!root_node.has_geometry());
        assert_eq!(root_node.children().len(), 1);
        let dummy = graph.node(root_node.children()[0]);
        assert!(dummy.is_dummy_blas());
        assert_eq!(dummy.level, 1);
        assert_eq!(dummy.num_triangles, 2);
        assert_eq!(dummy.index_buffer_index, Some(start));
    }

    #[test]
    fn test_odd_children_wrapped_in_dummy_tlas() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let group = graph.add_node(Some(root), "Group").unwrap();
        let mesh = graph.add_mesh_node(Some(group), "Mesh", &triangle(), &[0, 1, 2]).unwrap();
        // Forcing odd below an odd node skips a level
        graph.node_mut(mesh).flags = crate::NodeFlags::FORCE_ODD;
        assign_levels(&mut graph).unwrap();
        assert_eq!(graph.node(mesh).level, 3);

        let stats = normalize_parity(&mut graph);

        assert_eq!(stats.dummy_tlas, 1);
        let dummy = graph.node(graph.node(group).children()[0]);
        assert_eq!(dummy.name, DUMMY_TLAS_NAME);
        assert_eq!(dummy.level, 2);
        assert_eq!(dummy.children(), &[mesh]);
        assert_alternates(&graph);
    }

    #[test]
    fn test_instance_list_gets_single_dummy_blas() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let mesh = graph.add_mesh_node(None, "Mesh", &triangle(), &[0, 1, 2]).unwrap();
        let list = graph.add_instance_list(Some(root), "List").unwrap();
        for i in 0..3 {
            graph.add_instance(list, format!("Instance{i}"), Matrix4::identity(), mesh).unwrap();
        }
        assign_levels(&mut graph).unwrap();

        normalize_parity(&mut graph);

        let list_node = graph.node(list);
        assert_eq!(list_node.children().len(), 1);
        let dummy = graph.node(list_node.children()[0]);
        assert!(dummy.is_dummy_blas());
        assert_eq!(dummy.children().len(), 3);
        assert_alternates(&graph);
    }

    #[test]
    fn test_identical_dummies_are_shared() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let mesh = graph.add_mesh_node(None, "Mesh", &triangle(), &[0, 1, 2]).unwrap();
        let instance = graph.add_transform_node(None, "Instance", Matrix4::identity()).unwrap();
        graph.node_mut(instance).flags = crate::NodeFlags::FORCE_EVEN;
        graph.add_edge(instance, mesh).unwrap();

        let first = graph.add_instance_list(Some(root), "First").unwrap();
        let second = graph.add_instance_list(Some(root), "Second").unwrap();
        graph.add_edge(first, instance).unwrap();
        graph.add_edge(second, instance).unwrap();
        // Keep the lists apart from the merger's point of view
        graph.node_mut(second).set_transform(Matrix4::from_scale(2.0));
        assign_levels(&mut graph).unwrap();

        let stats = normalize_parity(&mut graph);

        // One below the root, one shared by both lists
        assert_eq!(stats.dummy_blas, 2);
        assert_eq!(graph.node(first).children(), graph.node(second).children());
    }

    #[test]
    fn test_rerun_adds_nothing() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let (start, count) = graph.buffers.push_triangles(&triangle(), &[0, 1, 2]);
        graph.node_mut(root).index_buffer_index = Some(start);
        graph.node_mut(root).num_triangles = count;
        let group = graph.add_node(Some(root), "Group").unwrap();
        let mesh = graph.add_mesh_node(Some(group), "Mesh", &triangle(), &[0, 1, 2]).unwrap();
        graph.node_mut(mesh).flags = crate::NodeFlags::FORCE_ODD;
        assign_levels(&mut graph).unwrap();

        let first = normalize_parity(&mut graph);
        assert_eq!(first, ParityStats { dummy_blas: 1, dummy_tlas: 1 });
        let len = graph.len();
        let stats = normalize_parity(&mut graph);

        assert_eq!(stats, ParityStats::default());
        assert_eq!(graph.len(), len);
        assert_alternates(&graph);
    }

    #[test]
    fn test_empty_children_pruned() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let empty = graph.add_node(Some(root), "Empty").unwrap();
        graph.add_mesh_node(Some(root), "Mesh", &triangle(), &[0, 1, 2]).unwrap();
        assign_levels(&mut graph).unwrap();

        normalize_parity(&mut graph);

        assert!(!graph.node(root).children().contains(&empty));
    }
}
