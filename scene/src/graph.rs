use cgmath::{Matrix4, Point3};

use crate::buffers::GeometryBuffers;
use crate::node::{NodeFlags, NodeId, SceneNode};
use crate::tree::{walk_graph, ReachabilityCollector};

/// The graph container holding every node plus the shared geometry buffers.
///
/// Nodes live in an arena addressed by [`NodeId`]. A node may be a child of
/// several parents; `parents` back-references are derived and are rebuilt
/// wholesale by [`SceneGraph::rebuild_parents`] rather than maintained by hand.
///
/// # Examples
///
/// ```
/// use accel_graph_scene::{SceneGraph, CompileOptions, compile};
/// use cgmath::Point3;
///
/// let mut graph = SceneGraph::new();
/// let root = graph.root();
///
/// let positions = [
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// graph.add_mesh_node(Some(root), "Triangle", &positions, &[0, 1, 2]).unwrap();
///
/// let report = compile(&mut graph, &CompileOptions::default()).unwrap();
/// assert_eq!(report.node_count, graph.len());
/// ```
#[derive(Debug, Clone)]
pub struct SceneGraph {
    pub nodes: Vec<SceneNode>,
    pub root: NodeId,
    pub buffers: GeometryBuffers,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Creates a graph containing only an empty root node.
    pub fn new() -> Self {
        Self::with_buffers(GeometryBuffers::new())
    }

    /// Creates a graph with a root node over existing geometry buffers.
    pub fn with_buffers(buffers: GeometryBuffers) -> Self {
        Self {
            nodes: vec![SceneNode::new(0, "Root")],
            root: 0,
            buffers,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Gets a reference to a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id as usize)
    }

    /// Gets a mutable reference to a node by ID.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id as usize)
    }

    /// Arena access for ids the compiler produced itself.
    pub(crate) fn node(&self, id: NodeId) -> &SceneNode {
        &self.nodes[id as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SceneNode {
        &mut self.nodes[id as usize]
    }

    /// Appends a node to the arena, assigning its id.
    pub(crate) fn push_node(&mut self, mut node: SceneNode) -> NodeId {
        let id = self.nodes.len() as NodeId;
        node.id = id;
        self.nodes.push(node);
        id
    }

    fn ensure_exists(&self, id: NodeId) -> anyhow::Result<()> {
        if self.get_node(id).is_none() {
            anyhow::bail!("Node with ID {} not found in scene graph", id);
        }
        Ok(())
    }

    /// Adds a new node to the graph.
    ///
    /// # Arguments
    /// * `parent` - Optional parent node ID. A node without parent is detached
    ///   until linked with [`SceneGraph::add_edge`].
    /// * `name` - Diagnostic name of the node.
    ///
    /// # Errors
    /// Returns an error if `parent` is `Some` but the specified node doesn't exist.
    pub fn add_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
    ) -> anyhow::Result<NodeId> {
        if let Some(parent_id) = parent {
            self.ensure_exists(parent_id)?;
        }

        let id = self.push_node(SceneNode::new(0, name));
        if let Some(parent_id) = parent {
            self.node_mut(parent_id).add_child(id);
        }
        Ok(id)
    }

    /// Adds a node carrying an object-to-world transform.
    pub fn add_transform_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        object_to_world: Matrix4<f32>,
    ) -> anyhow::Result<NodeId> {
        let id = self.add_node(parent, name)?;
        self.node_mut(id).set_transform(object_to_world);
        Ok(id)
    }

    /// Adds a node referencing a triangle range already present in the buffers.
    ///
    /// # Errors
    /// Returns an error if the parent doesn't exist or the range exceeds the index buffer.
    pub fn add_geometry_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        index_buffer_index: u32,
        num_triangles: u32,
    ) -> anyhow::Result<NodeId> {
        if !self.buffers.contains_range(index_buffer_index, num_triangles) {
            anyhow::bail!(
                "Triangle range {}+{} exceeds index buffer of {} indices",
                index_buffer_index,
                num_triangles,
                self.buffers.indices.len()
            );
        }

        let id = self.add_node(parent, name)?;
        let node = self.node_mut(id);
        node.index_buffer_index = Some(index_buffer_index);
        node.num_triangles = num_triangles;
        Ok(id)
    }

    /// Appends a triangle list to the buffers and adds a node referencing it.
    pub fn add_mesh_node(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
        positions: &[Point3<f32>],
        indices: &[u32],
    ) -> anyhow::Result<NodeId> {
        if indices.len() % 3 != 0 {
            anyhow::bail!("Index count {} is not a multiple of 3", indices.len());
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            anyhow::bail!("Index {} exceeds {} positions", bad, positions.len());
        }
        if let Some(parent_id) = parent {
            self.ensure_exists(parent_id)?;
        }

        let (start, count) = self.buffers.push_triangles(positions, indices);
        self.add_geometry_node(parent, name, start, count)
    }

    /// Adds an instance list. Instance lists always live on even levels.
    pub fn add_instance_list(
        &mut self,
        parent: Option<NodeId>,
        name: impl Into<String>,
    ) -> anyhow::Result<NodeId> {
        let id = self.add_node(parent, name)?;
        self.node_mut(id).flags = NodeFlags::INSTANCE_LIST | NodeFlags::FORCE_EVEN;
        Ok(id)
    }

    /// Adds an instance of `target` to an instance list.
    ///
    /// The instance is a transform node forced onto an even level whose only
    /// child is the (shared) target.
    pub fn add_instance(
        &mut self,
        list: NodeId,
        name: impl Into<String>,
        object_to_world: Matrix4<f32>,
        target: NodeId,
    ) -> anyhow::Result<NodeId> {
        self.ensure_exists(target)?;
        let id = self.add_transform_node(Some(list), name, object_to_world)?;
        self.node_mut(id).flags |= NodeFlags::FORCE_EVEN;
        self.node_mut(id).add_child(target);
        Ok(id)
    }

    /// References an existing node from an additional parent.
    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> anyhow::Result<()> {
        self.ensure_exists(parent)?;
        self.ensure_exists(child)?;
        if parent == child {
            anyhow::bail!("Node {} cannot be its own child", parent);
        }
        self.node_mut(parent).add_child(child);
        Ok(())
    }

    /// Marks `node` as a structural duplicate of `brother`.
    ///
    /// The compactor redirects every reference to `node` onto `brother`.
    pub fn mark_duplicate(&mut self, node: NodeId, brother: NodeId) -> anyhow::Result<()> {
        self.ensure_exists(node)?;
        self.ensure_exists(brother)?;
        if node == brother {
            anyhow::bail!("Node {} cannot be its own brother", node);
        }
        self.node_mut(node).brother = Some(brother);
        Ok(())
    }

    /// Rebuilds every node's `parents` list from the children lists.
    pub fn rebuild_parents(&mut self) {
        for node in &mut self.nodes {
            node.parents.clear();
        }
        for parent in 0..self.nodes.len() {
            let children = std::mem::take(&mut self.nodes[parent].children);
            for &child in &children {
                let parents = &mut self.nodes[child as usize].parents;
                if !parents.contains(&(parent as NodeId)) {
                    parents.push(parent as NodeId);
                }
            }
            self.nodes[parent].children = children;
        }
    }

    /// Refreshes the derived child counters of every node.
    pub(crate) fn refresh_counters(&mut self) {
        let levels: Vec<u32> = self.nodes.iter().map(|n| n.level).collect();
        for node in &mut self.nodes {
            let even = node
                .children
                .iter()
                .filter(|&&c| levels[c as usize] % 2 == 0)
                .count() as u32;
            node.num_children = node.children.len() as u32;
            node.num_even = even;
            node.num_odd = node.num_children - even;
        }
    }

    /// Returns a mask of nodes reachable from the root.
    pub fn reachable(&self) -> Vec<bool> {
        let mut collector = ReachabilityCollector::new(self.len());
        walk_graph(self, self.root, &mut collector);
        collector.reachable
    }

    /// One line per interesting node, for diagnostic dumps.
    ///
    /// DummyBLAS nodes directly below instance lists and the instances they hold
    /// are skipped, since they can number in the millions.
    pub fn diagnostic_lines(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|node| !self.is_instance_plumbing(node))
            .map(|node| node.to_string())
            .collect()
    }

    fn is_instance_plumbing(&self, node: &SceneNode) -> bool {
        let below_list = |n: &SceneNode| {
            n.is_dummy_blas()
                && n.parents.first().is_some_and(|&p| self.node(p).is_instance_list())
        };
        below_list(node)
            || (!node.parents.is_empty()
                && node.parents.iter().all(|&p| below_list(self.node(p))))
    }
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod graph_tests;
