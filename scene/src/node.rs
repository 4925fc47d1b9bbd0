use std::fmt;

use bitflags::bitflags;
use cgmath::{Matrix4, SquareMatrix};

use crate::common::{invert_or_identity, Aabb};

/// Unique identifier for a node: its slot in the graph's node arena.
pub type NodeId = u32;

/// Name given to synthesized geometry-tier (odd level) nodes.
pub const DUMMY_BLAS_NAME: &str = "DummyBLAS";
/// Name given to synthesized instance-tier (even level) nodes.
pub const DUMMY_TLAS_NAME: &str = "DummyTLAS";

bitflags! {
    /// Structural hints attached to a node by whoever built the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        /// No special flags
        const NONE = 0;
        /// Node groups identically transformed instances
        const INSTANCE_LIST = 1 << 0;
        /// Node must land on an odd (geometry) level
        const FORCE_ODD = 1 << 1;
        /// Node must land on an even (instance) level
        const FORCE_EVEN = 1 << 2;
        /// Node selects between levels of detail at trace time. Carried, never interpreted.
        const LOD_SELECTOR = 1 << 3;
    }
}

/// Which tier of the two-level hierarchy a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Even levels: instance/transform references only
    Instance,
    /// Odd levels: direct geometry references
    Geometry,
}

impl Tier {
    pub fn of_level(level: u32) -> Self {
        if level % 2 == 0 {
            Self::Instance
        } else {
            Self::Geometry
        }
    }
}

/// A node in the scene graph.
///
/// Children are shared: several parents may reference the same node, so the
/// graph is a DAG rather than a tree. `parents` is derived from the children
/// lists and is only valid after [`crate::SceneGraph::rebuild_parents`].
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub id: NodeId,
    /// Diagnostic label. Merges and splits record their provenance here.
    pub name: String,

    /// Position in the compiled flat buffer, `None` until the compactor runs.
    pub index: Option<u32>,
    pub level: u32,

    // Hierarchy
    pub(crate) children: Vec<NodeId>,
    pub(crate) parents: Vec<NodeId>,

    // Geometry: triangles [index_buffer_index, index_buffer_index + 3 * num_triangles)
    pub index_buffer_index: Option<u32>,
    pub num_triangles: u32,
    pub total_primitive_count: u64,

    object_to_world: Matrix4<f32>,
    world_to_object: Matrix4<f32>,

    pub aabb: Option<Aabb>,
    pub flags: NodeFlags,
    /// Structural duplicate this node should be replaced by.
    pub brother: Option<NodeId>,

    // Counters refreshed by the compactor, read by the GPU export
    pub num_children: u32,
    pub num_even: u32,
    pub num_odd: u32,
}

impl SceneNode {
    /// Creates an empty node with an identity transform.
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            index: None,
            level: 0,
            children: Vec::new(),
            parents: Vec::new(),
            index_buffer_index: None,
            num_triangles: 0,
            total_primitive_count: 0,
            object_to_world: Matrix4::identity(),
            world_to_object: Matrix4::identity(),
            aabb: None,
            flags: NodeFlags::NONE,
            brother: None,
            num_children: 0,
            num_even: 0,
            num_odd: 0,
        }
    }

    /// Creates a synthesized node one level below `parent_level`.
    pub(crate) fn new_dummy(name: &str, parent_level: u32, children: Vec<NodeId>) -> Self {
        let mut node = Self::new(0, name);
        node.level = parent_level + 1;
        node.children = children;
        node
    }

    pub fn object_to_world(&self) -> Matrix4<f32> {
        self.object_to_world
    }

    pub fn world_to_object(&self) -> Matrix4<f32> {
        self.world_to_object
    }

    /// Sets the object-to-world transform and derives its inverse.
    pub fn set_transform(&mut self, object_to_world: Matrix4<f32>) {
        self.object_to_world = object_to_world;
        self.world_to_object = invert_or_identity(&object_to_world);
    }

    /// Gets the list of child node IDs.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Gets the parent node IDs (valid after the parents were rebuilt).
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Adds a child node ID to this node's children list.
    ///
    /// Parent links are not touched; use the `SceneGraph` methods to keep them consistent.
    pub(crate) fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn is_instance_list(&self) -> bool {
        self.flags.contains(NodeFlags::INSTANCE_LIST)
    }

    pub fn has_geometry(&self) -> bool {
        self.num_triangles > 0
    }

    pub fn tier(&self) -> Tier {
        Tier::of_level(self.level)
    }

    pub fn is_dummy_blas(&self) -> bool {
        self.name == DUMMY_BLAS_NAME
    }

    /// Removes the geometry reference from this node.
    pub(crate) fn clear_geometry(&mut self) {
        self.index_buffer_index = None;
        self.num_triangles = 0;
    }

    /// The level this node needs when hanging below a parent at `parent_level`,
    /// honoring forced parity.
    pub fn required_level(&self, parent_level: u32) -> u32 {
        let level = parent_level + 1;
        let odd = level % 2 == 1;
        if (self.flags.contains(NodeFlags::FORCE_ODD) && !odd)
            || (self.flags.contains(NodeFlags::FORCE_EVEN) && odd)
        {
            level + 1
        } else {
            level
        }
    }
}

impl fmt::Display for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "[{index}] ")?,
            None => write!(f, "[-] ")?,
        }
        write!(
            f,
            "{} level={} children={} triangles={} total={}",
            self.name,
            self.level,
            self.children.len(),
            self.num_triangles,
            self.total_primitive_count
        )?;
        if self.is_instance_list() {
            write!(f, " (instance list)")?;
        }
        Ok(())
    }
}
