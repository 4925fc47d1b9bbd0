//! GPU-ready buffers of a compiled graph.
//!
//! The node array mirrors the compiled arena one to one: entry `i` is node
//! `i`, children are referenced through a flat `u32` index array.

use std::io::Write;

use crate::common::matrix_to_array;
use crate::{CompileError, SceneGraph, SceneNode};

/// One node as the ray tracing shaders read it.
///
/// Missing values (no geometry, empty bounds) are encoded as `-1` indices and
/// an inverted box with `w == 0`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneNode {
    pub transform: [[f32; 4]; 4],
    pub index_buffer_index: i32,
    pub num_triangles: i32,
    pub num_children: i32,
    /// First entry of this node's children in the node index array
    pub children_index: i32,
    pub index: i32,
    pub level: i32,
    _padding: [i32; 2], // 16 byte alignment of the boxes
    pub aabb_min: [f32; 4],
    pub aabb_max: [f32; 4],
}

impl GpuSceneNode {
    fn from_node(node: &SceneNode, index: u32, children_index: usize) -> Self {
        let (aabb_min, aabb_max) = match node.aabb {
            Some(aabb) => (
                [aabb.min.x, aabb.min.y, aabb.min.z, 1.0],
                [aabb.max.x, aabb.max.y, aabb.max.z, 1.0],
            ),
            None => ([f32::MAX, f32::MAX, f32::MAX, 0.0], [f32::MIN, f32::MIN, f32::MIN, 0.0]),
        };

        Self {
            transform: matrix_to_array(&node.object_to_world()),
            index_buffer_index: node.index_buffer_index.map_or(-1, |i| i as i32),
            num_triangles: node.num_triangles as i32,
            num_children: node.children().len() as i32,
            children_index: children_index as i32,
            index: index as i32,
            level: node.level as i32,
            _padding: [0; 2],
            aabb_min,
            aabb_max,
        }
    }
}

/// Flat node and child index arrays of a compiled graph.
#[derive(Debug, Clone, Default)]
pub struct GpuSceneBuffers {
    pub nodes: Vec<GpuSceneNode>,
    pub node_indices: Vec<u32>,
}

impl GpuSceneBuffers {
    /// Flattens a compacted graph.
    ///
    /// # Errors
    /// Returns [`CompileError::NotCompacted`] if any node lacks its final index
    /// or sits at a different position than its index says.
    pub fn from_graph(graph: &SceneGraph) -> Result<Self, CompileError> {
        let mut buffers = Self {
            nodes: Vec::with_capacity(graph.len()),
            node_indices: Vec::new(),
        };

        for (position, node) in graph.nodes.iter().enumerate() {
            let index = match node.index {
                Some(index) if index as usize == position => index,
                _ => return Err(CompileError::NotCompacted { node: node.id }),
            };

            let children_index = buffers.node_indices.len();
            buffers.node_indices.extend_from_slice(node.children());
            buffers.nodes.push(GpuSceneNode::from_node(node, index, children_index));
        }

        log::debug!(
            "Flattened {} nodes with {} child references",
            buffers.nodes.len(),
            buffers.node_indices.len()
        );
        Ok(buffers)
    }

    pub fn node_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.node_indices)
    }

    /// Writes the node array followed by the index array.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.node_bytes())?;
        writer.write_all(self.index_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile, CompileOptions};
    use cgmath::{Matrix4, Point3, SquareMatrix};

    fn compiled_graph() -> SceneGraph {
        let mut graph = SceneGraph::new();
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = graph.add_mesh_node(None, "Mesh", &positions, &[0, 1, 2]).unwrap();
        let list = graph.add_instance_list(Some(graph.root()), "List").unwrap();
        for i in 0..3 {
            let offset = Matrix4::from_translation([i as f32, 0.0, 0.0].into());
            graph.add_instance(list, format!("I{i}"), offset, mesh).unwrap();
        }
        compile(&mut graph, &CompileOptions::default()).unwrap();
        graph
    }

    #[test]
    fn test_node_layout_size() {
        assert_eq!(std::mem::size_of::<GpuSceneNode>(), 128);
    }

    #[test]
    fn test_children_ranges_match_graph() {
        let graph = compiled_graph();

        let buffers = GpuSceneBuffers::from_graph(&graph).unwrap();

        assert_eq!(buffers.nodes.len(), graph.len());
        for (node, gpu) in graph.nodes.iter().zip(&buffers.nodes) {
            let start = gpu.children_index as usize;
            let end = start + gpu.num_children as usize;
            assert_eq!(&buffers.node_indices[start..end], node.children());
            assert_eq!(gpu.index as u32, node.id);
            assert_eq!(gpu.level as u32, node.level);
        }
    }

    #[test]
    fn test_geometry_and_bounds_encoding() {
        let graph = compiled_graph();
        let buffers = GpuSceneBuffers::from_graph(&graph).unwrap();

        let root = &buffers.nodes[0];
        assert_eq!(root.index_buffer_index, -1);
        assert_eq!(root.aabb_min, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(root.aabb_max, [3.0, 1.0, 0.0, 1.0]);

        let mesh = graph.nodes.iter().position(|n| n.name == "Mesh").unwrap();
        assert_eq!(buffers.nodes[mesh].index_buffer_index, 0);
        assert_eq!(buffers.nodes[mesh].num_triangles, 1);
    }

    #[test]
    fn test_uncompiled_graph_rejected() {
        let mut graph = SceneGraph::new();
        graph.add_node(Some(0), "Child").unwrap();

        assert!(matches!(
            GpuSceneBuffers::from_graph(&graph),
            Err(CompileError::NotCompacted { node: 0 })
        ));
    }

    #[test]
    fn test_write_to_concatenates_arrays() {
        let graph = compiled_graph();
        let buffers = GpuSceneBuffers::from_graph(&graph).unwrap();

        let mut out = Vec::new();
        buffers.write_to(&mut out).unwrap();

        assert_eq!(out.len(), buffers.nodes.len() * 128 + buffers.node_indices.len() * 4);
        let identity: [[f32; 4]; 4] = Matrix4::<f32>::identity().into();
        assert_eq!(buffers.nodes[0].transform, identity);
        assert_eq!(&out[..4], bytemuck::bytes_of(&buffers.nodes[0].transform[0][0]));
    }
}
