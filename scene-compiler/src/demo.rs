use anyhow::Result;
use cgmath::{Matrix4, Point3, Vector3};

use accel_graph_scene::SceneGraph;

/// Unit cube as 12 triangles.
fn cube() -> (Vec<Point3<f32>>, Vec<u32>) {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // -z
        4, 5, 6, 4, 6, 7, // +z
        0, 1, 5, 0, 5, 4, // -y
        3, 7, 6, 3, 6, 2, // +y
        0, 4, 7, 0, 7, 3, // -x
        1, 2, 6, 1, 6, 5, // +x
    ];
    (positions, indices)
}

/// Builds a procedural scene: a grid of `instances` cubes in one instance
/// list, a ground quad hanging off the root and a group holding its own
/// triangles.
pub fn build_demo_scene(instances: usize) -> Result<SceneGraph> {
    let mut graph = SceneGraph::new();
    let root = graph.root();

    let (positions, indices) = cube();
    let cube = graph.add_mesh_node(None, "Cube", &positions, &indices)?;

    let list = graph.add_instance_list(Some(root), "Cubes")?;
    let side = (instances as f32).sqrt().ceil().max(1.0) as usize;
    for i in 0..instances {
        let (x, z) = ((i % side) as f32 * 2.0, (i / side) as f32 * 2.0);
        let offset = Matrix4::from_translation(Vector3::new(x, 0.0, z));
        graph.add_instance(list, format!("Cube{i}"), offset, cube)?;
    }

    let extent = side as f32 * 2.0;
    let ground = [
        Point3::new(-1.0, -0.1, -1.0),
        Point3::new(extent, -0.1, -1.0),
        Point3::new(extent, -0.1, extent),
        Point3::new(-1.0, -0.1, extent),
    ];
    graph.add_mesh_node(Some(root), "Ground", &ground, &[0, 2, 1, 0, 3, 2])?;

    let lift = Matrix4::from_translation(Vector3::new(0.0, 5.0, 0.0));
    let group = graph.add_transform_node(Some(root), "Sign", lift)?;
    let (start, count) = graph.buffers.push_triangles(&positions, &indices);
    let sign = graph.get_node_mut(group).ok_or_else(|| anyhow::anyhow!("Sign node missing"))?;
    sign.index_buffer_index = Some(start);
    sign.num_triangles = count;
    let post = Matrix4::from_nonuniform_scale(0.2, 5.0, 0.2);
    let pole = graph.add_transform_node(Some(group), "Pole", post)?;
    graph.add_edge(pole, cube)?;

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accel_graph_scene::{compile, CompileOptions};

    #[test]
    fn test_demo_scene_compiles() {
        let mut graph = build_demo_scene(20).unwrap();

        let report = compile(&mut graph, &CompileOptions::default()).unwrap();

        assert_eq!(report.node_count, graph.len());
        // 20 cubes, the ground, the sign and the pole cube
        assert_eq!(report.total_primitives, 20 * 12 + 2 + 12 + 12);
    }

    #[test]
    fn test_demo_scene_splits() {
        let mut graph = build_demo_scene(9).unwrap();
        let options = CompileOptions {
            max_instances_per_list: 4,
            ..Default::default()
        };

        let report = compile(&mut graph, &options).unwrap();
        assert!(report.split_lists >= 2);
    }
}
