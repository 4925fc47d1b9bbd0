use rayon::prelude::*;

use crate::{SceneGraph, SceneNode, Tier};

use super::ValidationError;

/// Checks every structural invariant of a compiled graph.
///
/// Nodes are checked in parallel; the violation of the node with the lowest
/// buffer position is returned, so the result does not depend on scheduling.
pub fn validate(graph: &SceneGraph) -> Result<(), ValidationError> {
    let first = graph
        .nodes
        .par_iter()
        .enumerate()
        .filter_map(|(position, node)| validate_node(graph, position, node).err())
        .find_first(|_| true);

    first.map_or(Ok(()), Err)
}

fn validate_node(
    graph: &SceneGraph,
    position: usize,
    node: &SceneNode,
) -> Result<(), ValidationError> {
    let id = node.id;
    let name = || node.name.clone();

    if id == graph.root() && node.level != 0 {
        return Err(ValidationError::RootLevel { node: id, name: name() });
    }

    for &child_id in node.children() {
        let child = graph.node(child_id);
        if child.level <= node.level {
            return Err(ValidationError::LevelOrder { node: id, name: name(), child: child_id });
        }
        if child.tier() == node.tier() {
            return Err(ValidationError::ParityClash { node: id, name: name(), child: child_id });
        }
    }

    if node.is_instance_list() {
        validate_instance_list(graph, node)?;
    }

    if node.tier() == Tier::Instance && node.has_geometry() {
        return Err(ValidationError::EvenGeometry { node: id, name: name() });
    }

    match node.index {
        None => return Err(ValidationError::IndexUnset { node: id, name: name() }),
        Some(index) if index as usize != position || id as usize != position => {
            return Err(ValidationError::IndexMismatch { node: id, name: name(), index });
        }
        Some(_) => {}
    }

    let actual = node.children().len();
    if node.num_children as usize != actual || (node.num_even + node.num_odd) as usize != actual {
        return Err(ValidationError::ChildCountMismatch {
            node: id,
            name: name(),
            counted: node.num_children,
            actual,
        });
    }

    if actual == 0 && !node.has_geometry() {
        return Err(ValidationError::Dangling { node: id, name: name() });
    }

    if node.has_geometry() && node.index_buffer_index.is_none() {
        return Err(ValidationError::MissingIndexBuffer { node: id, name: name() });
    }

    if let Some(brother) = node.brother {
        return Err(ValidationError::DuplicateSurvived { node: id, name: name(), brother });
    }

    Ok(())
}

/// Instance list -> single DummyBLAS -> instances, each only below such dummies.
fn validate_instance_list(graph: &SceneGraph, list: &SceneNode) -> Result<(), ValidationError> {
    let name = || list.name.clone();

    if list.tier() != Tier::Instance {
        return Err(ValidationError::InstanceListLevel { node: list.id, name: name() });
    }
    if list.has_geometry() {
        return Err(ValidationError::InstanceListGeometry { node: list.id, name: name() });
    }

    let [dummy_id] = list.children() else {
        return Err(ValidationError::InstanceListChildCount {
            node: list.id,
            name: name(),
            count: list.children().len(),
        });
    };
    let dummy = graph.node(*dummy_id);
    if !dummy.is_dummy_blas() {
        return Err(ValidationError::InstanceListChildNotDummy {
            node: list.id,
            name: name(),
            child: *dummy_id,
        });
    }

    for &element_id in dummy.children() {
        let element = graph.node(element_id);
        let name = || element.name.clone();

        if element.tier() != Tier::Instance {
            return Err(ValidationError::InstanceElementLevel { node: element_id, name: name() });
        }
        if element.has_geometry() {
            return Err(ValidationError::InstanceElementGeometry {
                node: element_id,
                name: name(),
            });
        }

        for &parent_id in element.parents() {
            let parent = graph.node(parent_id);
            if !parent.is_dummy_blas() {
                return Err(ValidationError::InstanceElementParent {
                    node: element_id,
                    name: name(),
                    parent: parent_id,
                });
            }
            let stray = parent.parents().iter().find(|&&g| !graph.node(g).is_instance_list());
            if let Some(&grandparent) = stray {
                return Err(ValidationError::InstanceElementGrandparent {
                    node: element_id,
                    name: name(),
                    grandparent,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compact, compile, CompileOptions};
    use crate::{NodeFlags, NodeId};
    use cgmath::{Matrix4, Point3, SquareMatrix};

    fn compiled_instances() -> SceneGraph {
        let mut graph = SceneGraph::new();
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mesh = graph.add_mesh_node(None, "Mesh", &positions, &[0, 1, 2]).unwrap();
        let list = graph.add_instance_list(Some(graph.root()), "List").unwrap();
        graph.add_instance(list, "A", Matrix4::identity(), mesh).unwrap();
        graph.add_instance(list, "B", Matrix4::from_scale(2.0), mesh).unwrap();
        compile(&mut graph, &CompileOptions::default()).unwrap();
        graph
    }

    fn find(graph: &SceneGraph, name: &str) -> NodeId {
        graph.nodes.iter().find(|n| n.name == name).map(|n| n.id).unwrap()
    }

    #[test]
    fn test_compiled_graph_is_valid() {
        let graph = compiled_instances();
        assert_eq!(validate(&graph), Ok(()));
    }

    #[test]
    fn test_root_level_checked() {
        let mut graph = compiled_instances();
        graph.node_mut(0).level = 2;

        assert!(matches!(validate(&graph), Err(ValidationError::RootLevel { node: 0, .. })));
    }

    #[test]
    fn test_parity_clash_detected() {
        let mut graph = SceneGraph::new();
        let group = graph.add_node(Some(graph.root()), "Group").unwrap();
        let positions = [Point3::new(0.0, 0.0, 0.0); 3];
        let mesh = graph.add_mesh_node(Some(group), "Mesh", &positions, &[0, 1, 2]).unwrap();
        graph.node_mut(group).level = 2;
        graph.node_mut(mesh).level = 3;
        compact(&mut graph).unwrap();

        let result = validate(&graph);
        assert!(
            matches!(result, Err(ValidationError::ParityClash { node: 0, child: 1, .. })),
            "{result:?}"
        );
    }

    #[test]
    fn test_level_order_checked() {
        let mut graph = compiled_instances();
        let mesh = find(&graph, "Mesh");
        graph.node_mut(mesh).level = 3;

        let result = validate(&graph);
        let a = find(&graph, "A");
        assert!(
            matches!(
                result,
                Err(ValidationError::LevelOrder { node, child, .. }) if node == a && child == mesh
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_even_geometry_detected() {
        let mut graph = compiled_instances();
        graph.node_mut(0).num_triangles = 1;
        graph.node_mut(0).index_buffer_index = Some(0);

        assert!(matches!(validate(&graph), Err(ValidationError::EvenGeometry { node: 0, .. })));
    }

    #[test]
    fn test_instance_element_geometry_detected() {
        let mut graph = compiled_instances();
        let instance = find(&graph, "A");
        graph.node_mut(instance).num_triangles = 1;
        graph.node_mut(instance).index_buffer_index = Some(0);

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceElementGeometry { node, .. }) if node == instance
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_list_level_checked() {
        let mut graph = compiled_instances();
        // The DummyBLAS below the root sits on level 1
        let odd = graph.node(0).children()[0];
        graph.node_mut(odd).flags.insert(NodeFlags::INSTANCE_LIST);

        let result = validate(&graph);
        assert!(
            matches!(result, Err(ValidationError::InstanceListLevel { node, .. }) if node == odd),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_list_geometry_detected() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        graph.node_mut(list).num_triangles = 1;
        graph.node_mut(list).index_buffer_index = Some(0);

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceListGeometry { node, .. }) if node == list
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_list_child_count_checked() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        let dummy = graph.node(list).children()[0];
        graph.node_mut(list).children.push(dummy);

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceListChildCount { node, count: 2, .. }) if node == list
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_list_child_must_be_dummy() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        let dummy = graph.node(list).children()[0];
        graph.node_mut(dummy).name = "Renamed".to_string();

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceListChildNotDummy { node, child, .. })
                    if node == list && child == dummy
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_element_level_checked() {
        let mut graph = compiled_instances();
        let instance = find(&graph, "A");
        graph.node_mut(instance).level = 5;

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceElementLevel { node, .. }) if node == instance
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_instance_element_grandparent_checked() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        let dummy = graph.node(list).children()[0];
        // Root reaching the list's DummyBLAS directly keeps levels and parity intact
        graph.node_mut(0).children.push(dummy);
        graph.rebuild_parents();
        graph.refresh_counters();

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::InstanceElementGrandparent { grandparent: 0, .. })
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_child_count_mismatch_detected() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        graph.node_mut(list).num_children = 5;

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::ChildCountMismatch { node, counted: 5, actual: 1, .. })
                    if node == list
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_parity_counters_checked() {
        let mut graph = compiled_instances();
        let list = find(&graph, "List");
        graph.node_mut(list).num_even += 1;

        let result = validate(&graph);
        assert!(
            matches!(
                result,
                Err(ValidationError::ChildCountMismatch { node, counted: 1, actual: 1, .. })
                    if node == list
            ),
            "{result:?}"
        );
    }

    #[test]
    fn test_missing_index_buffer_detected() {
        let mut graph = compiled_instances();
        let mesh = find(&graph, "Mesh");
        graph.node_mut(mesh).index_buffer_index = None;

        assert_eq!(
            validate(&graph),
            Err(ValidationError::MissingIndexBuffer { node: mesh, name: "Mesh".to_string() })
        );
    }

    #[test]
    fn test_unset_index_detected() {
        let mut graph = compiled_instances();
        let mesh = find(&graph, "Mesh");
        graph.node_mut(mesh).index = None;

        assert_eq!(
            validate(&graph),
            Err(ValidationError::IndexUnset { node: mesh, name: "Mesh".to_string() })
        );
    }

    #[test]
    fn test_dangling_node_detected() {
        let mut graph = compiled_instances();
        let mesh = find(&graph, "Mesh");
        graph.node_mut(mesh).num_triangles = 0;

        assert_eq!(
            validate(&graph),
            Err(ValidationError::Dangling { node: mesh, name: "Mesh".to_string() })
        );
    }

    #[test]
    fn test_surviving_brother_detected() {
        let mut graph = compiled_instances();
        let mesh = find(&graph, "Mesh");
        graph.node_mut(mesh).brother = Some(0);

        assert!(matches!(
            validate(&graph),
            Err(ValidationError::DuplicateSurvived { brother: 0, .. })
        ));
    }

    #[test]
    fn test_index_mismatch_detected() {
        let mut graph = compiled_instances();
        graph.node_mut(1).index = Some(7);

        assert!(matches!(
            validate(&graph),
            Err(ValidationError::IndexMismatch { node: 1, index: 7, .. })
        ));
    }
}
