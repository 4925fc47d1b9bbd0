use std::cmp::Ordering;

use crate::common::Axis;
use crate::{NodeId, SceneGraph, SceneNode};

use super::bounds::compute_subtree_bounds;
use super::CompileError;

/// Splits every instance list with more than `max_children` children until
/// all of them fit. Returns the number of splits performed.
///
/// Children are divided at the mean of their box centers along the list's
/// longest axis. When that leaves one side empty the children are sorted by
/// center and cut in half instead, so every split makes progress.
pub fn split_instance_lists(
    graph: &mut SceneGraph,
    max_children: usize,
) -> Result<usize, CompileError> {
    if max_children == 0 {
        return Err(CompileError::InvalidInstanceLimit);
    }

    graph.rebuild_parents();

    let reachable = graph.reachable();
    let mut work: Vec<NodeId> = graph
        .nodes
        .iter()
        .filter(|n| reachable[n.id as usize] && n.is_instance_list())
        .map(|n| n.id)
        .collect();

    let mut splits = 0;
    while let Some(list) = work.pop() {
        if graph.node(list).children().len() <= max_children {
            continue;
        }

        let right = split_node(graph, list)?;
        splits += 1;
        work.push(list);
        work.push(right);
    }

    Ok(splits)
}

/// Center of a child's box in the list's space, `None` for empty children.
fn child_center(node: &SceneNode, axis: Axis) -> Option<f32> {
    let aabb = node.aabb?.transform(&node.object_to_world());
    Some(axis.component(aabb.center()))
}

fn split_node(graph: &mut SceneGraph, list: NodeId) -> Result<NodeId, CompileError> {
    compute_subtree_bounds(graph, list)?;

    let node = graph.node(list);
    let axis = node.aabb.map(|b| b.largest_axis()).unwrap_or(Axis::X);

    let centers: Vec<(NodeId, Option<f32>)> = node
        .children()
        .iter()
        .map(|&c| (c, child_center(graph.node(c), axis)))
        .collect();

    let bounded: Vec<f32> = centers.iter().filter_map(|&(_, c)| c).collect();
    let mean = if bounded.is_empty() {
        f32::INFINITY
    } else {
        bounded.iter().sum::<f32>() / bounded.len() as f32
    };

    let (mut left, mut right): (Vec<NodeId>, Vec<NodeId>) = (Vec::new(), Vec::new());
    for &(child, center) in &centers {
        match center {
            Some(c) if c < mean => left.push(child),
            _ => right.push(child),
        }
    }

    if left.is_empty() || right.is_empty() {
        log::warn!(
            "Degenerate split of {} ({}) along {:?}, splitting by count",
            list,
            node.name,
            axis
        );
        let mut sorted = centers;
        // Empty children sort last
        sorted.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        let ids: Vec<NodeId> = sorted.into_iter().map(|(id, _)| id).collect();
        let (l, r) = ids.split_at(ids.len() / 2);
        left = l.to_vec();
        right = r.to_vec();
    }

    log::debug!(
        "Splitting {} ({}) into {} + {} children",
        list,
        node.name,
        left.len(),
        right.len()
    );

    let mut right_node = SceneNode::new(0, format!("R{}", node.name));
    right_node.flags = node.flags;
    right_node.level = node.level;
    right_node.set_transform(node.object_to_world());
    right_node.parents = node.parents().to_vec();
    right_node.children = right;

    let parents = right_node.parents.clone();
    let right_children = right_node.children.clone();
    let right_id = graph.push_node(right_node);

    let original = graph.node_mut(list);
    original.name = format!("L{}", original.name);
    original.children = left;

    for parent in parents {
        graph.node_mut(parent).add_child(right_id);
    }
    for child in right_children {
        for parent in &mut graph.node_mut(child).parents {
            if *parent == list {
                *parent = right_id;
            }
        }
    }

    Ok(right_id)
}
