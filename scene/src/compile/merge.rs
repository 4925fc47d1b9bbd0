use std::collections::BTreeSet;

use crate::common::is_identity;
use crate::{NodeId, SceneGraph};

/// Merges sibling instance lists into one list where that is provably safe.
///
/// For a node with several instance-list children the merge only happens if
/// every candidate list has an identity transform and every parent of any
/// candidate references exactly the same set of instance lists. Anything else
/// is left untouched.
///
/// Returns the number of merges performed.
pub fn merge_instance_lists(graph: &mut SceneGraph) -> usize {
    graph.rebuild_parents();

    let mut merges = 0;
    for node_id in 0..graph.len() as NodeId {
        let candidates = instance_list_children(graph, node_id);
        if candidates.len() < 2 {
            continue;
        }

        if let Some(reason) = refusal_reason(graph, &candidates) {
            log::debug!(
                "Not merging instance lists of {} ({}): {}",
                node_id,
                graph.node(node_id).name,
                reason
            );
            continue;
        }

        merge_candidates(graph, &candidates);
        graph.rebuild_parents();
        merges += 1;
    }

    merges
}

/// Instance-list children of a node in first-seen order, without repeats.
fn instance_list_children(graph: &SceneGraph, node_id: NodeId) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    graph
        .node(node_id)
        .children()
        .iter()
        .copied()
        .filter(|&c| graph.node(c).is_instance_list() && seen.insert(c))
        .collect()
}

fn refusal_reason(graph: &SceneGraph, candidates: &[NodeId]) -> Option<&'static str> {
    if !candidates.iter().all(|&c| is_identity(&graph.node(c).object_to_world())) {
        return Some("instance lists have non-identity transforms");
    }

    let expected: BTreeSet<NodeId> = candidates.iter().copied().collect();
    let consistent = affected_parents(graph, candidates).into_iter().all(|parent| {
        let lists: BTreeSet<NodeId> = instance_list_children(graph, parent).into_iter().collect();
        lists == expected
    });
    if !consistent {
        return Some("another parent references a different set of instance lists");
    }

    None
}

fn affected_parents(graph: &SceneGraph, candidates: &[NodeId]) -> BTreeSet<NodeId> {
    candidates
        .iter()
        .flat_map(|&c| graph.node(c).parents().iter().copied())
        .collect()
}

fn merge_candidates(graph: &mut SceneGraph, candidates: &[NodeId]) {
    let survivor = candidates[0];
    let parents = affected_parents(graph, candidates);

    let elements: Vec<NodeId> = candidates
        .iter()
        .flat_map(|&c| graph.node(c).children().to_vec())
        .collect();

    for &element in &elements {
        let node = graph.node_mut(element);
        node.parents.clear();
        node.parents.push(survivor);
    }
    for &candidate in candidates {
        graph.node_mut(candidate).children.clear();
    }

    let count = elements.len();
    graph.node_mut(survivor).children = elements;

    for parent in parents {
        let mut children: Vec<NodeId> = graph
            .node(parent)
            .children()
            .iter()
            .copied()
            .filter(|&c| !graph.node(c).is_instance_list())
            .collect();
        children.push(survivor);
        graph.node_mut(parent).children = children;
    }

    let name = &mut graph.node_mut(survivor).name;
    name.push_str(&format!(" Merge {count}"));
    log::debug!("Merged {} instance lists into {}", candidates.len(), name);
}
