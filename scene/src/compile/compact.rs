use std::collections::HashSet;

use rayon::prelude::*;

use crate::{NodeId, SceneGraph, SceneNode};

use super::CompileError;

/// Outcome of [`compact`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Assigns flat buffer indices in depth-first order.
///
/// Each node first indexes all of its not yet indexed children, then
/// descends into exactly those. An instance list's single DummyBLAS therefore
/// lands right after the list, followed directly by all of its instances.
struct Indexer<'a> {
    graph: &'a SceneGraph,
    indices: Vec<Option<u32>>,
    order: Vec<NodeId>,
}

impl<'a> Indexer<'a> {
    fn new(graph: &'a SceneGraph) -> Self {
        Self {
            graph,
            indices: vec![None; graph.len()],
            order: Vec::with_capacity(graph.len()),
        }
    }

    /// Returns false if the node already had an index.
    fn assign(&mut self, id: NodeId) -> bool {
        let slot = &mut self.indices[id as usize];
        if slot.is_some() {
            return false;
        }
        *slot = Some(self.order.len() as u32);
        self.order.push(id);
        true
    }

    /// Indexes everything below `root` in the same order a recursive walk
    /// would, using an explicit stack.
    fn build_list(&mut self, root: NodeId) {
        let graph = self.graph;
        let mut pending = vec![root];
        while let Some(node_id) = pending.pop() {
            let fresh: Vec<NodeId> = graph
                .node(node_id)
                .children()
                .iter()
                .copied()
                .filter(|&c| self.assign(c))
                .collect();
            pending.extend(fresh.into_iter().rev());
        }
    }
}

/// Follows `brother` links to the node that survives deduplication.
fn final_brother(graph: &SceneGraph, id: NodeId) -> Result<NodeId, CompileError> {
    let mut current = id;
    for _ in 0..=graph.len() {
        match graph.node(current).brother {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }
    Err(CompileError::CycleDetected { node: id })
}

/// Points every reference to a duplicate at its surviving brother and clears
/// the markers. Returns the number of duplicates cut loose.
pub(crate) fn resolve_brothers(graph: &mut SceneGraph) -> Result<usize, CompileError> {
    if graph.nodes.iter().all(|n| n.brother.is_none()) {
        return Ok(0);
    }

    let targets = (0..graph.len() as NodeId)
        .map(|id| final_brother(graph, id))
        .collect::<Result<Vec<_>, _>>()?;
    let redirected = targets.iter().enumerate().filter(|&(id, &t)| id as NodeId != t).count();

    graph.nodes.par_iter_mut().for_each(|node| {
        let mut seen = HashSet::new();
        let children = std::mem::take(&mut node.children);
        node.children = children
            .into_iter()
            .map(|c| targets[c as usize])
            .filter(|&c| seen.insert(c))
            .collect();
        node.brother = None;
    });
    graph.root = targets[graph.root as usize];

    log::debug!("Redirected {} duplicate nodes to their brothers", redirected);
    Ok(redirected)
}

/// Drops unreachable nodes and rebuilds the arena in flat buffer order.
///
/// Afterwards every node's id equals its `index`, the root is node 0, parent
/// links and child counters are fresh, and duplicates marked with `brother`
/// are gone. Compacting an already compacted graph changes nothing.
pub fn compact(graph: &mut SceneGraph) -> Result<CompactionStats, CompileError> {
    resolve_brothers(graph)?;

    graph.nodes.par_iter_mut().for_each(|node| {
        node.index = None;
        node.parents.clear();
    });

    let mut indexer = Indexer::new(graph);
    indexer.assign(graph.root());
    indexer.build_list(graph.root());
    let Indexer { indices, order, .. } = indexer;

    let before = graph.len();
    let mut slots: Vec<Option<SceneNode>> =
        std::mem::take(&mut graph.nodes).into_iter().map(Some).collect();

    graph.nodes = order
        .iter()
        .filter_map(|&old| slots[old as usize].take())
        .enumerate()
        .map(|(new, mut node)| {
            node.id = new as NodeId;
            node.index = Some(new as u32);
            node.children = node
                .children
                .iter()
                .filter_map(|&c| indices[c as usize])
                .collect();
            node
        })
        .collect();
    graph.root = 0;

    graph.rebuild_parents();
    graph.refresh_counters();

    let stats = CompactionStats {
        kept: graph.len(),
        dropped: before - graph.len(),
    };
    Ok(stats)
}
