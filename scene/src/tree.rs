use super::{NodeId, SceneGraph, SceneNode};

/// Trait for implementing graph traversal operations.
///
/// Implementors of this trait can be passed to [`walk_graph`] to perform
/// arbitrary operations on each node during traversal.
///
/// The visitor receives callbacks when entering and exiting nodes.
pub trait GraphVisitor {
    /// Called when entering a node (before processing its children).
    ///
    /// Returns true to continue traversing children, false to skip the subtree.
    fn enter_node(&mut self, node: &SceneNode) -> bool;

    /// Called when exiting a node (after processing its children).
    fn exit_node(&mut self, node: &SceneNode);
}

/// Walks the graph depth-first starting from a given node.
///
/// Shared nodes are visited once, the first time they are reached, so in an
/// acyclic graph every child has been exited before its parent exits. The walk
/// keeps its own stack, so graph depth is not limited by the thread's stack.
pub fn walk_graph<V: GraphVisitor>(graph: &SceneGraph, node_id: NodeId, visitor: &mut V) {
    let mut visited = vec![false; graph.len()];
    let mut stack = Vec::new();
    enter(graph, node_id, visitor, &mut visited, &mut stack);

    while let Some(frame) = stack.last_mut() {
        let (node, next) = *frame;
        match node.children().get(next) {
            Some(&child_id) => {
                frame.1 += 1;
                enter(graph, child_id, visitor, &mut visited, &mut stack);
            }
            None => {
                stack.pop();
                visitor.exit_node(node);
            }
        }
    }
}

/// Enters a node on first encounter and pushes it if its children should be walked.
fn enter<'g, V: GraphVisitor>(
    graph: &'g SceneGraph,
    node_id: NodeId,
    visitor: &mut V,
    visited: &mut [bool],
    stack: &mut Vec<(&'g SceneNode, usize)>,
) {
    let Some(node) = graph.get_node(node_id) else {
        return;
    };
    if std::mem::replace(&mut visited[node_id as usize], true) {
        return;
    }

    if visitor.enter_node(node) {
        stack.push((node, 0));
    } else {
        visitor.exit_node(node);
    }
}

/// Visitor that records which nodes are reachable.
pub(crate) struct ReachabilityCollector {
    pub reachable: Vec<bool>,
}

impl ReachabilityCollector {
    pub fn new(len: usize) -> Self {
        Self {
            reachable: vec![false; len],
        }
    }
}

impl GraphVisitor for ReachabilityCollector {
    fn enter_node(&mut self, node: &SceneNode) -> bool {
        self.reachable[node.id as usize] = true;
        true
    }

    fn exit_node(&mut self, _node: &SceneNode) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OrderRecorder {
        entered: Vec<NodeId>,
        exited: Vec<NodeId>,
    }

    impl GraphVisitor for OrderRecorder {
        fn enter_node(&mut self, node: &SceneNode) -> bool {
            self.entered.push(node.id);
            true
        }

        fn exit_node(&mut self, node: &SceneNode) {
            self.exited.push(node.id);
        }
    }

    #[test]
    fn test_walk_visits_shared_node_once() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let a = graph.add_node(Some(root), "A").unwrap();
        let b = graph.add_node(Some(root), "B").unwrap();
        let shared = graph.add_node(Some(a), "Shared").unwrap();
        graph.add_edge(b, shared).unwrap();

        let mut recorder = OrderRecorder { entered: Vec::new(), exited: Vec::new() };
        walk_graph(&graph, root, &mut recorder);

        assert_eq!(recorder.entered, vec![root, a, shared, b]);
        assert_eq!(recorder.exited, vec![shared, a, b, root]);
    }

    #[test]
    fn test_skipped_subtree_still_exits() {
        struct SkipA {
            skipped: NodeId,
            entered: Vec<NodeId>,
            exited: Vec<NodeId>,
        }

        impl GraphVisitor for SkipA {
            fn enter_node(&mut self, node: &SceneNode) -> bool {
                self.entered.push(node.id);
                node.id != self.skipped
            }

            fn exit_node(&mut self, node: &SceneNode) {
                self.exited.push(node.id);
            }
        }

        let mut graph = SceneGraph::new();
        let root = graph.root();
        let a = graph.add_node(Some(root), "A").unwrap();
        graph.add_node(Some(a), "Hidden").unwrap();
        let b = graph.add_node(Some(root), "B").unwrap();

        let mut visitor = SkipA { skipped: a, entered: Vec::new(), exited: Vec::new() };
        walk_graph(&graph, root, &mut visitor);

        assert_eq!(visitor.entered, vec![root, a, b]);
        assert_eq!(visitor.exited, vec![a, b, root]);
    }

    #[test]
    fn test_deep_chain_walk() {
        let mut graph = SceneGraph::new();
        let mut parent = graph.root();
        for i in 0..50_000 {
            parent = graph.add_node(Some(parent), format!("Link{i}")).unwrap();
        }

        let mut recorder = OrderRecorder { entered: Vec::new(), exited: Vec::new() };
        walk_graph(&graph, graph.root(), &mut recorder);

        assert_eq!(recorder.entered.len(), graph.len());
        assert_eq!(recorder.exited.first(), Some(&parent));
        assert_eq!(recorder.exited.last(), Some(&graph.root()));
    }

    #[test]
    fn test_reachability_skips_detached_nodes() {
        let mut graph = SceneGraph::new();
        let root = graph.root();
        let child = graph.add_node(Some(root), "Child").unwrap();
        let detached = graph.add_node(None, "Detached").unwrap();

        let mut collector = ReachabilityCollector::new(graph.len());
        walk_graph(&graph, root, &mut collector);

        assert!(collector.reachable[root as usize]);
        assert!(collector.reachable[child as usize]);
        assert!(!collector.reachable[detached as usize]);
    }
}
