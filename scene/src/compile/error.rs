use thiserror::Error;

use crate::NodeId;

/// Errors that abort a compile.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Cycle detected at node {node}")]
    CycleDetected { node: NodeId },

    #[error("Instance list limit must be at least 1")]
    InvalidInstanceLimit,

    #[error("Scene graph references no primitives")]
    EmptyScene,

    #[error("Node {node} references triangle {triangle} outside the geometry buffers")]
    GeometryOutOfRange { node: NodeId, triangle: u32 },

    #[error("Node {node} has no buffer index, compact the graph before exporting")]
    NotCompacted { node: NodeId },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// A broken structural invariant found by the validator.
///
/// Every variant names the offending node by id and name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Root node {node} ({name}) must sit on level 0")]
    RootLevel { node: NodeId, name: String },

    #[error("Child {child} of node {node} ({name}) must be on a deeper level")]
    LevelOrder { node: NodeId, name: String, child: NodeId },

    #[error("Node {node} ({name}) and its child {child} share level parity")]
    ParityClash { node: NodeId, name: String, child: NodeId },

    #[error("Even level node {node} ({name}) references geometry")]
    EvenGeometry { node: NodeId, name: String },

    #[error("Instance list {node} ({name}) must have an even level")]
    InstanceListLevel { node: NodeId, name: String },

    #[error("Instance list {node} ({name}) can not contain geometry")]
    InstanceListGeometry { node: NodeId, name: String },

    #[error("Instance list {node} ({name}) must have exactly one child, found {count}")]
    InstanceListChildCount { node: NodeId, name: String, count: usize },

    #[error("Child {child} of instance list {node} ({name}) is not a DummyBLAS")]
    InstanceListChildNotDummy { node: NodeId, name: String, child: NodeId },

    #[error("Instance list element {node} ({name}) must have an even level")]
    InstanceElementLevel { node: NodeId, name: String },

    #[error("Instance list element {node} ({name}) can not reference triangles")]
    InstanceElementGeometry { node: NodeId, name: String },

    #[error("Parent {parent} of instance list element {node} ({name}) is not a DummyBLAS")]
    InstanceElementParent { node: NodeId, name: String, parent: NodeId },

    #[error("Grandparent {grandparent} of instance element {node} ({name}) is not an instance list")]
    InstanceElementGrandparent { node: NodeId, name: String, grandparent: NodeId },

    #[error("Node {node} ({name}) has no buffer index")]
    IndexUnset { node: NodeId, name: String },

    #[error("Node {node} ({name}) claims buffer index {index}")]
    IndexMismatch { node: NodeId, name: String, index: u32 },

    #[error("Node {node} ({name}) counts {counted} children but has {actual}")]
    ChildCountMismatch { node: NodeId, name: String, counted: u32, actual: usize },

    #[error("Node {node} ({name}) references nothing")]
    Dangling { node: NodeId, name: String },

    #[error("Node {node} ({name}) contains geometry but no index buffer offset")]
    MissingIndexBuffer { node: NodeId, name: String },

    #[error("Node {node} ({name}) duplicates {brother} and should have been removed")]
    DuplicateSurvived { node: NodeId, name: String, brother: NodeId },
}
