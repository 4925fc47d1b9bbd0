//! Scene graph container and the compiler that turns it into a two-tier
//! (TLAS over BLAS) acceleration graph.
//!
//! Compiled graphs alternate strictly between even levels, which only hold
//! instance/transform references, and odd levels, which hold geometry.

pub mod buffers;
pub mod compile;
pub mod format;
pub mod gpu;
mod graph;
mod node;
pub mod tree;

pub use accel_graph_common as common;

pub use buffers::GeometryBuffers;
pub use compile::{
    compile, CompileError, CompileMode, CompileOptions, CompileReport, ValidationError,
    DEFAULT_MAX_INSTANCES_PER_LIST,
};
pub use graph::SceneGraph;
pub use node::{NodeFlags, NodeId, SceneNode, Tier, DUMMY_BLAS_NAME, DUMMY_TLAS_NAME};
pub use tree::{walk_graph, GraphVisitor};
