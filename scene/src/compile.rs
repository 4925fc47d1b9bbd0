//! The scene graph compiler.
//!
//! [`compile`] runs the passes in order over one graph, mutating it in place
//! until it has the strict two-tier shape a TLAS-over-BLAS consumer expects.

mod bounds;
mod compact;
mod error;
mod levels;
mod merge;
mod parity;
mod split;
mod validate;


pub use bounds::{compute_bounds, reset_bounds};
pub use compact::{compact, CompactionStats};
pub use error::{CompileError, ValidationError};
pub use levels::assign_levels;
pub use merge::merge_instance_lists;
pub use parity::{normalize_parity, ParityStats};
pub use split::split_instance_lists;
pub use validate::validate;

use compact::resolve_brothers;

use crate::SceneGraph;

/// Default fan-out ceiling of a single instance list.
pub const DEFAULT_MAX_INSTANCES_PER_LIST: usize = 1 << 22;

/// How the graph should be laid out for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Flat consumer, the graph is passed through untouched
    SingleLevel,
    /// Alternating instance/geometry levels
    #[default]
    MultiLevel,
}

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub mode: CompileMode,
    /// Maximum number of children of one instance list.
    pub max_instances_per_list: usize,
    /// Check every invariant after compaction.
    pub validate: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            mode: CompileMode::MultiLevel,
            max_instances_per_list: DEFAULT_MAX_INSTANCES_PER_LIST,
            validate: true,
        }
    }
}

/// What a compile did to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub merged_lists: usize,
    pub split_lists: usize,
    pub dummy_blas: usize,
    pub dummy_tlas: usize,
    /// Nodes dropped as unreachable by the compactor.
    pub dropped_nodes: usize,
    pub node_count: usize,
    pub total_primitives: u64,
}

/// Compiles `graph` in place into the alternating two-tier layout.
///
/// On success every node has its final `index` (equal to its id), the root
/// sits at index 0 and, unless disabled in `options`, every structural
/// invariant has been checked. On error the graph is left half-compiled and
/// must not be consumed.
pub fn compile(
    graph: &mut SceneGraph,
    options: &CompileOptions,
) -> Result<CompileReport, CompileError> {
    if options.max_instances_per_list == 0 {
        return Err(CompileError::InvalidInstanceLimit);
    }

    if options.mode == CompileMode::SingleLevel {
        log::info!("Single-level mode, leaving {} nodes untouched", graph.len());
        return Ok(CompileReport {
            node_count: graph.len(),
            ..Default::default()
        });
    }

    log::info!("Compiling scene graph of {} nodes", graph.len());

    let duplicates = resolve_brothers(graph)?;
    if duplicates > 0 {
        log::info!("Redirected {} duplicate nodes", duplicates);
    }

    assign_levels(graph)?;

    let merged_lists = merge_instance_lists(graph);
    log::info!("Merged {} instance lists", merged_lists);

    let split_lists = split_instance_lists(graph, options.max_instances_per_list)?;
    log::info!(
        "Split {} instance lists above {} children",
        split_lists,
        options.max_instances_per_list
    );

    // Split halves and merged lists need their levels settled again
    assign_levels(graph)?;

    let total_primitives = graph.node(graph.root()).total_primitive_count;
    if total_primitives == 0 {
        return Err(CompileError::EmptyScene);
    }

    let parity = normalize_parity(graph);
    log::info!(
        "Added {} DummyBLAS and {} DummyTLAS nodes",
        parity.dummy_blas,
        parity.dummy_tlas
    );

    compute_bounds(graph)?;

    let compaction = compact(graph)?;
    log::info!(
        "Compacted to {} nodes, dropped {} unreachable",
        compaction.kept,
        compaction.dropped
    );

    if options.validate {
        validate(graph)?;
        log::info!("Validation passed");
    }

    Ok(CompileReport {
        merged_lists,
        split_lists,
        dummy_blas: parity.dummy_blas,
        dummy_tlas: parity.dummy_tlas,
        dropped_nodes: compaction.dropped,
        node_count: graph.len(),
        total_primitives,
    })
}
