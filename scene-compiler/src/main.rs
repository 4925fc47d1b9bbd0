use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use accel_graph_scene::gpu::GpuSceneBuffers;
use accel_graph_scene::{
    compile, CompileMode, CompileOptions, CompileReport, SceneGraph, DEFAULT_MAX_INSTANCES_PER_LIST,
};
use anyhow::{bail, Context, Result};
use clap::Parser;

mod demo;

#[derive(Parser)]
#[command(name = "scene-compiler")]
#[command(about = "Compile .rtsg scene graphs into a two-tier acceleration structure layout")]
#[command(version)]
struct Cli {
    /// Input scene graph (.rtsg)
    input: Option<PathBuf>,

    /// Output path for the compiled graph (.rtsg)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the raw GPU node and index arrays to this file
    #[arg(long)]
    gpu_out: Option<PathBuf>,

    /// Leave the graph untouched for single-level consumers
    #[arg(long)]
    single_level: bool,

    /// Maximum number of children of one instance list
    #[arg(long, default_value_t = DEFAULT_MAX_INSTANCES_PER_LIST)]
    instance_limit: usize,

    /// Build a procedural scene with this many instances instead of loading one
    #[arg(long, value_name = "N")]
    demo: Option<usize>,

    /// Skip the structural validation after compiling
    #[arg(long)]
    no_validate: bool,

    /// Print the compiled graph
    #[arg(long)]
    print: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut graph = match (&cli.input, cli.demo) {
        (Some(_), Some(_)) => bail!("Pass either an input file or --demo, not both"),
        (None, None) => bail!("An input file or --demo is required"),
        (Some(path), None) => {
            eprintln!("Loading {}...", path.display());
            SceneGraph::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        (None, Some(instances)) => {
            eprintln!("Building demo scene with {} instances...", instances);
            demo::build_demo_scene(instances)?
        }
    };

    let options = CompileOptions {
        mode: if cli.single_level {
            CompileMode::SingleLevel
        } else {
            CompileMode::MultiLevel
        },
        max_instances_per_list: cli.instance_limit,
        validate: !cli.no_validate,
    };

    let report = compile(&mut graph, &options).context("Compilation failed")?;
    print_report(&report);

    if cli.print {
        for line in graph.diagnostic_lines() {
            println!("{line}");
        }
    }

    if let Some(output) = &cli.output {
        eprintln!("Saving to {}...", output.display());
        graph.save_to_file(output)?;
        let file_size = std::fs::metadata(output)?.len();
        eprintln!("Done. Output: {} ({})", output.display(), format_bytes(file_size));
    }

    if let Some(gpu_out) = &cli.gpu_out {
        let buffers = GpuSceneBuffers::from_graph(&graph)
            .context("GPU export needs a multi-level compile")?;
        let mut writer = BufWriter::new(File::create(gpu_out)?);
        buffers.write_to(&mut writer)?;
        eprintln!(
            "Wrote {} nodes and {} child indices to {}",
            buffers.nodes.len(),
            buffers.node_indices.len(),
            gpu_out.display()
        );
    }

    Ok(())
}

fn print_report(report: &CompileReport) {
    log::info!("Compile report:");
    log::info!("  Nodes:          {}", report.node_count);
    log::info!("  Primitives:     {}", report.total_primitives);
    log::info!("  Merged lists:   {}", report.merged_lists);
    log::info!("  Split lists:    {}", report.split_lists);
    log::info!("  DummyBLAS:      {}", report.dummy_blas);
    log::info!("  DummyTLAS:      {}", report.dummy_tlas);
    log::info!("  Dropped nodes:  {}", report.dropped_nodes);
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
