mod archive;
mod bytecode;
mod emit;
mod engine;
mod graph;
mod ir;
mod patch;
mod reader;
mod rules;
mod structure;
mod targets;
#[cfg(test)]
mod testing;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::patch::{ApplyRequest, DiffRequest, ExternalPatchTool, PatchOutput, PatchTool};
use crate::rules::RuleGroup;
use crate::targets::CallTarget;

/// CLI arguments for atgen execution.
#[derive(Parser, Debug)]
#[command(
    name = "atgen",
    about = "Generate access transformers and source patches from JVM class structure.",
    version
)]
struct Cli {
    #[arg(long, global = true)]
    quiet: bool,
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an access transformer file from rule groups.
    Generate(GenerateArgs),
    /// List classes that call a given virtual method.
    CallTargets(CallTargetsArgs),
    /// Diff a modified source tree against pristine sources.
    Diff(DiffArgs),
    /// Apply source patches to pristine sources.
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "PATH")]
    rules: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    #[arg(long)]
    timing: bool,
}

#[derive(Args, Debug)]
struct CallTargetsArgs {
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    #[arg(long, value_name = "NAME")]
    method: String,
    #[arg(long, value_name = "DESCRIPTOR")]
    descriptor: String,
    /// Internal name of a class to leave out, e.g. `net/minecraft/world/level/BaseSpawner`.
    #[arg(long, value_name = "CLASS")]
    exclude: Vec<String>,
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DiffArgs {
    /// Patch tool command line, e.g. `--tool java --tool -jar --tool DiffPatch.jar`.
    #[arg(long = "tool", value_name = "ARG", required = true, allow_hyphen_values = true)]
    tool: Vec<String>,
    #[arg(long, value_name = "PATH")]
    base: PathBuf,
    #[arg(long, value_name = "DIR")]
    modified: PathBuf,
    #[arg(long, value_name = "DIR", conflicts_with = "patches_archive")]
    patches_dir: Option<PathBuf>,
    #[arg(long, value_name = "PATH", required_unless_present = "patches_dir")]
    patches_archive: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[arg(long = "tool", value_name = "ARG", required = true, allow_hyphen_values = true)]
    tool: Vec<String>,
    #[arg(long, value_name = "PATH")]
    base: PathBuf,
    #[arg(long, value_name = "DIR")]
    patches: PathBuf,
    #[arg(long, value_name = "PATH")]
    output: PathBuf,
    #[arg(long, value_name = "DIR")]
    rejects: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);
    run(cli)
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.quiet {
        EnvFilter::new("off")
    } else if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => generate(args, cli.quiet),
        Command::CallTargets(args) => call_targets(args),
        Command::Diff(args) => diff(args),
        Command::Apply(args) => apply(args),
    }
}

fn generate(args: GenerateArgs, quiet: bool) -> Result<()> {
    ensure_exists(&args.input)?;
    let started_at = Instant::now();
    let groups = rules::load_rules(&args.rules)?;
    let (text, class_count) = generate_text(&args.input, &groups)?;
    emit::write_string_safe(&args.output, &text)?;

    if args.timing && !quiet {
        eprintln!(
            "timing: total_ms={} classes={} groups={}",
            started_at.elapsed().as_millis(),
            class_count,
            groups.len()
        );
    }
    Ok(())
}

/// Access transformer text for the archive at `input`, and the number of graph nodes.
fn generate_text(input: &Path, groups: &[RuleGroup]) -> Result<(String, usize)> {
    let graph = archive::read_class_graph(input)?;
    info!(classes = graph.len(), groups = groups.len(), "built class graph");
    let outputs = engine::evaluate(&graph, groups)?;
    Ok((emit::render(outputs), graph.len()))
}

fn call_targets(args: CallTargetsArgs) -> Result<()> {
    ensure_exists(&args.input)?;
    let target = CallTarget {
        name: args.method,
        descriptor: args.descriptor,
    };
    let excluded: BTreeSet<String> = args.exclude.into_iter().collect();
    let matched = targets::scan_call_targets(&args.input, &target, &excluded)?;
    info!(classes = matched.len(), "found call targets");
    emit::write_string_safe(&args.output, &targets::render_targets(&matched)?)
}

fn diff(args: DiffArgs) -> Result<()> {
    ensure_exists(&args.base)?;
    ensure_exists(&args.modified)?;
    let output = match (args.patches_archive, args.patches_dir) {
        (Some(archive), _) => PatchOutput::Archive(archive),
        (None, Some(dir)) => PatchOutput::Directory(dir),
        (None, None) => anyhow::bail!("either --patches-dir or --patches-archive is required"),
    };
    let tool = ExternalPatchTool::new(&args.tool)?;
    tool.diff(&DiffRequest {
        base: args.base,
        modified: args.modified,
        output,
    })?;
    Ok(())
}

fn apply(args: ApplyArgs) -> Result<()> {
    ensure_exists(&args.base)?;
    ensure_exists(&args.patches)?;
    let tool = ExternalPatchTool::new(&args.tool)?;
    let summary = tool.apply(&ApplyRequest {
        base: args.base,
        patches: args.patches,
        output: args.output,
        rejects: args.rejects.clone(),
    })?;
    if !summary.is_clean() {
        let listed: Vec<String> = summary
            .rejects
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        anyhow::bail!(
            "{} patch(es) failed to apply, rejects in {}:\n{}",
            listed.len(),
            args.rejects.display(),
            listed.join("\n")
        );
    }
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("input not found: {}", path.display());
    }
    Ok(())
}
