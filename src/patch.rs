//! Source patch pipeline, delegated to an external diff/patch tool.
//!
//! Diffs compare a pristine source archive against a modified source tree and write
//! unified diffs with `a/` and `b/` prefixes and `\n` line endings. Applying patches
//! produces a patched source archive and leaves a reject file for every hunk that did
//! not apply.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Where generated patches go.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum PatchOutput {
    /// A single archive; its format follows the file extension.
    Archive(PathBuf),
    /// One patch file per changed source, mirroring the source tree.
    Directory(PathBuf),
}

#[derive(Clone, Debug)]
pub(crate) struct DiffRequest {
    pub(crate) base: PathBuf,
    pub(crate) modified: PathBuf,
    pub(crate) output: PatchOutput,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum DiffStatus {
    Clean,
    Differences,
}

#[derive(Clone, Debug)]
pub(crate) struct ApplyRequest {
    pub(crate) base: PathBuf,
    pub(crate) patches: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) rejects: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ApplySummary {
    /// Reject files left behind, sorted by path.
    pub(crate) rejects: Vec<PathBuf>,
}

impl ApplySummary {
    pub(crate) fn is_clean(&self) -> bool {
        self.rejects.is_empty()
    }
}

/// Diff and patch operations over source trees.
pub(crate) trait PatchTool {
    fn diff(&self, request: &DiffRequest) -> Result<DiffStatus>;
    fn apply(&self, request: &ApplyRequest) -> Result<ApplySummary>;
}

/// Runs an external DiffPatch-compatible command line, e.g. `java -jar DiffPatch.jar`.
#[derive(Clone, Debug)]
pub(crate) struct ExternalPatchTool {
    program: OsString,
    leading_args: Vec<OsString>,
}

impl ExternalPatchTool {
    /// `command` is the program followed by any fixed leading arguments.
    pub(crate) fn new(command: &[String]) -> Result<Self> {
        let (program, rest) = command
            .split_first()
            .context("patch tool command must not be empty")?;
        Ok(Self {
            program: program.into(),
            leading_args: rest.iter().map(OsString::from).collect(),
        })
    }

    fn run(&self, args: Vec<OsString>) -> Result<ExitStatus> {
        debug!(program = ?self.program, ?args, "running patch tool");
        Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .status()
            .with_context(|| format!("failed to run {}", self.program.to_string_lossy()))
    }
}

impl PatchTool for ExternalPatchTool {
    fn diff(&self, request: &DiffRequest) -> Result<DiffStatus> {
        let status = self.run(diff_arguments(request))?;
        let outcome = classify_diff_exit(status.code())?;
        info!(?outcome, "generated source patches");
        Ok(outcome)
    }

    fn apply(&self, request: &ApplyRequest) -> Result<ApplySummary> {
        if request.rejects.exists() {
            fs::remove_dir_all(&request.rejects).with_context(|| {
                format!("failed to clear rejects {}", request.rejects.display())
            })?;
        }
        let status = self.run(apply_arguments(request))?;
        match status.code() {
            Some(0) | Some(1) => {}
            Some(code) => anyhow::bail!("patch tool failed with exit code: {}", code),
            None => anyhow::bail!("patch tool terminated by signal"),
        }
        let summary = ApplySummary {
            rejects: collect_rejects(&request.rejects)?,
        };
        if !summary.is_clean() {
            warn!(rejects = summary.rejects.len(), "patches did not apply cleanly");
        }
        Ok(summary)
    }
}

/// Exit code 0 means no differences and 1 means patches were written; anything
/// else, including death by signal, is a failure.
pub(crate) fn classify_diff_exit(code: Option<i32>) -> Result<DiffStatus> {
    match code {
        Some(0) => Ok(DiffStatus::Clean),
        Some(1) => Ok(DiffStatus::Differences),
        Some(code) => anyhow::bail!("DiffPatch failed with exit code: {}", code),
        None => anyhow::bail!("DiffPatch terminated by signal"),
    }
}

fn diff_arguments(request: &DiffRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--diff".into()];
    args.extend(base_archive_arguments(&request.base));
    args.push(request.base.clone().into());
    args.push(request.modified.clone().into());
    match &request.output {
        PatchOutput::Archive(path) => {
            args.push("--output".into());
            args.push(path.clone().into());
            args.push("--archive".into());
            args.push(archive_format(path).into());
        }
        PatchOutput::Directory(path) => {
            args.push("--output".into());
            args.push(path.clone().into());
        }
    }
    for fixed in [
        "--auto-header",
        "--log-level",
        "WARN",
        "--a-prefix",
        "a/",
        "--b-prefix",
        "b/",
        "--line-endings",
        "\n",
    ] {
        args.push(fixed.into());
    }
    args
}

fn apply_arguments(request: &ApplyRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--patch".into()];
    args.extend(base_archive_arguments(&request.base));
    args.push(request.base.clone().into());
    args.push(request.patches.clone().into());
    args.push("--output".into());
    args.push(request.output.clone().into());
    args.push("--archive".into());
    args.push(archive_format(&request.output).into());
    args.push("--reject".into());
    args.push(request.rejects.clone().into());
    args.push("--log-level".into());
    args.push("WARN".into());
    args
}

fn base_archive_arguments(base: &Path) -> Vec<OsString> {
    if base.is_dir() {
        return Vec::new();
    }
    vec!["--archive-base".into(), archive_format(base).into()]
}

fn archive_format(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("jar") => "jar".to_string(),
        _ => "zip".to_string(),
    }
}

fn collect_rejects(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut rejects = Vec::new();
    if dir.exists() {
        collect_files(dir, &mut rejects)?;
    }
    rejects.sort();
    Ok(rejects)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("failed to read entry under {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}
