use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::info;

use crate::engine::GroupOutput;

pub(crate) const HEADER: &str = "# This file is generated based on the rules defined in the buildscript. DO NOT modify it manually.\n\
# Add more rules in the buildscript and then run the generateAccessTransformers task to update this file.\n\n";

/// Render access transformer text: the header, then one block per group in order,
/// each block a `# name` comment followed by its lines in plain string order.
pub(crate) fn render(outputs: Vec<GroupOutput>) -> String {
    let mut text = String::from(HEADER);
    let count = outputs.len();
    for (index, mut output) in outputs.into_iter().enumerate() {
        output.lines.sort();
        text.push_str("# ");
        text.push_str(&output.name);
        text.push('\n');
        text.push_str(&output.lines.join("\n"));
        text.push('\n');
        if index + 1 < count {
            text.push('\n');
        }
    }
    text
}

/// Write `text` as UTF-8, replacing `path` only once the full content is on disk.
pub(crate) fn write_string_safe(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.as_file()
        .sync_all()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;

    info!(path = %path.display(), bytes = text.len(), "wrote file");
    Ok(())
}
