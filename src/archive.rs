use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;
use zip::ZipArchive;

use crate::graph::ClassGraph;
use crate::structure;

/// Call `visit` with the name and bytes of every `.class` entry in the archive at
/// `path`, in sorted entry-name order. Returns the number of entries visited.
///
/// The first error from reading an entry or from `visit` aborts the walk.
pub(crate) fn for_each_class<F>(path: &Path, mut visit: F) -> Result<usize>
where
    F: FnMut(&str, &[u8]) -> Result<()>,
{
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") {
            entry_names.push(name);
        }
    }

    // Keep deterministic ordering regardless of how the archive was assembled.
    entry_names.sort();
    entry_names.dedup();

    let mut data = Vec::new();
    for name in &entry_names {
        let mut entry = archive
            .by_name(name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        data.clear();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        visit(name, &data)?;
    }

    debug!(archive = %path.display(), classes = entry_names.len(), "walked archive");
    Ok(entry_names.len())
}

/// Build the class graph of every class in the archive at `path`.
pub(crate) fn read_class_graph(path: &Path) -> Result<ClassGraph> {
    let mut graph = ClassGraph::new();
    for_each_class(path, |name, data| {
        let class = structure::read_class(data)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        graph
            .visit(class)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        Ok(())
    })?;
    Ok(graph)
}
