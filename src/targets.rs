use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::archive;
use crate::ir::{CallKind, CallSite, ClassCalls, MethodCalls};
use crate::reader;

/// Virtual method looked up at call sites, regardless of the receiver's owner class.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CallTarget {
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

/// Internal names of every class in the archive that makes an `invokevirtual` call
/// to `target`. Classes listed in `excluded` are not scanned.
pub(crate) fn scan_call_targets(
    path: &Path,
    target: &CallTarget,
    excluded: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut matched = BTreeSet::new();
    archive::for_each_class(path, |name, data| {
        if name.ends_with("module-info.class") {
            return Ok(());
        }
        let class = reader::read_calls(data)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        if excluded.contains(&class.name) {
            return Ok(());
        }
        if let Some((method, call)) = find_call(&class, target) {
            debug!(
                class = %class.name,
                method = %format!("{}{}", method.name, method.descriptor),
                owner = %call.owner,
                offset = call.offset,
                "matched call target"
            );
            matched.insert(class.name);
        }
        Ok(())
    })?;
    Ok(matched)
}

fn find_call<'a>(
    class: &'a ClassCalls,
    target: &CallTarget,
) -> Option<(&'a MethodCalls, &'a CallSite)> {
    class.methods.iter().find_map(|method| {
        method
            .calls
            .iter()
            .find(|call| {
                call.kind == CallKind::Virtual
                    && call.name == target.name
                    && call.descriptor == target.descriptor
            })
            .map(|call| (method, call))
    })
}

/// Pretty-printed JSON array of class names.
pub(crate) fn render_targets(targets: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string_pretty(targets).context("failed to serialize call targets")
}
