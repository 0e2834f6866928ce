use tracing::debug;

use crate::graph::{ClassGraph, ClassNode};
use crate::rules::{RuleError, RuleGroup, RuleTarget};

/// Supertype whose subclasses need their constructors widened with the class.
pub(crate) const RECORD_CLASS: &str = "java/lang/Record";

const CONSTRUCTOR: &str = "<init>";

/// Lines produced by one rule group, unsorted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct GroupOutput {
    pub(crate) name: String,
    pub(crate) lines: Vec<String>,
}

/// Evaluate every group against every class in the graph.
///
/// Groups are processed in order and the first group that produces no line aborts
/// the evaluation with [`RuleError::EmptyGroup`].
pub(crate) fn evaluate(
    graph: &ClassGraph,
    groups: &[RuleGroup],
) -> Result<Vec<GroupOutput>, RuleError> {
    let mut outputs = Vec::with_capacity(groups.len());
    for group in groups {
        let lines = evaluate_group(graph, group);
        debug!(group = group.name(), lines = lines.len(), "evaluated rule group");
        if lines.is_empty() {
            return Err(RuleError::EmptyGroup {
                name: group.name().to_string(),
            });
        }
        outputs.push(GroupOutput {
            name: group.name().to_string(),
            lines,
        });
    }
    Ok(outputs)
}

fn evaluate_group(graph: &ClassGraph, group: &RuleGroup) -> Vec<String> {
    let modifier = group.modifier();
    let mut lines = Vec::new();
    for (id, class) in graph.iter() {
        if !group.classes().test(graph, id) || is_anonymous(&class.name) {
            continue;
        }
        let class_name = dotted(&class.name);
        match group.target() {
            RuleTarget::Fields(fields) => {
                for field in &class.fields {
                    if fields.test(graph, field) && !modifier.satisfies(field.access) {
                        lines.push(format!("{} {} {}", modifier.name(), class_name, field.name));
                    }
                }
            }
            RuleTarget::Methods(methods) => {
                for method in &class.methods {
                    if methods.test(method) && !modifier.satisfies(method.access) {
                        lines.push(format!(
                            "{} {} {}{}",
                            modifier.name(),
                            class_name,
                            method.name,
                            method.descriptor
                        ));
                    }
                }
            }
            RuleTarget::Class => {
                if modifier.satisfies(class.access) {
                    continue;
                }
                lines.push(format!("{} {}", modifier.name(), class_name));
                if graph.has_superclass(id, RECORD_CLASS) {
                    push_record_constructors(&mut lines, modifier.name(), &class_name, class);
                }
            }
        }
    }
    lines
}

// Record constructors follow the class visibility whatever their current flags.
fn push_record_constructors(
    lines: &mut Vec<String>,
    modifier: &str,
    class_name: &str,
    class: &ClassNode,
) {
    for method in class.methods.iter().filter(|m| m.name == CONSTRUCTOR) {
        lines.push(format!(
            "{} {} {}{}",
            modifier, class_name, method.name, method.descriptor
        ));
    }
}

/// Anonymous and local classes, and anything nested inside them, have a `$`
/// followed by a digit somewhere in their internal name.
fn is_anonymous(name: &str) -> bool {
    name.as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'$' && pair[1].is_ascii_digit())
}

fn dotted(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}
