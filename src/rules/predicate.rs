use serde::{Deserialize, Serialize};

use crate::graph::{ClassGraph, ClassId, FieldInfo, MethodInfo};

/// Selects the classes a rule group applies to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ClassPredicate {
    MatchAny,
    /// Exact internal name.
    Named(String),
    /// The class itself or any transitive supertype has this internal name.
    HasSuperclass(String),
    /// Nested classes of the given internal name, at any depth.
    InnerClassOf(String),
    All(Vec<ClassPredicate>),
    AnyOf(Vec<ClassPredicate>),
    Not(Box<ClassPredicate>),
}

impl ClassPredicate {
    pub(crate) fn test(&self, graph: &ClassGraph, id: ClassId) -> bool {
        match self {
            ClassPredicate::MatchAny => true,
            ClassPredicate::Named(name) => graph.node(id).name == *name,
            ClassPredicate::HasSuperclass(name) => graph.has_superclass(id, name),
            ClassPredicate::InnerClassOf(outer) => graph
                .node(id)
                .name
                .strip_prefix(outer.as_str())
                .is_some_and(|rest| rest.starts_with('$')),
            ClassPredicate::All(all) => all.iter().all(|p| p.test(graph, id)),
            ClassPredicate::AnyOf(any) => any.iter().any(|p| p.test(graph, id)),
            ClassPredicate::Not(inner) => !inner.test(graph, id),
        }
    }
}

/// Selects methods within a matched class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum MethodPredicate {
    MatchAny,
    Named(String),
    /// Methods whose return type is the given internal class name.
    Returns(String),
    /// Exact raw descriptor, e.g. `(I)V`.
    Descriptor(String),
    All(Vec<MethodPredicate>),
    AnyOf(Vec<MethodPredicate>),
    Not(Box<MethodPredicate>),
}

impl MethodPredicate {
    pub(crate) fn test(&self, method: &MethodInfo) -> bool {
        match self {
            MethodPredicate::MatchAny => true,
            MethodPredicate::Named(name) => method.name == *name,
            MethodPredicate::Returns(type_name) => method
                .descriptor
                .strip_suffix(';')
                .and_then(|rest| rest.strip_suffix(type_name.as_str()))
                .is_some_and(|rest| rest.ends_with(")L")),
            MethodPredicate::Descriptor(descriptor) => method.descriptor == *descriptor,
            MethodPredicate::All(all) => all.iter().all(|p| p.test(method)),
            MethodPredicate::AnyOf(any) => any.iter().any(|p| p.test(method)),
            MethodPredicate::Not(inner) => !inner.test(method),
        }
    }
}

/// Selects fields within a matched class.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FieldPredicate {
    MatchAny,
    Named(String),
    /// Fields whose declared type matches the class predicate.
    OfType(ClassPredicate),
    All(Vec<FieldPredicate>),
    AnyOf(Vec<FieldPredicate>),
    Not(Box<FieldPredicate>),
}

impl FieldPredicate {
    pub(crate) fn test(&self, graph: &ClassGraph, field: &FieldInfo) -> bool {
        match self {
            FieldPredicate::MatchAny => true,
            FieldPredicate::Named(name) => field.name == *name,
            FieldPredicate::OfType(type_predicate) => type_predicate.test(graph, field.type_id),
            FieldPredicate::All(all) => all.iter().all(|p| p.test(graph, field)),
            FieldPredicate::AnyOf(any) => any.iter().any(|p| p.test(graph, field)),
            FieldPredicate::Not(inner) => !inner.test(graph, field),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, descriptor: &str) -> MethodInfo {
        MethodInfo {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access: 0,
        }
    }

    #[test]
    fn inner_class_of_requires_nested_separator() {
        let mut graph = ClassGraph::new();
        let inner = graph.get_or_create("a/Outer$Inner");
        let deeper = graph.get_or_create("a/Outer$Inner$Deeper");
        let sibling = graph.get_or_create("a/OuterOther");
        let outer = graph.get_or_create("a/Outer");
        let predicate = ClassPredicate::InnerClassOf("a/Outer".to_string());

        assert!(predicate.test(&graph, inner));
        assert!(predicate.test(&graph, deeper));
        assert!(!predicate.test(&graph, sibling));
        assert!(!predicate.test(&graph, outer));
    }

    #[test]
    fn has_superclass_follows_parents() {
        let mut graph = ClassGraph::new();
        let base = graph.get_or_create("a/Block");
        let leaf = graph.get_or_create("a/StairBlock");
        graph.node_mut(leaf).parents.push(base);

        let predicate = ClassPredicate::HasSuperclass("a/Block".to_string());
        assert!(predicate.test(&graph, leaf));
        assert!(predicate.test(&graph, base));
    }

    #[test]
    fn combinators_compose() {
        let mut graph = ClassGraph::new();
        let id = graph.get_or_create("a/B");
        let named = ClassPredicate::Named("a/B".to_string());

        assert!(ClassPredicate::All(vec![named.clone(), ClassPredicate::MatchAny]).test(&graph, id));
        assert!(
            !ClassPredicate::All(vec![named.clone(), ClassPredicate::Not(Box::new(named.clone()))])
                .test(&graph, id)
        );
        assert!(
            ClassPredicate::AnyOf(vec![ClassPredicate::Named("x/Y".to_string()), named])
                .test(&graph, id)
        );
        assert!(!ClassPredicate::AnyOf(Vec::new()).test(&graph, id));
    }

    #[test]
    fn returns_matches_object_return_type_only() {
        let predicate = MethodPredicate::Returns("a/Builder".to_string());

        assert!(predicate.test(&method("make", "(I)La/Builder;")));
        assert!(!predicate.test(&method("make", "(La/Builder;)V")));
        assert!(!predicate.test(&method("make", "()[La/Builder;")));
        assert!(!predicate.test(&method("make", "()Lb/a/Builder;")));
    }

    #[test]
    fn of_type_tests_resolved_field_type() {
        let mut graph = ClassGraph::new();
        let block = graph.get_or_create("a/Block");
        let field = FieldInfo {
            name: "block".to_string(),
            type_id: block,
            access: 0,
        };

        let predicate = FieldPredicate::OfType(ClassPredicate::HasSuperclass("a/Block".to_string()));
        assert!(predicate.test(&graph, &field));
        assert!(!FieldPredicate::Named("other".to_string()).test(&graph, &field));
    }

    #[test]
    fn predicates_deserialize_from_snake_case_json() {
        let predicate: ClassPredicate = serde_json::from_str(
            r#"{"all": ["match_any", {"not": {"inner_class_of": "a/Outer"}}]}"#,
        )
        .expect("parse predicate");

        assert_eq!(
            ClassPredicate::All(vec![
                ClassPredicate::MatchAny,
                ClassPredicate::Not(Box::new(ClassPredicate::InnerClassOf("a/Outer".to_string()))),
            ]),
            predicate
        );
    }
}
