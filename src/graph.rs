use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

use crate::structure::ClassStructure;

/// Stable handle to a node in a [`ClassGraph`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct ClassId(usize);

/// A class or interface seen while reading an archive, either visited directly or
/// referenced as a supertype or field type.
#[derive(Clone, Debug)]
pub(crate) struct ClassNode {
    pub(crate) name: String,
    pub(crate) access: u16,
    pub(crate) parents: Vec<ClassId>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) fields: Vec<FieldInfo>,
}

/// Declared method; constructors use the name `<init>`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MethodInfo {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
}

/// Declared field with its type resolved to a graph node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FieldInfo {
    pub(crate) name: String,
    pub(crate) type_id: ClassId,
    pub(crate) access: u16,
}

/// Supertype graph keyed by internal class name.
///
/// Nodes live in an arena and are never removed, so a [`ClassId`] handed out for a
/// placeholder stays valid once the class itself is visited and refined in place.
#[derive(Debug, Default)]
pub(crate) struct ClassGraph {
    nodes: Vec<ClassNode>,
    index: HashMap<String, ClassId>,
    visited: HashSet<ClassId>,
}

impl ClassGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Return the node for `name`, creating an empty placeholder on first reference.
    pub(crate) fn get_or_create(&mut self, name: &str) -> ClassId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = ClassId(self.nodes.len());
        self.nodes.push(ClassNode {
            name: name.to_string(),
            access: 0,
            parents: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        });
        self.index.insert(name.to_string(), id);
        id
    }

    /// Record a visited class: set its flags, link its supertypes (superclass first),
    /// and append its declared members. A class may be visited only once.
    pub(crate) fn visit(&mut self, class: ClassStructure) -> Result<ClassId> {
        let id = self.get_or_create(&class.name);
        if self.visited.contains(&id) {
            anyhow::bail!("class {} is declared more than once", class.name);
        }
        let mut parents = Vec::with_capacity(class.interfaces.len() + 1);
        if let Some(super_name) = &class.super_name {
            parents.push(self.get_or_create(super_name));
        }
        for interface in &class.interfaces {
            parents.push(self.get_or_create(interface));
        }

        let mut fields = Vec::with_capacity(class.fields.len());
        for field in class.fields {
            let type_name = field_type_name(&field.descriptor)
                .with_context(|| format!("invalid descriptor of field {}", field.name))?;
            fields.push(FieldInfo {
                name: field.name,
                type_id: self.get_or_create(&type_name),
                access: field.access,
            });
        }
        let methods = class.methods.into_iter().map(|method| MethodInfo {
            name: method.name,
            descriptor: method.descriptor,
            access: method.access,
        });

        self.visited.insert(id);
        let node = self.node_mut(id);
        node.access = class.access;
        node.parents.extend(parents);
        node.fields.extend(fields);
        node.methods.extend(methods);
        Ok(id)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<ClassId> {
        self.index.get(name).copied()
    }

    pub(crate) fn node(&self, id: ClassId) -> &ClassNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: ClassId) -> &mut ClassNode {
        &mut self.nodes[id.0]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (ClassId, &ClassNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (ClassId(index), node))
    }

    /// Whether `name` is `id` itself or appears anywhere in its transitive supertypes.
    pub(crate) fn has_superclass(&self, id: ClassId, name: &str) -> bool {
        let Some(target) = self.lookup(name) else {
            return false;
        };
        let mut visited = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if current == target {
                return true;
            }
            if visited.insert(current) {
                pending.extend(self.node(current).parents.iter().copied());
            }
        }
        false
    }
}

/// Internal name of a field's type: `La/B;` becomes `a/B`; primitives and arrays keep
/// their descriptor as the name.
fn field_type_name(descriptor: &str) -> Result<String> {
    // Field descriptors share the grammar of a method return type.
    let parsed = MethodDescriptor::from_str(&format!("(){descriptor}"))
        .context("parse field descriptor")?;
    match parsed.return_type() {
        TypeDescriptor::Object(_) => descriptor
            .strip_prefix('L')
            .and_then(|rest| rest.strip_suffix(';'))
            .map(str::to_string)
            .context("malformed object descriptor"),
        _ => Ok(descriptor.to_string()),
    }
}
