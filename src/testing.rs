//! Class-file and JAR fixtures built in-process for tests.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub(crate) const INVOKEVIRTUAL: u8 = 0xb6;
pub(crate) const INVOKESTATIC: u8 = 0xb8;

/// Builds a minimal but well-formed class file (major version 52).
pub(crate) struct ClassBuilder {
    pool: Pool,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    inner_classes: Vec<(u16, u16)>,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl ClassBuilder {
    pub(crate) fn new(name: &str) -> Self {
        let mut pool = Pool::default();
        let this_class = pool.class(name);
        let super_class = pool.class("java/lang/Object");
        Self {
            pool,
            access: 0x0021,
            this_class,
            super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub(crate) fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub(crate) fn super_class(mut self, name: &str) -> Self {
        self.super_class = self.pool.class(name);
        self
    }

    pub(crate) fn no_super(mut self) -> Self {
        self.super_class = 0;
        self
    }

    pub(crate) fn interface(mut self, name: &str) -> Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub(crate) fn field(self, access: u16, name: &str, descriptor: &str) -> Self {
        self.field_with(access, name, descriptor, &[])
    }

    /// Adds a field carrying the given `(name, body)` attributes.
    pub(crate) fn field_with(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: &[(&str, &[u8])],
    ) -> Self {
        let attributes = self.attributes_of(attributes);
        let member = self.member(access, name, descriptor, attributes);
        self.fields.push(member);
        self
    }

    pub(crate) fn method(self, access: u16, name: &str, descriptor: &str) -> Self {
        self.method_with(access, name, descriptor, &[])
    }

    /// Adds a method carrying the given `(name, body)` attributes.
    pub(crate) fn method_with(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: &[(&str, &[u8])],
    ) -> Self {
        let attributes = self.attributes_of(attributes);
        let member = self.member(access, name, descriptor, attributes);
        self.methods.push(member);
        self
    }

    /// Adds a method whose body performs each `(opcode, owner, name, descriptor)` call
    /// in order, then returns.
    pub(crate) fn method_calling(
        mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        calls: &[(u8, &str, &str, &str)],
    ) -> Self {
        let mut code = Vec::new();
        for (opcode, owner, call_name, call_descriptor) in calls {
            let index = self.pool.method_ref(owner, call_name, call_descriptor);
            code.push(*opcode);
            code.extend_from_slice(&index.to_be_bytes());
        }
        code.push(0xb1);
        let mut body = Vec::new();
        body.extend_from_slice(&8u16.to_be_bytes());
        body.extend_from_slice(&8u16.to_be_bytes());
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(&code);
        push_u16(&mut body, 0);
        push_u16(&mut body, 0);
        let attributes = self.attributes_of(&[("Code", body.as_slice())]);
        let member = self.member(access, name, descriptor, attributes);
        self.methods.push(member);
        self
    }

    pub(crate) fn inner_class(mut self, name: &str, access: u16) -> Self {
        let index = self.pool.class(name);
        self.inner_classes.push((index, access));
        self
    }

    /// Adds a class-level attribute with an arbitrary name and body.
    pub(crate) fn attribute(mut self, name: &str, body: &[u8]) -> Self {
        let name_index = self.pool.utf8(name);
        self.attributes.push((name_index, body.to_vec()));
        self
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        if !self.inner_classes.is_empty() {
            let name_index = self.pool.utf8("InnerClasses");
            let mut body = Vec::new();
            push_u16(&mut body, self.inner_classes.len());
            for (inner, access) in &self.inner_classes {
                body.extend_from_slice(&inner.to_be_bytes());
                body.extend_from_slice(&0u16.to_be_bytes());
                body.extend_from_slice(&0u16.to_be_bytes());
                body.extend_from_slice(&access.to_be_bytes());
            }
            self.attributes.push((name_index, body));
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&self.pool.count().to_be_bytes());
        out.extend_from_slice(&self.pool.bytes);
        out.extend_from_slice(&self.access.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());
        push_u16(&mut out, self.interfaces.len());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }
        push_u16(&mut out, self.fields.len());
        for field in &self.fields {
            out.extend_from_slice(field);
        }
        push_u16(&mut out, self.methods.len());
        for method in &self.methods {
            out.extend_from_slice(method);
        }
        push_attributes(&mut out, &self.attributes);
        out
    }

    fn attributes_of(&mut self, attributes: &[(&str, &[u8])]) -> Vec<(u16, Vec<u8>)> {
        attributes
            .iter()
            .map(|(name, body)| (self.pool.utf8(name), body.to_vec()))
            .collect()
    }

    fn member(
        &mut self,
        access: u16,
        name: &str,
        descriptor: &str,
        attributes: Vec<(u16, Vec<u8>)>,
    ) -> Vec<u8> {
        let name_index = self.pool.utf8(name);
        let descriptor_index = self.pool.utf8(descriptor);
        let mut out = Vec::new();
        out.extend_from_slice(&access.to_be_bytes());
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&descriptor_index.to_be_bytes());
        push_attributes(&mut out, &attributes);
        out
    }
}

fn push_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    push_u16(out, attributes.len());
    for (name_index, body) in attributes {
        out.extend_from_slice(&name_index.to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
    }
}

fn push_u16(out: &mut Vec<u8>, value: usize) {
    out.extend_from_slice(&(value as u16).to_be_bytes());
}

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    next: u16,
    seen: HashMap<(u8, String), u16>,
}

impl Pool {
    fn count(&self) -> u16 {
        self.next.max(1)
    }

    fn push(&mut self, tag: u8, key: String, payload: &[u8]) -> u16 {
        if let Some(index) = self.seen.get(&(tag, key.clone())) {
            return *index;
        }
        if self.next == 0 {
            self.next = 1;
        }
        let index = self.next;
        self.next += 1;
        self.bytes.push(tag);
        self.bytes.extend_from_slice(payload);
        self.seen.insert((tag, key), index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(value.len() as u16).to_be_bytes());
        payload.extend_from_slice(value.as_bytes());
        self.push(1, value.to_string(), &payload)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        self.push(7, name.to_string(), &name_index.to_be_bytes())
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut name_and_type = Vec::new();
        name_and_type.extend_from_slice(&name_index.to_be_bytes());
        name_and_type.extend_from_slice(&descriptor_index.to_be_bytes());
        let name_and_type_index =
            self.push(12, format!("{name}:{descriptor}"), &name_and_type);
        let mut method_ref = Vec::new();
        method_ref.extend_from_slice(&class_index.to_be_bytes());
        method_ref.extend_from_slice(&name_and_type_index.to_be_bytes());
        self.push(10, format!("{owner}.{name}:{descriptor}"), &method_ref)
    }
}

/// Writes a JAR containing a directory entry, a resource, and the given class entries.
pub(crate) fn write_jar(dir: &Path, file_name: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
    let path = dir.join(file_name);
    let file = fs::File::create(&path).expect("create jar");
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer
        .add_directory("META-INF/", options)
        .expect("add directory");
    writer
        .start_file("META-INF/MANIFEST.MF", options)
        .expect("start manifest");
    writer
        .write_all(b"Manifest-Version: 1.0\n")
        .expect("write manifest");
    for (name, data) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(data).expect("write entry");
    }
    writer.finish().expect("finish jar");
    path
}
