use anyhow::{Context, Result};
use jclassfile::attributes::Attribute;
use jclassfile::class_file;
use jclassfile::constant_pool::ConstantPool;
use tracing::debug;

use crate::bytecode;
use crate::ir::{CallKind, CallSite, ClassCalls, MethodCalls};
use crate::structure;

/// Parse a class file including method bodies and resolve every call site.
///
/// `jclassfile` rejects attributes it does not know; such classes are read again by
/// the structural reader, which only interprets `Code`.
pub(crate) fn read_calls(data: &[u8]) -> Result<ClassCalls> {
    let class_file = match class_file::parse(data) {
        Ok(parsed) => parsed,
        Err(err) => {
            let message = format!("{err}");
            if message.contains("unmatched attribute") {
                debug!(%message, "falling back to structural reader");
                return structure::read_call_sites(data)
                    .context("failed to parse class file bytes");
            }
            return Err(err).context("failed to parse class file bytes");
        }
    };
    let constant_pool = class_file.constant_pool();
    let name =
        resolve_class_name(constant_pool, class_file.this_class()).context("resolve class name")?;

    let mut methods = Vec::new();
    for method in class_file.methods() {
        let method_name =
            resolve_utf8(constant_pool, method.name_index()).context("resolve method name")?;
        let descriptor = resolve_utf8(constant_pool, method.descriptor_index())
            .context("resolve method descriptor")?;
        let code = method
            .attributes()
            .iter()
            .find_map(|attribute| match attribute {
                Attribute::Code { code, .. } => Some(code),
                _ => None,
            });
        let calls = match code {
            Some(code) => resolve_calls(code, constant_pool)
                .with_context(|| format!("parse bytecode of {method_name}{descriptor}"))?,
            None => Vec::new(),
        };
        methods.push(MethodCalls {
            name: method_name,
            descriptor,
            calls,
        });
    }

    Ok(ClassCalls { name, methods })
}

fn resolve_calls(code: &[u8], constant_pool: &[ConstantPool]) -> Result<Vec<CallSite>> {
    let mut calls = Vec::new();
    for invocation in bytecode::invocations(code)? {
        let method_ref = resolve_method_ref(constant_pool, invocation.method_index)
            .context("resolve method ref")?;
        let kind = CallKind::from_opcode(invocation.opcode)?;
        calls.push(CallSite {
            owner: method_ref.owner,
            name: method_ref.name,
            descriptor: method_ref.descriptor,
            kind,
            offset: invocation.offset,
        });
    }
    Ok(calls)
}

/// Resolved constant pool method reference.
struct MethodRef {
    owner: String,
    name: String,
    descriptor: String,
}

fn resolve_method_ref(constant_pool: &[ConstantPool], index: u16) -> Result<MethodRef> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing method ref entry")?;
    let (class_index, name_and_type_index) = match entry {
        ConstantPool::Methodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        ConstantPool::InterfaceMethodref {
            class_index,
            name_and_type_index,
        } => (*class_index, *name_and_type_index),
        _ => anyhow::bail!("unexpected method ref entry"),
    };
    let owner = resolve_class_name(constant_pool, class_index).context("resolve owner")?;
    let (name_index, descriptor_index) = resolve_name_and_type(constant_pool, name_and_type_index)?;
    let name = resolve_utf8(constant_pool, name_index).context("resolve method name")?;
    let descriptor =
        resolve_utf8(constant_pool, descriptor_index).context("resolve method descriptor")?;
    Ok(MethodRef {
        owner,
        name,
        descriptor,
    })
}

fn resolve_name_and_type(constant_pool: &[ConstantPool], index: u16) -> Result<(u16, u16)> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing name and type entry")?;
    match entry {
        ConstantPool::NameAndType {
            name_index,
            descriptor_index,
        } => Ok((*name_index, *descriptor_index)),
        _ => anyhow::bail!("unexpected name and type entry"),
    }
}

fn resolve_class_name(constant_pool: &[ConstantPool], class_index: u16) -> Result<String> {
    let entry = constant_pool
        .get(class_index as usize)
        .context("missing class entry")?;
    match entry {
        ConstantPool::Class { name_index } => resolve_utf8(constant_pool, *name_index),
        _ => anyhow::bail!("unexpected class entry"),
    }
}

fn resolve_utf8(constant_pool: &[ConstantPool], index: u16) -> Result<String> {
    let entry = constant_pool
        .get(index as usize)
        .context("missing utf8 entry")?;
    match entry {
        ConstantPool::Utf8 { value } => Ok(value.clone()),
        _ => anyhow::bail!("unexpected utf8 entry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, ClassBuilder};

    #[test]
    fn resolves_call_sites_per_method() {
        let data = ClassBuilder::new("a/Spawner")
            .method(0x0401, "abstractOne", "()V")
            .method_calling(
                0x0001,
                "spawn",
                "()V",
                &[
                    (testing::INVOKEVIRTUAL, "a/Mob", "finalize", "(I)V"),
                    (testing::INVOKESTATIC, "a/Util", "log", "()V"),
                ],
            )
            .build();

        let class = read_calls(&data).expect("read calls");

        assert_eq!("a/Spawner", class.name);
        assert_eq!(2, class.methods.len());
        assert!(class.methods[0].calls.is_empty());
        let calls = &class.methods[1].calls;
        assert_eq!(2, calls.len());
        assert_eq!("a/Mob", calls[0].owner);
        assert_eq!("finalize", calls[0].name);
        assert_eq!("(I)V", calls[0].descriptor);
        assert_eq!(CallKind::Virtual, calls[0].kind);
        assert_eq!(CallKind::Static, calls[1].kind);
        assert_eq!(3, calls[1].offset);
    }

    #[test]
    fn reads_classes_with_vendor_attributes() {
        let data = ClassBuilder::new("a/Caller")
            .attribute("CustomVendor", &[1, 2, 3])
            .method(0x0001, "plain", "()V")
            .method_calling(
                0x0001,
                "spawn",
                "()V",
                &[(testing::INVOKEVIRTUAL, "a/Mob", "finalizeSpawn", "()V")],
            )
            .build();

        let class = read_calls(&data).expect("read calls");

        assert_eq!("a/Caller", class.name);
        assert_eq!("plain", class.methods[0].name);
        assert!(class.methods[0].calls.is_empty());
        let calls = &class.methods[1].calls;
        assert_eq!(1, calls.len());
        assert_eq!("a/Mob", calls[0].owner);
        assert_eq!("finalizeSpawn", calls[0].name);
        assert_eq!(CallKind::Virtual, calls[0].kind);
        assert_eq!(0, calls[0].offset);
    }

    #[test]
    fn rejects_invalid_class_bytes() {
        assert!(read_calls(b"nope").is_err());
    }
}
