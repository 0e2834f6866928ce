use anyhow::{Context, Result};

use crate::bytecode;
use crate::ir::{CallKind, CallSite, ClassCalls, MethodCalls};

const MAGIC: u32 = 0xCAFEBABE;
const INNER_CLASSES: &str = "InnerClasses";
const CODE: &str = "Code";

/// Structural view of a class file: header, member signatures, and the effective
/// class access flags. Method bodies and all other attributes are skipped.
#[derive(Clone, Debug)]
pub(crate) struct ClassStructure {
    pub(crate) name: String,
    pub(crate) access: u16,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) fields: Vec<MemberStructure>,
    pub(crate) methods: Vec<MemberStructure>,
}

/// Name, descriptor, and access flags of a declared field or method.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MemberStructure {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) access: u16,
}

struct Header {
    pool: ConstantPool,
    access: u16,
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
}

/// Read the structure of a class file.
///
/// `access` is taken from the class header, then replaced by the flags of the
/// InnerClasses entry naming this class, if there is one. Entries for other classes
/// are ignored.
pub(crate) fn read_class(data: &[u8]) -> Result<ClassStructure> {
    let mut cursor = Cursor::new(data);
    let Header {
        pool,
        mut access,
        name,
        super_name,
        interfaces,
    } = read_header(&mut cursor)?;

    let fields = read_members(&mut cursor, &pool).context("read fields")?;
    let methods = read_members(&mut cursor, &pool).context("read methods")?;

    let attribute_count = cursor.u16()?;
    for _ in 0..attribute_count {
        let attribute_name = pool.utf8(cursor.u16()?).context("resolve attribute name")?;
        let length = cursor.u32()? as usize;
        let body = cursor.bytes(length)?;
        if attribute_name == INNER_CLASSES {
            if let Some(inner_access) =
                inner_class_access(body, &pool, &name).context("read InnerClasses")?
            {
                access = inner_access;
            }
        }
    }

    Ok(ClassStructure {
        name,
        access,
        super_name,
        interfaces,
        fields,
        methods,
    })
}

/// Read method bodies and resolve their call sites without interpreting any
/// attribute other than `Code`.
pub(crate) fn read_call_sites(data: &[u8]) -> Result<ClassCalls> {
    let mut cursor = Cursor::new(data);
    let Header { pool, name, .. } = read_header(&mut cursor)?;
    read_members(&mut cursor, &pool).context("read fields")?;

    let method_count = cursor.u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        let _access = cursor.u16()?;
        let method_name = pool.utf8(cursor.u16()?).context("resolve method name")?;
        let descriptor = pool
            .utf8(cursor.u16()?)
            .context("resolve method descriptor")?;
        let mut calls = Vec::new();
        let attribute_count = cursor.u16()?;
        for _ in 0..attribute_count {
            let attribute_name = pool.utf8(cursor.u16()?).context("resolve attribute name")?;
            let length = cursor.u32()? as usize;
            let body = cursor.bytes(length)?;
            if attribute_name == CODE {
                calls = code_call_sites(body, &pool)
                    .with_context(|| format!("parse bytecode of {method_name}{descriptor}"))?;
            }
        }
        methods.push(MethodCalls {
            name: method_name.to_string(),
            descriptor: descriptor.to_string(),
            calls,
        });
    }

    Ok(ClassCalls { name, methods })
}

fn read_header(cursor: &mut Cursor<'_>) -> Result<Header> {
    let magic = cursor.u32()?;
    if magic != MAGIC {
        anyhow::bail!("invalid class file magic");
    }
    let _minor = cursor.u16()?;
    let _major = cursor.u16()?;
    let pool = ConstantPool::read(cursor).context("read constant pool")?;

    let access = cursor.u16()?;
    let this_class = cursor.u16()?;
    let super_class = cursor.u16()?;
    let name = pool.class_name(this_class).context("resolve class name")?;
    let super_name = if super_class == 0 {
        None
    } else {
        Some(
            pool.class_name(super_class)
                .context("resolve super class name")?,
        )
    };

    let interface_count = cursor.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        let index = cursor.u16()?;
        interfaces.push(pool.class_name(index).context("resolve interface name")?);
    }

    Ok(Header {
        pool,
        access,
        name,
        super_name,
        interfaces,
    })
}

fn read_members(cursor: &mut Cursor<'_>, pool: &ConstantPool) -> Result<Vec<MemberStructure>> {
    let count = cursor.u16()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = cursor.u16()?;
        let name = pool.utf8(cursor.u16()?).context("resolve member name")?;
        let descriptor = pool
            .utf8(cursor.u16()?)
            .context("resolve member descriptor")?;
        skip_attributes(cursor)?;
        members.push(MemberStructure {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access,
        });
    }
    Ok(members)
}

fn skip_attributes(cursor: &mut Cursor<'_>) -> Result<()> {
    let count = cursor.u16()?;
    for _ in 0..count {
        cursor.skip(2)?;
        let length = cursor.u32()? as usize;
        cursor.skip(length)?;
    }
    Ok(())
}

fn code_call_sites(body: &[u8], pool: &ConstantPool) -> Result<Vec<CallSite>> {
    let mut cursor = Cursor::new(body);
    let _max_stack = cursor.u16()?;
    let _max_locals = cursor.u16()?;
    let code_length = cursor.u32()? as usize;
    let code = cursor.bytes(code_length)?;

    let mut calls = Vec::new();
    for invocation in bytecode::invocations(code)? {
        let (owner, name, descriptor) = pool
            .method_ref(invocation.method_index)
            .context("resolve method ref")?;
        let kind = CallKind::from_opcode(invocation.opcode)?;
        calls.push(CallSite {
            owner,
            name,
            descriptor,
            kind,
            offset: invocation.offset,
        });
    }
    Ok(calls)
}

fn inner_class_access(body: &[u8], pool: &ConstantPool, class_name: &str) -> Result<Option<u16>> {
    let mut cursor = Cursor::new(body);
    let count = cursor.u16()?;
    let mut access = None;
    for _ in 0..count {
        let inner_class = cursor.u16()?;
        let _outer_class = cursor.u16()?;
        let _inner_name = cursor.u16()?;
        let inner_access = cursor.u16()?;
        if pool.class_name(inner_class)? == class_name {
            access = Some(inner_access);
        }
    }
    Ok(access)
}

/// Resolved subset of the constant pool: UTF-8 values, class name references,
/// method references and name-and-type pairs.
struct ConstantPool {
    utf8: Vec<Option<String>>,
    classes: Vec<Option<u16>>,
    method_refs: Vec<Option<(u16, u16)>>,
    name_and_types: Vec<Option<(u16, u16)>>,
}

impl ConstantPool {
    fn read(cursor: &mut Cursor<'_>) -> Result<Self> {
        let count = cursor.u16()? as usize;
        let slots = count.max(1);
        let mut pool = Self {
            utf8: vec![None; slots],
            classes: vec![None; slots],
            method_refs: vec![None; slots],
            name_and_types: vec![None; slots],
        };
        let mut index = 1usize;
        while index < count {
            let tag = cursor.u8()?;
            match tag {
                1 => {
                    let len = cursor.u16()? as usize;
                    let bytes = cursor.bytes(len)?;
                    let value = decode_modified_utf8(bytes)
                        .with_context(|| format!("invalid utf8 entry #{index}"))?;
                    pool.utf8[index] = Some(value);
                }
                7 => pool.classes[index] = Some(cursor.u16()?),
                10 | 11 => pool.method_refs[index] = Some((cursor.u16()?, cursor.u16()?)),
                12 => pool.name_and_types[index] = Some((cursor.u16()?, cursor.u16()?)),
                3 | 4 => cursor.skip(4)?,
                5 | 6 => {
                    cursor.skip(8)?;
                    // Long and double constants occupy two slots.
                    index += 1;
                }
                8 | 16 | 19 | 20 => cursor.skip(2)?,
                9 | 17 | 18 => cursor.skip(4)?,
                15 => cursor.skip(3)?,
                _ => anyhow::bail!("unsupported constant pool tag: {}", tag),
            }
            index += 1;
        }
        Ok(pool)
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        self.utf8
            .get(index as usize)
            .and_then(|value| value.as_deref())
            .with_context(|| format!("missing utf8 entry #{index}"))
    }

    fn class_name(&self, index: u16) -> Result<String> {
        let name_index = self
            .classes
            .get(index as usize)
            .copied()
            .flatten()
            .with_context(|| format!("missing class entry #{index}"))?;
        Ok(self.utf8(name_index)?.to_string())
    }

    /// Owner, name and descriptor of a `Methodref` or `InterfaceMethodref`.
    fn method_ref(&self, index: u16) -> Result<(String, String, String)> {
        let (class_index, name_and_type_index) = self
            .method_refs
            .get(index as usize)
            .copied()
            .flatten()
            .with_context(|| format!("missing method ref entry #{index}"))?;
        let (name_index, descriptor_index) = self
            .name_and_types
            .get(name_and_type_index as usize)
            .copied()
            .flatten()
            .with_context(|| format!("missing name and type entry #{name_and_type_index}"))?;
        Ok((
            self.class_name(class_index)?,
            self.utf8(name_index)?.to_string(),
            self.utf8(descriptor_index)?.to_string(),
        ))
    }
}

/// Decode the modified UTF-8 of `CONSTANT_Utf8` entries: NUL is `C0 80` and
/// supplementary characters are surrogate pairs of three-byte sequences. Anything
/// else, including unpaired surrogates, is rejected.
fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut index = 0usize;
    while index < bytes.len() {
        let first = bytes[index];
        let continuation = |offset: usize| -> Result<u16> {
            match bytes.get(index + offset) {
                Some(byte) if byte & 0xc0 == 0x80 => Ok(u16::from(byte & 0x3f)),
                _ => anyhow::bail!("malformed modified utf8 at byte {}", index),
            }
        };
        match first {
            0x01..=0x7f => {
                units.push(u16::from(first));
                index += 1;
            }
            0xc0..=0xdf => {
                let unit = (u16::from(first & 0x1f) << 6) | continuation(1)?;
                if unit != 0 && unit < 0x80 {
                    anyhow::bail!("overlong modified utf8 at byte {}", index);
                }
                units.push(unit);
                index += 2;
            }
            0xe0..=0xef => {
                let unit =
                    (u16::from(first & 0x0f) << 12) | (continuation(1)? << 6) | continuation(2)?;
                if unit < 0x800 {
                    anyhow::bail!("overlong modified utf8 at byte {}", index);
                }
                units.push(unit);
                index += 3;
            }
            _ => anyhow::bail!("invalid modified utf8 byte 0x{:02x} at {}", first, index),
        }
    }
    String::from_utf16(&units).context("unpaired surrogate in modified utf8")
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.offset;
        let end = start.checked_add(len).context("class file out of bounds")?;
        let slice = self
            .data
            .get(start..end)
            .context("class file out of bounds")?;
        self.offset = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.bytes(len)?;
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
