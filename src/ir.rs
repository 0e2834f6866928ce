use anyhow::Result;

use crate::bytecode::{INVOKEINTERFACE, INVOKESPECIAL, INVOKESTATIC, INVOKEVIRTUAL};

/// Method bodies of one class, reduced to the calls they make.
#[derive(Clone, Debug)]
pub(crate) struct ClassCalls {
    pub(crate) name: String,
    pub(crate) methods: Vec<MethodCalls>,
}

/// Calls made from a single method body. Abstract and native methods have none.
#[derive(Clone, Debug)]
pub(crate) struct MethodCalls {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) calls: Vec<CallSite>,
}

/// Call site extracted from bytecode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CallSite {
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) kind: CallKind,
    pub(crate) offset: u32,
}

/// Invoke opcode classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

impl CallKind {
    pub(crate) fn from_opcode(opcode: u8) -> Result<Self> {
        match opcode {
            INVOKESPECIAL => Ok(CallKind::Special),
            INVOKESTATIC => Ok(CallKind::Static),
            INVOKEINTERFACE => Ok(CallKind::Interface),
            INVOKEVIRTUAL => Ok(CallKind::Virtual),
            other => anyhow::bail!("unexpected invoke opcode 0x{:02x}", other),
        }
    }
}
