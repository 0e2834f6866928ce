use serde::{Deserialize, Serialize};

use crate::rules::RuleError;

pub(crate) const ACC_PUBLIC: u16 = 0x0001;
#[cfg(test)]
pub(crate) const ACC_PRIVATE: u16 = 0x0002;
pub(crate) const ACC_PROTECTED: u16 = 0x0004;
pub(crate) const ACC_FINAL: u16 = 0x0010;

/// Target access level of a rule group.
///
/// A member already satisfies the modifier when its flags share a bit with any of
/// the acceptable flags (and carry `ACC_FINAL` when `requires_final` is set).
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Modifier {
    name: String,
    requires_final: bool,
    mask: u16,
}

impl Modifier {
    pub(crate) fn new(
        name: impl Into<String>,
        requires_final: bool,
        acceptable_flags: Vec<u16>,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RuleError::EmptyModifierName);
        }
        let mask = acceptable_flags.iter().fold(0, |mask, flag| mask | flag);
        if mask == 0 {
            return Err(RuleError::EmptyFlagSet { modifier: name });
        }
        Ok(Self {
            name,
            requires_final,
            mask,
        })
    }

    pub(crate) fn public() -> Self {
        Self {
            name: "public".to_string(),
            requires_final: false,
            mask: ACC_PUBLIC,
        }
    }

    pub(crate) fn protected() -> Self {
        Self {
            name: "protected".to_string(),
            requires_final: false,
            mask: ACC_PUBLIC | ACC_PROTECTED,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn satisfies(&self, access: u16) -> bool {
        if self.requires_final && access & ACC_FINAL == 0 {
            return false;
        }
        access & self.mask != 0
    }
}

/// Modifier as written in a rules file: a preset name or an explicit definition.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum ModifierConfig {
    Preset(String),
    Explicit {
        name: String,
        #[serde(default)]
        requires_final: bool,
        acceptable_flags: Vec<u16>,
    },
}

impl TryFrom<ModifierConfig> for Modifier {
    type Error = RuleError;

    fn try_from(config: ModifierConfig) -> Result<Self, Self::Error> {
        match config {
            ModifierConfig::Preset(name) => match name.as_str() {
                "public" => Ok(Modifier::public()),
                "protected" => Ok(Modifier::protected()),
                _ => Err(RuleError::UnknownModifier { name }),
            },
            ModifierConfig::Explicit {
                name,
                requires_final,
                acceptable_flags,
            } => Modifier::new(name, requires_final, acceptable_flags),
        }
    }
}
