use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) mod modifier;
pub(crate) mod predicate;

pub(crate) use modifier::{Modifier, ModifierConfig};
pub(crate) use predicate::{ClassPredicate, FieldPredicate, MethodPredicate};

/// Configuration and validation failures of rule groups.
#[derive(Debug, Error)]
pub(crate) enum RuleError {
    #[error("modifier name must not be empty")]
    EmptyModifierName,
    #[error("modifier '{modifier}' accepts no access flags")]
    EmptyFlagSet { modifier: String },
    #[error("unknown modifier '{name}', expected \"public\", \"protected\" or an explicit definition")]
    UnknownModifier { name: String },
    #[error("rule group name must not be empty")]
    EmptyGroupName,
    #[error("duplicate rule group '{name}'")]
    DuplicateGroup { name: String },
    #[error("{kind} group '{name}' requires a '{expected}' predicate")]
    MissingMemberPredicate {
        name: String,
        kind: RuleKind,
        expected: &'static str,
    },
    #[error("{kind} group '{name}' must not declare a '{unexpected}' predicate")]
    UnexpectedMemberPredicate {
        name: String,
        kind: RuleKind,
        unexpected: &'static str,
    },
    #[error("generated AT group '{name}' found no entries")]
    EmptyGroup { name: String },
}

/// What a rule group emits lines for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RuleKind {
    Class,
    Method,
    Field,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuleKind::Class => "class",
            RuleKind::Method => "method",
            RuleKind::Field => "field",
        };
        f.write_str(name)
    }
}

/// Member selection of a rule group. The class declaration itself is the target
/// when neither methods nor fields are selected.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RuleTarget {
    Class,
    Methods(MethodPredicate),
    Fields(FieldPredicate),
}

/// A named batch of access transformer rules sharing one target modifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct RuleGroup {
    name: String,
    modifier: Modifier,
    classes: ClassPredicate,
    target: RuleTarget,
}

impl RuleGroup {
    pub(crate) fn class(
        name: impl Into<String>,
        modifier: Modifier,
        classes: ClassPredicate,
    ) -> Result<Self, RuleError> {
        Self::new(name.into(), modifier, classes, RuleTarget::Class)
    }

    pub(crate) fn methods(
        name: impl Into<String>,
        modifier: Modifier,
        classes: ClassPredicate,
        methods: MethodPredicate,
    ) -> Result<Self, RuleError> {
        Self::new(name.into(), modifier, classes, RuleTarget::Methods(methods))
    }

    pub(crate) fn fields(
        name: impl Into<String>,
        modifier: Modifier,
        classes: ClassPredicate,
        fields: FieldPredicate,
    ) -> Result<Self, RuleError> {
        Self::new(name.into(), modifier, classes, RuleTarget::Fields(fields))
    }

    fn new(
        name: String,
        modifier: Modifier,
        classes: ClassPredicate,
        target: RuleTarget,
    ) -> Result<Self, RuleError> {
        if name.trim().is_empty() {
            return Err(RuleError::EmptyGroupName);
        }
        Ok(Self {
            name,
            modifier,
            classes,
            target,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn modifier(&self) -> &Modifier {
        &self.modifier
    }

    pub(crate) fn classes(&self) -> &ClassPredicate {
        &self.classes
    }

    pub(crate) fn target(&self) -> &RuleTarget {
        &self.target
    }
}

/// Rules file contents: rule groups in evaluation and output order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RulesConfig {
    pub(crate) groups: Vec<RuleGroupConfig>,
}

/// A rule group as written in a rules file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RuleGroupConfig {
    pub(crate) name: String,
    pub(crate) modifier: ModifierConfig,
    pub(crate) kind: RuleKind,
    pub(crate) classes: ClassPredicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) methods: Option<MethodPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) fields: Option<FieldPredicate>,
}

impl TryFrom<RuleGroupConfig> for RuleGroup {
    type Error = RuleError;

    fn try_from(config: RuleGroupConfig) -> Result<Self, Self::Error> {
        let RuleGroupConfig {
            name,
            modifier,
            kind,
            classes,
            methods,
            fields,
        } = config;
        let modifier = Modifier::try_from(modifier)?;
        match (kind, methods, fields) {
            (RuleKind::Class, None, None) => RuleGroup::class(name, modifier, classes),
            (RuleKind::Method, Some(methods), None) => {
                RuleGroup::methods(name, modifier, classes, methods)
            }
            (RuleKind::Field, None, Some(fields)) => {
                RuleGroup::fields(name, modifier, classes, fields)
            }
            (RuleKind::Method, Some(_), Some(_)) => Err(RuleError::UnexpectedMemberPredicate {
                name,
                kind,
                unexpected: "fields",
            }),
            (RuleKind::Field, Some(_), Some(_)) => Err(RuleError::UnexpectedMemberPredicate {
                name,
                kind,
                unexpected: "methods",
            }),
            (RuleKind::Method, None, _) => Err(RuleError::MissingMemberPredicate {
                name,
                kind,
                expected: "methods",
            }),
            (RuleKind::Field, _, None) => Err(RuleError::MissingMemberPredicate {
                name,
                kind,
                expected: "fields",
            }),
            (_, Some(_), _) => Err(RuleError::UnexpectedMemberPredicate {
                name,
                kind,
                unexpected: "methods",
            }),
            (_, _, Some(_)) => Err(RuleError::UnexpectedMemberPredicate {
                name,
                kind,
                unexpected: "fields",
            }),
        }
    }
}

impl RulesConfig {
    /// Validate every group and reject duplicate names.
    pub(crate) fn into_groups(self) -> Result<Vec<RuleGroup>, RuleError> {
        let mut names = HashSet::new();
        let mut groups = Vec::with_capacity(self.groups.len());
        for config in self.groups {
            let group = RuleGroup::try_from(config)?;
            if !names.insert(group.name().to_string()) {
                return Err(RuleError::DuplicateGroup {
                    name: group.name().to_string(),
                });
            }
            groups.push(group);
        }
        Ok(groups)
    }
}

/// Load and validate rule groups from a JSON rules file.
pub(crate) fn load_rules(path: &Path) -> Result<Vec<RuleGroup>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: RulesConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse rules {}", path.display()))?;
    config
        .into_groups()
        .with_context(|| format!("invalid rules {}", path.display()))
}
