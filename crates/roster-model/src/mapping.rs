//! Tenant-owned import mapping templates.
//!
//! A mapping is plain configuration data: column assignments, an ordered
//! list of declarative transform rules, a header alias dictionary and the
//! targets a row must carry. Nothing in here executes; the transform engine
//! interprets the rules.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModelError, Result};
use crate::fields;
use crate::ids::TenantId;

pub const MAX_FIELD_MAPPINGS: usize = 200;
pub const MAX_TRANSFORM_RULES: usize = 500;

/// Declarative operation applied by a [`TransformRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    Trim,
    Lowercase,
    Uppercase,
    /// Capitalize the first letter of every word.
    TitleCase,
    /// Collapse inner whitespace runs to a single space.
    CollapseWhitespace,
    /// Join the non-empty source values with `separator`.
    Concat {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Rewrite a phone number to `+<country code><national number>`.
    PhoneNormalize {
        /// Calling code used for national numbers; tenant default when absent.
        #[serde(default)]
        country_code: Option<String>,
    },
    /// Reparse a date written with `pattern` (e.g. `DD/MM/YYYY` or
    /// `%d/%m/%Y`) into `YYYY-MM-DD`.
    DateReparse { pattern: String },
}

fn default_separator() -> String {
    " ".to_string()
}

impl TransformOp {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Trim => "Trim",
            Self::Lowercase => "Lowercase",
            Self::Uppercase => "Uppercase",
            Self::TitleCase => "Title Case",
            Self::CollapseWhitespace => "Collapse Whitespace",
            Self::Concat { .. } => "Concatenate",
            Self::PhoneNormalize { .. } => "Phone",
            Self::DateReparse { .. } => "Date",
        }
    }
}

/// One transformation step producing the value of `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRule {
    /// Canonical field written by this rule.
    pub target: String,
    /// Inputs read by this rule, canonical fields first, then raw columns.
    /// Empty means the rule reads `target` itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(flatten)]
    pub op: TransformOp,
}

impl TransformRule {
    pub fn new(target: impl Into<String>, op: TransformOp) -> Self {
        Self {
            target: target.into(),
            sources: Vec::new(),
            op,
        }
    }

    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Names this rule reads, in order.
    pub fn inputs(&self) -> Vec<&str> {
        if self.sources.is_empty() {
            vec![self.target.as_str()]
        } else {
            self.sources.iter().map(String::as_str).collect()
        }
    }
}

/// A target a row must carry: one field, or at least one of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredTarget {
    Field(String),
    AnyOf(Vec<String>),
}

impl RequiredTarget {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            RequiredTarget::Field(field) => vec![field.as_str()],
            RequiredTarget::AnyOf(group) => group.iter().map(String::as_str).collect(),
        }
    }

    /// True when the group consists only of strong identifiers.
    pub fn is_identifier_group(&self) -> bool {
        match self {
            RequiredTarget::AnyOf(group) => {
                !group.is_empty()
                    && group
                        .iter()
                        .all(|f| fields::STRONG_IDENTIFIERS.contains(&f.as_str()))
            }
            RequiredTarget::Field(_) => false,
        }
    }
}

/// Reusable, versioned column mapping for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportMapping {
    pub id: Uuid,
    pub tenant: TenantId,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Source column -> canonical field.
    #[serde(default)]
    pub field_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub transforms: Vec<TransformRule>,
    /// Canonical field -> header aliases used for auto-suggestion.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub required_targets: Vec<RequiredTarget>,
}

fn default_version() -> u32 {
    1
}

impl ImportMapping {
    pub fn new(tenant: TenantId, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::EmptyMappingName);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant,
            name: name.trim().to_string(),
            version: default_version(),
            field_mappings: BTreeMap::new(),
            transforms: Vec::new(),
            aliases: BTreeMap::new(),
            required_targets: Vec::new(),
        })
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_field(mut self, column: impl Into<String>, target: impl Into<String>) -> Self {
        self.field_mappings.insert(column.into(), target.into());
        self
    }

    pub fn with_rule(mut self, rule: TransformRule) -> Self {
        self.transforms.push(rule);
        self
    }

    pub fn with_aliases<I, S>(mut self, target: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(target.into())
            .or_default()
            .extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_required(mut self, target: RequiredTarget) -> Self {
        self.required_targets.push(target);
        self
    }

    /// Rejects oversized templates.
    pub fn check_limits(&self) -> Result<()> {
        if self.field_mappings.len() > MAX_FIELD_MAPPINGS {
            return Err(ModelError::MappingTooLarge {
                what: "column assignments",
                count: self.field_mappings.len(),
                max: MAX_FIELD_MAPPINGS,
            });
        }
        if self.transforms.len() > MAX_TRANSFORM_RULES {
            return Err(ModelError::MappingTooLarge {
                what: "transform rules",
                count: self.transforms.len(),
                max: MAX_TRANSFORM_RULES,
            });
        }
        Ok(())
    }

    /// Canonical targets assigned by this mapping, deduplicated.
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.field_mappings.values().map(String::as_str).collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}

impl fmt::Display for ImportMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}@v{}", self.tenant, self.name, self.version)
    }
}
