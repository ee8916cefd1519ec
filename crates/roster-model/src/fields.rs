//! Canonical field names and strong identifiers.
//!
//! Mappings translate tenant columns into these names; everything
//! downstream of the transform engine speaks only canonical fields.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const MATRICULE: &str = "matricule";
pub const FULL_NAME: &str = "full_name";
pub const FIRST_NAME: &str = "first_name";
pub const LAST_NAME: &str = "last_name";
pub const DATE_OF_BIRTH: &str = "date_of_birth";
pub const SCHOOL_YEAR: &str = "school_year";
pub const LEVEL: &str = "level";
pub const DEPARTMENT: &str = "department";
pub const PARENT_NAME_1: &str = "parent_name_1";
pub const PARENT_PHONE_1: &str = "parent_phone_1";
pub const PARENT_NAME_2: &str = "parent_name_2";
pub const PARENT_PHONE_2: &str = "parent_phone_2";
pub const ADDRESS: &str = "address";

/// Strong identifiers in commit resolution priority order.
pub const STRONG_IDENTIFIERS: [&str; 3] = [EMAIL, PHONE, MATRICULE];

pub const ALL: &[&str] = &[
    EMAIL,
    PHONE,
    MATRICULE,
    FULL_NAME,
    FIRST_NAME,
    LAST_NAME,
    DATE_OF_BIRTH,
    SCHOOL_YEAR,
    LEVEL,
    DEPARTMENT,
    PARENT_NAME_1,
    PARENT_PHONE_1,
    PARENT_NAME_2,
    PARENT_PHONE_2,
    ADDRESS,
];

pub fn is_canonical(name: &str) -> bool {
    ALL.contains(&name)
}

/// Returns the trimmed value of `field`, treating blank values as absent.
pub fn present<'a>(normalized: &'a BTreeMap<String, String>, field: &str) -> Option<&'a str> {
    normalized
        .get(field)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// A strong identifier value used to match rows against existing records.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Email(String),
    Phone(String),
    Matricule(String),
}

impl Identifier {
    /// Extracts identifiers from a normalized row in priority order
    /// (email, phone, matricule).
    pub fn from_normalized(normalized: &BTreeMap<String, String>) -> Vec<Identifier> {
        let mut out = Vec::with_capacity(3);
        if let Some(email) = present(normalized, EMAIL) {
            out.push(Identifier::Email(email.to_lowercase()));
        }
        if let Some(phone) = present(normalized, PHONE) {
            out.push(Identifier::Phone(phone.to_string()));
        }
        if let Some(matricule) = present(normalized, MATRICULE) {
            out.push(Identifier::Matricule(matricule.to_string()));
        }
        out
    }

    pub fn field(&self) -> &'static str {
        match self {
            Identifier::Email(_) => EMAIL,
            Identifier::Phone(_) => PHONE,
            Identifier::Matricule(_) => MATRICULE,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Email(v) | Identifier::Phone(v) | Identifier::Matricule(v) => v,
        }
    }

    /// Rendering safe to place in audit samples.
    ///
    /// `jane.doe@ex.com` becomes `j***@ex.com`, `+237699000000` becomes
    /// `+237*****0000`; matricules are kept as they are not personal data.
    pub fn masked(&self) -> String {
        match self {
            Identifier::Email(email) => match email.split_once('@') {
                Some((local, domain)) => {
                    let first = local.chars().next().unwrap_or('*');
                    format!("{first}***@{domain}")
                }
                None => "***".to_string(),
            },
            Identifier::Phone(phone) => {
                let chars: Vec<char> = phone.chars().collect();
                if chars.len() <= 8 {
                    return "*".repeat(chars.len());
                }
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
            }
            Identifier::Matricule(m) => m.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field(), self.masked())
    }
}
