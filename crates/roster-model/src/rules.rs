use serde::{Deserialize, Serialize};

use crate::fields;

/// Per-tenant validation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantRules {
    /// At least one of these must be present on every row.
    pub strong_identifiers: Vec<String>,
    /// Fields every row must carry in addition to an identifier.
    pub mandatory_fields: Vec<String>,
    /// Calling code prefixed to national numbers, without `+`.
    pub default_country_code: String,
    /// Length of a national significant number.
    pub national_number_length: usize,
    /// International prefixes accepted for phones, with `+`.
    pub accepted_prefixes: Vec<String>,
    pub min_age_years: Option<u32>,
}

impl Default for TenantRules {
    fn default() -> Self {
        Self {
            strong_identifiers: fields::STRONG_IDENTIFIERS
                .iter()
                .map(ToString::to_string)
                .collect(),
            mandatory_fields: Vec::new(),
            default_country_code: "237".to_string(),
            national_number_length: 9,
            accepted_prefixes: ["+237", "+241", "+235", "+236", "+242", "+240"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            min_age_years: None,
        }
    }
}

impl TenantRules {
    /// An empty prefix list accepts any international number.
    pub fn accepts_prefix(&self, phone: &str) -> bool {
        self.accepted_prefixes.is_empty()
            || self
                .accepted_prefixes
                .iter()
                .any(|prefix| phone.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_accept_cemac_prefixes() {
        let rules = TenantRules::default();
        assert!(rules.accepts_prefix("+237699000000"));
        assert!(rules.accepts_prefix("+241060000000"));
        assert!(!rules.accepts_prefix("+33612345678"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let rules: TenantRules = toml::from_str("min_age_years = 3").unwrap();
        assert_eq!(rules.min_age_years, Some(3));
        assert_eq!(rules.default_country_code, "237");
        assert_eq!(rules.strong_identifiers.len(), 3);
    }
}
