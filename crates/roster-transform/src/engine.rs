//! Transform rule interpreter.
//!
//! Normalization of one row:
//!
//! 1. Every raw column assigned by the mapping is copied verbatim to its
//!    canonical field. Columns are matched on folded headers, so
//!    `"Téléphone "` finds a mapping written for `"telephone"`.
//! 2. Rules run in declared order. A rule reads its inputs from the fields
//!    produced so far, falling back to raw columns, and writes its target.
//!    A rule whose inputs are all missing does nothing; a rule that cannot
//!    normalize its input leaves the value as it was.
//! 3. Phone fields not handled by an explicit rule are normalized with the
//!    tenant's calling code, so every phone reaching validation is either
//!    international or left untouched for validation to reject.
//!
//! The engine never rejects a row.

use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use tracing::{debug, trace};

use roster_map::fold_header;
use roster_model::{
    ImportMapping, RawRow, RowHash, TenantRules, TransformOp, TransformRule, fields,
};
use roster_store::{Result, row_hash};

use crate::normalization::{collapse_whitespace, normalize_phone, reparse_date, title_case};

const PHONE_FIELDS: [&str; 3] = [fields::PHONE, fields::PARENT_PHONE_1, fields::PARENT_PHONE_2];

/// Output of the engine for one raw row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow {
    pub row_index: u32,
    pub values: BTreeMap<String, String>,
    pub row_hash: RowHash,
}

/// Applies one mapping to raw rows.
///
/// Built once per batch; holds only read-only data so rows can be
/// normalized in parallel.
#[derive(Debug, Clone)]
pub struct TransformEngine {
    /// Folded column header -> canonical field.
    columns: HashMap<String, String>,
    rules: Vec<TransformRule>,
    country_code: String,
    national_number_length: usize,
}

impl TransformEngine {
    pub fn new(mapping: &ImportMapping, tenant_rules: &TenantRules) -> Self {
        let mut columns = HashMap::with_capacity(mapping.field_mappings.len());
        for (column, target) in &mapping.field_mappings {
            columns
                .entry(fold_header(column))
                .or_insert_with(|| target.clone());
        }
        Self {
            columns,
            rules: mapping.transforms.clone(),
            country_code: tenant_rules.default_country_code.clone(),
            national_number_length: tenant_rules.national_number_length,
        }
    }

    /// Normalizes one row and fingerprints the result.
    pub fn normalize(&self, raw: &RawRow) -> Result<NormalizedRow> {
        let values = self.normalize_values(raw);
        let row_hash = row_hash(&values)?;
        trace!(row = raw.row_index, fields = values.len(), "row normalized");
        Ok(NormalizedRow {
            row_index: raw.row_index,
            values,
            row_hash,
        })
    }

    /// Normalizes rows in parallel. Output order matches input order.
    pub fn normalize_rows(&self, rows: &[RawRow]) -> Result<Vec<NormalizedRow>> {
        let normalized = rows
            .par_iter()
            .map(|raw| self.normalize(raw))
            .collect::<Result<Vec<_>>>()?;
        debug!(rows = normalized.len(), rules = self.rules.len(), "rows normalized");
        Ok(normalized)
    }

    fn normalize_values(&self, raw: &RawRow) -> BTreeMap<String, String> {
        let mut raw_by_header: HashMap<String, &str> = HashMap::with_capacity(raw.values.len());
        let mut values = BTreeMap::new();
        // Raw values are in header order; the first non-blank column wins
        // when several columns feed the same field.
        for (header, value) in &raw.values {
            let folded = fold_header(header);
            if let Some(target) = self.columns.get(&folded) {
                let slot = values.entry(target.clone()).or_insert_with(String::new);
                if slot.trim().is_empty() {
                    slot.clone_from(value);
                }
            }
            raw_by_header.entry(folded).or_insert(value.as_str());
        }

        let mut phones_done: Vec<&str> = Vec::new();
        for rule in &self.rules {
            let inputs: Vec<String> = rule
                .inputs()
                .into_iter()
                .filter_map(|name| {
                    values
                        .get(name)
                        .map(String::as_str)
                        .or_else(|| raw_by_header.get(&fold_header(name)).copied())
                        .map(str::to_string)
                })
                .collect();
            if let TransformOp::PhoneNormalize { .. } = rule.op {
                phones_done.push(rule.target.as_str());
            }
            if let Some(output) = self.apply(&rule.op, &inputs) {
                values.insert(rule.target.clone(), output);
            }
        }

        for field in PHONE_FIELDS {
            if phones_done.contains(&field) {
                continue;
            }
            if let Some(value) = values.get_mut(field)
                && let Some(phone) =
                    normalize_phone(value, &self.country_code, self.national_number_length)
            {
                *value = phone;
            }
        }
        values
    }

    fn apply(&self, op: &TransformOp, inputs: &[String]) -> Option<String> {
        let value = inputs.first()?;
        let output = match op {
            TransformOp::Concat { separator } => {
                let parts: Vec<&str> = inputs
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect();
                if parts.is_empty() {
                    return None;
                }
                parts.join(separator)
            }
            TransformOp::Trim => value.trim().to_string(),
            TransformOp::Lowercase => value.to_lowercase(),
            TransformOp::Uppercase => value.to_uppercase(),
            TransformOp::TitleCase => title_case(value),
            TransformOp::CollapseWhitespace => collapse_whitespace(value),
            TransformOp::PhoneNormalize { country_code } => {
                let code = country_code.as_deref().unwrap_or(&self.country_code);
                normalize_phone(value, code, self.national_number_length)
                    .unwrap_or_else(|| value.clone())
            }
            TransformOp::DateReparse { pattern } => {
                reparse_date(value, pattern).unwrap_or_else(|| value.clone())
            }
        };
        Some(output)
    }
}
