//! Row and batch validation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, trace};

use roster_model::{
    ErrorCode, ErrorDescriptor, ImportMapping, RequiredTarget, RowStatus, StagingRow, TenantId,
    TenantRules, fields, fields::present,
};
use roster_store::{LookupCache, RecordStore, Result, RetryPolicy, StoreError};

use crate::checks::{contact, dates, identity, reference, required};

/// Outcome counts of [`ValidationEngine::validate_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub valid: usize,
    pub error: usize,
    /// Valid rows carrying at least one warning.
    pub with_warnings: usize,
}

/// Validates normalized rows of one tenant against its rules and the
/// required targets of the batch mapping.
pub struct ValidationEngine {
    tenant: TenantId,
    rules: TenantRules,
    required: Vec<RequiredTarget>,
    lookup: Arc<LookupCache>,
    records: Arc<dyn RecordStore>,
    retry: RetryPolicy,
    today: NaiveDate,
}

impl ValidationEngine {
    pub fn new(
        tenant: TenantId,
        rules: TenantRules,
        mapping: &ImportMapping,
        lookup: Arc<LookupCache>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            tenant,
            rules,
            required: mapping.required_targets.clone(),
            lookup,
            records,
            retry: RetryPolicy::default(),
            today: Utc::now().date_naive(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Date used for the date-of-birth checks.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Findings for one row, in check order.
    ///
    /// Only collaborator failures are errors; a bad row yields
    /// descriptors.
    pub fn validate_row(&self, normalized: &BTreeMap<String, String>) -> Result<Vec<ErrorDescriptor>> {
        let mut findings = required::check(normalized, &self.rules, &self.required);
        findings.extend(contact::check_email(normalized));
        findings.extend(contact::check_phones(normalized, &self.rules));
        findings.extend(dates::check_date_of_birth(
            normalized,
            self.today,
            self.rules.min_age_years,
        ));
        findings.extend(dates::check_school_year(normalized));
        findings.extend(reference::check(normalized, &self.tenant, &self.lookup)?);
        findings.extend(identity::check(
            normalized,
            &self.tenant,
            self.records.as_ref(),
            &self.retry,
        )?);
        Ok(findings)
    }

    /// Validates every row and sets its status.
    ///
    /// Rows are checked in parallel. Matricule uniqueness within the batch
    /// is then settled in row order: the first otherwise valid row keeps
    /// the matricule and later rows carrying it are marked as duplicates.
    pub fn validate_batch(&self, rows: &mut [StagingRow]) -> Result<ValidationSummary> {
        if let Some(foreign) = rows.iter().find(|row| row.tenant != self.tenant) {
            return Err(StoreError::TenantMismatch {
                expected: self.tenant.clone(),
                found: foreign.tenant.clone(),
            });
        }

        let mut findings = rows
            .par_iter()
            .map(|row| self.validate_row(&row.normalized))
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|&i| rows[i].row_index);
        let mut claimed: HashMap<&str, u32> = HashMap::new();
        for i in order {
            let Some(matricule) = present(&rows[i].normalized, fields::MATRICULE) else {
                continue;
            };
            let already_flagged = findings[i]
                .iter()
                .any(|f| f.code == ErrorCode::DuplicateMatricule);
            if let Some(first) = claimed.get(matricule)
                && !already_flagged
            {
                trace!(row = rows[i].row_index, first, "duplicate matricule in batch");
                findings[i].push(ErrorDescriptor::error(
                    Some(fields::MATRICULE),
                    ErrorCode::DuplicateMatricule,
                    format!("Matricule '{matricule}' is already used by row {first}"),
                ));
            } else if !claimed.contains_key(matricule)
                && !findings[i].iter().any(ErrorDescriptor::is_error)
            {
                claimed.insert(matricule, rows[i].row_index);
            }
        }

        let mut summary = ValidationSummary::default();
        for (row, row_findings) in rows.iter_mut().zip(findings) {
            row.apply_findings(row_findings);
            match row.status {
                RowStatus::Valid => {
                    summary.valid += 1;
                    if row.has_warnings() {
                        summary.with_warnings += 1;
                    }
                }
                _ => summary.error += 1,
            }
        }
        debug!(rows = rows.len(), "rows validated");
        info!(
            tenant = %self.tenant,
            valid = summary.valid,
            error = summary.error,
            warnings = summary.with_warnings,
            "validation complete"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("tenant", &self.tenant)
            .field("rules", &self.rules)
            .field("required", &self.required)
            .field("today", &self.today)
            .finish_non_exhaustive()
    }
}
