//! Import pipeline: drives one batch from upload to commit.
//!
//! Every operation takes the tenant explicitly and only ever sees that
//! tenant's batches, mappings and records. Stage order follows the batch
//! lifecycle:
//!
//! 1. [`ImportPipeline::create_batch`] opens an `uploaded` batch
//! 2. [`ImportPipeline::propose_mapping`] / [`ImportPipeline::accept_mapping`]
//!    snapshot a mapping into it (`mapped`)
//! 3. [`ImportPipeline::stage_rows`] normalizes and validates rows
//!    (`validated`, repeatable)
//! 4. [`ImportPipeline::confirm`] records operator approval
//!    (`ready_to_commit`)
//! 5. [`ImportPipeline::commit`] writes the valid rows (`committed` or
//!    `failed`)

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use roster_commit::{CancellationToken, CommitEngine, TenantLockCoordinator};
use roster_map::{MappingProposal, MappingResolver, MappingSelector, MappingStore};
use roster_model::{
    BatchId, BatchRequest, BatchStatus, CommitLog, ImportBatch, ImportMapping, RawRow, RowStatus,
    StagingRow, TenantId, TenantRules,
};
use roster_store::{LookupCache, PurgeSummary, RecordStore, ReferenceSource, StagingStore};
use roster_transform::TransformEngine;
use roster_validate::ValidationEngine;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::report::{CancelOutcome, RowReport, StageSummary};

/// External collaborators the pipeline reads and writes through.
#[derive(Clone)]
pub struct Collaborators {
    pub staging: Arc<dyn StagingStore>,
    pub records: Arc<dyn RecordStore>,
    pub references: Arc<dyn ReferenceSource>,
    pub mappings: Arc<dyn MappingStore>,
}

pub struct ImportPipeline {
    config: PipelineConfig,
    staging: Arc<dyn StagingStore>,
    records: Arc<dyn RecordStore>,
    lookup: Arc<LookupCache>,
    resolver: MappingResolver,
    committer: CommitEngine,
    default_rules: TenantRules,
    tenant_rules: HashMap<TenantId, TenantRules>,
    /// Cancellation handles of commits in flight.
    running: Mutex<HashMap<BatchId, (TenantId, CancellationToken)>>,
    /// Batches with a mapping, staging, confirm or cancel call in flight.
    busy: Mutex<HashSet<BatchId>>,
}

/// Exclusive hold on one batch, released on drop.
struct BatchClaim<'a> {
    busy: &'a Mutex<HashSet<BatchId>>,
    batch_id: BatchId,
}

impl Drop for BatchClaim<'_> {
    fn drop(&mut self) {
        match self.busy.lock() {
            Ok(mut busy) => {
                busy.remove(&self.batch_id);
            }
            Err(_) => warn!(batch_id = %self.batch_id, "batch claim registry poisoned"),
        }
    }
}

impl ImportPipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let lookup = Arc::new(LookupCache::with_retry(collaborators.references, config.retry));
        let committer = CommitEngine::new(
            collaborators.staging.clone(),
            collaborators.records.clone(),
            lookup.clone(),
            TenantLockCoordinator::new(config.lock_ttl()),
            config.commit_settings(),
        );
        let resolver =
            MappingResolver::new(collaborators.mappings, config.mapping_min_confidence as f32);
        Ok(Self {
            config,
            staging: collaborators.staging,
            records: collaborators.records,
            lookup,
            resolver,
            committer,
            default_rules: TenantRules::default(),
            tenant_rules: HashMap::new(),
            running: Mutex::new(HashMap::new()),
            busy: Mutex::new(HashSet::new()),
        })
    }

    /// Rules for `tenant`; tenants without their own use the defaults.
    pub fn with_tenant_rules(mut self, tenant: TenantId, rules: TenantRules) -> Self {
        self.tenant_rules.insert(tenant, rules);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules_for(&self, tenant: &TenantId) -> &TenantRules {
        self.tenant_rules.get(tenant).unwrap_or(&self.default_rules)
    }

    pub fn create_batch(&self, request: BatchRequest) -> Result<ImportBatch> {
        let batch = ImportBatch::new(request)?;
        self.staging.insert_batch(batch.clone())?;
        info!(
            tenant = %batch.tenant,
            batch_id = %batch.id,
            format = %batch.manifest.format,
            rows = batch.manifest.row_count,
            strategy = %batch.strategy,
            "batch created"
        );
        Ok(batch)
    }

    /// Proposes a mapping for the batch headers. Nothing is stored.
    ///
    /// `NoMappingAvailable` leaves the batch `uploaded` so the operator can
    /// still pick a mapping by name.
    pub fn propose_mapping(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        selector: &MappingSelector,
    ) -> Result<MappingProposal> {
        let batch = self.staging.batch(tenant, batch_id)?;
        expect_status(&batch, &[BatchStatus::Uploaded], "select a mapping")?;
        Ok(self
            .resolver
            .propose(tenant, &batch.manifest.headers, selector)?)
    }

    /// Stores a new mapping version for later batches.
    pub fn save_mapping(&self, mapping: &ImportMapping) -> Result<()> {
        mapping.check_limits()?;
        self.resolver.store().save(mapping)?;
        info!(mapping = %mapping, "mapping saved");
        Ok(())
    }

    /// Snapshots `mapping` into the batch and moves it to `mapped`.
    pub fn accept_mapping(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        mapping: ImportMapping,
    ) -> Result<ImportBatch> {
        if mapping.tenant != *tenant {
            return Err(PipelineError::TenantMismatch {
                expected: tenant.clone(),
                found: mapping.tenant,
            });
        }
        mapping.check_limits()?;

        let _claim = self.claim(batch_id)?;
        let mut batch = self.staging.batch(tenant, batch_id)?;
        expect_status(&batch, &[BatchStatus::Uploaded], "accept a mapping")?;
        batch.transition(BatchStatus::Mapped)?;
        info!(batch_id = %batch_id, mapping = %mapping, "mapping accepted");
        batch.mapping = Some(mapping);
        self.staging.update_batch(&batch, BatchStatus::Uploaded)?;
        Ok(batch)
    }

    /// Normalizes and validates `rows`, then revalidates the whole batch.
    ///
    /// May be called repeatedly while the batch is `mapped` or `validated`.
    /// A row index seen before replaces the earlier row.
    pub fn stage_rows(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        rows: Vec<RawRow>,
    ) -> Result<StageSummary> {
        let span = info_span!("stage_rows", tenant = %tenant, batch_id = %batch_id);
        let _enter = span.enter();

        let _claim = self.claim(batch_id)?;
        let mut batch = self.staging.batch(tenant, batch_id)?;
        expect_status(
            &batch,
            &[BatchStatus::Mapped, BatchStatus::Validated],
            "process rows",
        )?;
        let read_status = batch.status;
        let mapping = batch
            .mapping
            .clone()
            .ok_or(PipelineError::MissingMapping { batch_id })?;
        let rules = self.rules_for(tenant);

        let received = rows.len();
        let normalized = TransformEngine::new(&mapping, rules).normalize_rows(&rows)?;
        let staged: Vec<StagingRow> = rows
            .into_iter()
            .zip(normalized)
            .map(|(raw, normalized)| {
                let mut row = StagingRow::new(batch_id, tenant.clone(), raw);
                row.set_normalized(normalized.values, normalized.row_hash);
                row
            })
            .collect();
        let upserted = self.staging.upsert_rows(tenant, batch_id, staged)?;

        // In-batch uniqueness depends on every row, not only the new ones.
        let mut all_rows = self.staging.rows(tenant, batch_id)?;
        let validation = ValidationEngine::new(
            tenant.clone(),
            rules.clone(),
            &mapping,
            self.lookup.clone(),
            self.records.clone(),
        )
        .with_retry(self.config.retry)
        .validate_batch(&mut all_rows)?;
        let total_rows = all_rows.len();
        self.staging.upsert_rows(tenant, batch_id, all_rows)?;

        batch.counters.total_rows = total_rows;
        batch.counters.valid_rows = validation.valid;
        batch.counters.error_rows = validation.error;
        batch.counters.duplicate_rows += upserted.duplicates.len();
        batch.transition(BatchStatus::Validated)?;
        self.staging.update_batch(&batch, read_status)?;

        info!(
            received,
            stored = upserted.stored,
            duplicates = upserted.duplicates.len(),
            valid = validation.valid,
            error = validation.error,
            with_warnings = validation.with_warnings,
            "rows staged"
        );
        Ok(StageSummary {
            received,
            stored: upserted.stored,
            duplicates: upserted.duplicates,
            validation,
        })
    }

    /// Operator approval: `validated` to `ready_to_commit`.
    pub fn confirm(&self, tenant: &TenantId, batch_id: BatchId) -> Result<ImportBatch> {
        let _claim = self.claim(batch_id)?;
        let mut batch = self.staging.batch(tenant, batch_id)?;
        expect_status(&batch, &[BatchStatus::Validated], "be confirmed")?;
        batch.transition(BatchStatus::ReadyToCommit)?;
        self.staging.update_batch(&batch, BatchStatus::Validated)?;
        info!(
            batch_id = %batch_id,
            valid = batch.counters.valid_rows,
            error = batch.counters.error_rows,
            "batch confirmed"
        );
        Ok(batch)
    }

    /// Commits the valid rows of a confirmed batch.
    ///
    /// The run can be stopped from another thread with [`Self::cancel`].
    pub fn commit(&self, tenant: &TenantId, batch_id: BatchId) -> Result<CommitLog> {
        let cancel = CancellationToken::new();
        {
            let mut running = self.running.lock().map_err(|_| PipelineError::Poisoned)?;
            if running.contains_key(&batch_id) {
                return Err(PipelineError::CommitInProgress { batch_id });
            }
            running.insert(batch_id, (tenant.clone(), cancel.clone()));
        }

        let result = self.committer.commit(tenant, batch_id, &cancel);

        match self.running.lock() {
            Ok(mut running) => {
                running.remove(&batch_id);
            }
            Err(_) => warn!(batch_id = %batch_id, "commit registry poisoned"),
        }
        Ok(result?)
    }

    /// Cancels a batch that is not yet committed.
    ///
    /// A running commit finishes its current chunk, records partial counts
    /// and fails the batch. An idle batch fails immediately.
    pub fn cancel(&self, tenant: &TenantId, batch_id: BatchId) -> Result<CancelOutcome> {
        // Held throughout so a commit cannot start between the check and
        // the status update.
        let running = self.running.lock().map_err(|_| PipelineError::Poisoned)?;
        if let Some((owner, token)) = running.get(&batch_id)
            && owner == tenant
        {
            token.cancel();
            info!(batch_id = %batch_id, "cancellation requested for running commit");
            return Ok(CancelOutcome::Signalled);
        }

        let _claim = self.claim(batch_id)?;
        let mut batch = self.staging.batch(tenant, batch_id)?;
        if batch.is_terminal() {
            return Err(PipelineError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "be cancelled",
            });
        }
        let read_status = batch.status;
        batch.fail("cancelled by operator")?;
        self.staging.update_batch(&batch, read_status)?;
        drop(running);
        info!(batch_id = %batch_id, "batch cancelled");
        Ok(CancelOutcome::Failed)
    }

    /// Fails the batch for an input problem found outside the pipeline,
    /// such as an unreadable file.
    pub fn reject(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        reason: impl Into<String>,
    ) -> Result<ImportBatch> {
        let reason = reason.into();
        let _claim = self.claim(batch_id)?;
        let mut batch = self.staging.batch(tenant, batch_id)?;
        if batch.is_terminal() {
            return Err(PipelineError::InvalidState {
                batch_id,
                status: batch.status,
                operation: "be rejected",
            });
        }
        warn!(batch_id = %batch_id, %reason, "batch rejected");
        let read_status = batch.status;
        batch.fail(reason)?;
        self.staging.update_batch(&batch, read_status)?;
        Ok(batch)
    }

    pub fn status(&self, tenant: &TenantId, batch_id: BatchId) -> Result<ImportBatch> {
        Ok(self.staging.batch(tenant, batch_id)?)
    }

    /// Batches of the tenant, oldest first.
    pub fn batches(&self, tenant: &TenantId) -> Result<Vec<ImportBatch>> {
        Ok(self.staging.batches(tenant)?)
    }

    /// Rows with `error` status, by row index.
    pub fn error_report(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Vec<RowReport>> {
        self.report(tenant, batch_id, |row| row.status == RowStatus::Error)
    }

    /// Valid rows carrying warnings, by row index.
    pub fn warning_report(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Vec<RowReport>> {
        self.report(tenant, batch_id, |row| {
            row.status == RowStatus::Valid && row.has_warnings()
        })
    }

    fn report(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        keep: impl Fn(&StagingRow) -> bool,
    ) -> Result<Vec<RowReport>> {
        Ok(self
            .staging
            .rows(tenant, batch_id)?
            .into_iter()
            .filter(keep)
            .map(RowReport::from)
            .collect())
    }

    pub fn commit_log(&self, tenant: &TenantId, batch_id: BatchId) -> Result<Option<CommitLog>> {
        Ok(self.staging.commit_log(tenant, batch_id)?)
    }

    /// Retention hook: drops staged batches of `tenant` created before
    /// `older_than`. Commit logs are kept.
    pub fn purge(&self, tenant: &TenantId, older_than: DateTime<Utc>) -> Result<PurgeSummary> {
        Ok(self.staging.purge(tenant, older_than)?)
    }

    /// [`Self::purge`] with the configured retention window.
    pub fn purge_expired(&self, tenant: &TenantId) -> Result<PurgeSummary> {
        self.purge(tenant, self.config.retention_cutoff(Utc::now()))
    }

    /// Holds `batch_id` until the returned claim drops. A second claim on the
    /// same batch fails instead of waiting.
    fn claim(&self, batch_id: BatchId) -> Result<BatchClaim<'_>> {
        let mut busy = self.busy.lock().map_err(|_| PipelineError::Poisoned)?;
        if !busy.insert(batch_id) {
            return Err(PipelineError::BatchBusy { batch_id });
        }
        Ok(BatchClaim {
            busy: &self.busy,
            batch_id,
        })
    }

    /// Forgets cached reference codes of `tenant` after its tables change.
    pub fn invalidate_references(&self, tenant: &TenantId) -> Result<()> {
        self.lookup.invalidate(tenant)?;
        debug!(tenant = %tenant, "reference cache invalidated");
        Ok(())
    }
}

impl std::fmt::Debug for ImportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportPipeline")
            .field("config", &self.config)
            .field("tenants", &self.tenant_rules.len())
            .finish_non_exhaustive()
    }
}

fn expect_status(
    batch: &ImportBatch,
    allowed: &[BatchStatus],
    operation: &'static str,
) -> Result<()> {
    if allowed.contains(&batch.status) {
        Ok(())
    } else {
        Err(PipelineError::InvalidState {
            batch_id: batch.id,
            status: batch.status,
            operation,
        })
    }
}
