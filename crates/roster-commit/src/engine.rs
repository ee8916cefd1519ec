//! Dedup/upsert commit engine.
//!
//! A run holds the tenant lease for its whole duration and walks the
//! batch's valid rows in row order, in chunks of `chunk_size`:
//!
//! 1. rows of the chunk are prepared in parallel (reference codes resolved,
//!    existing records looked up by email, phone, then matricule)
//! 2. the chunk is planned sequentially against the batch strategy
//! 3. the plan is written with a single all-or-nothing bulk call
//!
//! Cancellation and lease renewal are checked between chunks. Every run
//! that reaches the rows ends with exactly one commit log and the batch in
//! `committed` or `failed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use roster_model::{
    BatchId, BatchStatus, CommitCounts, CommitLog, CommitOutcome, ImportBatch, OutcomeSample,
    Provenance, RecordDraft, ReferenceKind, RowAction, RowStatus, StagingRow, TenantId, fields,
    fields::present,
};
use roster_store::{
    LookupCache, RecordStore, RetryPolicy, StagingStore, StoreError, WriteOutcome,
};

use crate::cancel::CancellationToken;
use crate::error::{CommitError, Result};
use crate::lock::{TenantLease, TenantLockCoordinator};
use crate::plan::{ChunkPlan, PlannedRow, PreparedRow, Target, plan_chunk};

#[derive(Debug, Clone)]
pub struct CommitSettings {
    /// Rows per bulk write.
    pub chunk_size: usize,
    /// Outcomes kept in the commit log preview.
    pub sample_size: usize,
    /// How long one lock attempt waits for the tenant lease.
    pub lock_wait: Duration,
    pub retry: RetryPolicy,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            sample_size: 5,
            lock_wait: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Totals of a run in progress.
#[derive(Debug, Default)]
struct RunState {
    counts: CommitCounts,
    chunks_applied: usize,
    sample: Vec<OutcomeSample>,
}

/// How the chunk loop ended.
enum Stop {
    Done(CommitOutcome),
    Failed {
        outcome: CommitOutcome,
        error: CommitError,
    },
}

pub struct CommitEngine {
    staging: Arc<dyn StagingStore>,
    records: Arc<dyn RecordStore>,
    lookup: Arc<LookupCache>,
    locks: Arc<TenantLockCoordinator>,
    settings: CommitSettings,
}

impl CommitEngine {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        records: Arc<dyn RecordStore>,
        lookup: Arc<LookupCache>,
        locks: Arc<TenantLockCoordinator>,
        settings: CommitSettings,
    ) -> Self {
        Self {
            staging,
            records,
            lookup,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &CommitSettings {
        &self.settings
    }

    /// Commits the valid rows of a `ready_to_commit` batch.
    ///
    /// Returns the commit log for completed, cancelled and conflict-aborted
    /// runs. Collaborator failures after the first chunk started also write
    /// the log, then surface as [`CommitError::Chunk`]. Nothing is written
    /// when the tenant lease cannot be obtained.
    pub fn commit(
        &self,
        tenant: &TenantId,
        batch_id: BatchId,
        cancel: &CancellationToken,
    ) -> Result<CommitLog> {
        let span = info_span!("commit", tenant = %tenant, batch_id = %batch_id);
        let _enter = span.enter();

        let lease = self.settings.retry.run("tenant lock", || {
            self.locks.acquire(tenant, self.settings.lock_wait)
        })?;

        let mut batch = self.staging.batch(tenant, batch_id)?;
        if batch.status != BatchStatus::ReadyToCommit {
            return Err(CommitError::NotReady {
                batch_id,
                status: batch.status,
            });
        }
        if self.staging.commit_log(tenant, batch_id)?.is_some() {
            return Err(CommitError::AlreadyCommitted { batch_id });
        }

        let started = Instant::now();
        let rows = self.staging.rows(tenant, batch_id)?;
        let mut state = RunState::default();
        state.counts.error_rows = rows
            .iter()
            .filter(|row| row.status == RowStatus::Error)
            .count();
        let mut valid: Vec<StagingRow> = rows
            .into_iter()
            .filter(StagingRow::is_committable)
            .collect();
        valid.sort_by_key(|row| row.row_index);

        let chunk_size = self.settings.chunk_size.max(1);
        info!(
            rows = valid.len(),
            chunk_size,
            strategy = %batch.strategy,
            "commit started"
        );

        let stop = self.run_chunks(&batch, &lease, &valid, chunk_size, cancel, &mut state);

        let (outcome, error) = match stop {
            Stop::Done(outcome) => (outcome, None),
            Stop::Failed { outcome, error } => (outcome, Some(error)),
        };
        let log = CommitLog {
            batch_id,
            tenant: tenant.clone(),
            strategy: batch.strategy,
            counts: state.counts,
            chunks_applied: state.chunks_applied,
            duration_ms: started.elapsed().as_millis() as u64,
            outcome,
            sample: state.sample,
            committed_at: Utc::now(),
        };
        self.staging.append_commit_log(log.clone())?;

        match &log.outcome {
            CommitOutcome::Completed => {
                batch.transition(BatchStatus::Committed)?;
                info!(
                    created = log.counts.created,
                    updated = log.counts.updated,
                    skipped = log.counts.skipped,
                    duration_ms = log.duration_ms,
                    "commit finished"
                );
            }
            CommitOutcome::Aborted { reason, .. } => {
                warn!(chunks_applied = log.chunks_applied, %reason, "commit aborted");
                batch.fail(format!("commit aborted: {reason}"))?;
            }
            CommitOutcome::Cancelled { chunk_index } => {
                warn!(chunk_index, "commit cancelled");
                batch.fail("commit cancelled")?;
            }
        }
        self.staging
            .update_batch(&batch, BatchStatus::ReadyToCommit)?;

        match error {
            Some(error) => Err(error),
            None => Ok(log),
        }
    }

    fn run_chunks(
        &self,
        batch: &ImportBatch,
        lease: &TenantLease,
        rows: &[StagingRow],
        chunk_size: usize,
        cancel: &CancellationToken,
        state: &mut RunState,
    ) -> Stop {
        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            if cancel.is_cancelled() {
                return Stop::Done(CommitOutcome::Cancelled { chunk_index });
            }
            if let Err(error) = lease.renew() {
                return Stop::Failed {
                    outcome: aborted(chunk_index, None, error.to_string()),
                    error,
                };
            }

            let prepared = match self.prepare_chunk(batch, chunk) {
                Ok(prepared) => prepared,
                Err(source) => return chunk_failure(batch.id, chunk_index, source),
            };
            let (writes, planned) = match plan_chunk(&batch.tenant, batch.strategy, &prepared) {
                ChunkPlan::Ready { writes, rows } => (writes, rows),
                ChunkPlan::Conflict { row_index, reason } => {
                    return Stop::Done(aborted(chunk_index, Some(row_index), reason));
                }
            };

            let outcomes = if writes.is_empty() {
                Vec::new()
            } else {
                let written = self.settings.retry.run("chunk write", || {
                    self.records.apply_chunk(&batch.tenant, writes.clone())
                });
                match written {
                    Ok(outcomes) => outcomes,
                    Err(source) if source.is_conflict() => {
                        return Stop::Done(aborted(chunk_index, None, source.to_string()));
                    }
                    Err(source) => return chunk_failure(batch.id, chunk_index, source),
                }
            };

            self.tally(state, &planned, &outcomes);
            state.chunks_applied += 1;
            debug!(
                chunk_index,
                rows = chunk.len(),
                writes = writes.len(),
                "chunk applied"
            );
        }
        Stop::Done(CommitOutcome::Completed)
    }

    fn prepare_chunk(
        &self,
        batch: &ImportBatch,
        chunk: &[StagingRow],
    ) -> std::result::Result<Vec<PreparedRow>, StoreError> {
        chunk
            .par_iter()
            .filter_map(|row| row.row_hash.map(|hash| (row, hash)))
            .map(|(row, row_hash)| {
                self.prepare_row(
                    batch,
                    row,
                    Provenance {
                        batch_id: batch.id,
                        row_hash,
                    },
                )
            })
            .collect()
    }

    fn prepare_row(
        &self,
        batch: &ImportBatch,
        row: &StagingRow,
        provenance: Provenance,
    ) -> std::result::Result<PreparedRow, StoreError> {
        let tenant = &batch.tenant;
        let retry = &self.settings.retry;
        let resolve = |field: &str, kind: ReferenceKind| match present(&row.normalized, field) {
            Some(code) => self.lookup.resolve(tenant, kind, code),
            None => Ok(None),
        };
        let level = resolve(fields::LEVEL, ReferenceKind::Level)?;
        let department = resolve(fields::DEPARTMENT, ReferenceKind::Department)?;

        let mut draft = RecordDraft::from_normalized(&row.normalized, level, department);
        if draft.profile.school_year.is_none() {
            draft.profile.school_year = Some(batch.school_year.clone());
        }

        let replay = retry
            .run("provenance lookup", || {
                self.records.find_by_provenance(tenant, &provenance)
            })?
            .map(|record| record.id);
        let mut matches = Vec::new();
        if replay.is_none() {
            for identifier in draft.identifiers() {
                let found = retry.run("record lookup", || {
                    self.records.find_by_identifier(tenant, &identifier)
                })?;
                if let Some(record) = found {
                    matches.push((identifier, record));
                }
            }
        }
        Ok(PreparedRow {
            row_index: row.row_index,
            provenance,
            draft,
            replay,
            matches,
        })
    }

    fn tally(&self, state: &mut RunState, planned: &[PlannedRow], outcomes: &[WriteOutcome]) {
        for row in planned {
            let (action, record_id) = match row.target {
                Target::Record(id) => (row.action, id),
                Target::Write(position) => match outcomes[position] {
                    // Created by an earlier run of this batch.
                    WriteOutcome::Replayed(id) => (RowAction::Skipped, id),
                    outcome => (row.action, outcome.record_id()),
                },
            };
            state.counts.record(action);
            if state.sample.len() < self.settings.sample_size {
                state.sample.push(OutcomeSample {
                    row_index: row.row_index,
                    action,
                    record_id,
                    identifier: row.identifier.as_ref().map(ToString::to_string),
                });
            }
        }
    }
}

impl std::fmt::Debug for CommitEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitEngine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn aborted(chunk_index: usize, row_index: Option<u32>, reason: String) -> CommitOutcome {
    CommitOutcome::Aborted {
        chunk_index,
        row_index,
        reason,
    }
}

fn chunk_failure(batch_id: BatchId, chunk_index: usize, source: StoreError) -> Stop {
    Stop::Failed {
        outcome: aborted(chunk_index, None, source.to_string()),
        error: CommitError::Chunk {
            batch_id,
            chunk_index,
            source,
        },
    }
}
