//! End-to-end import runs over a seeded pipeline.

use anyhow::{Context, Result};
use tracing::{info, info_span, warn};

use roster_core::{PipelineError, RowReport, StageSummary};
use roster_map::{MappingProposal, MappingResolver, MappingSelector, ProposalSource};
use roster_model::{BatchRequest, BatchStatus, CommitLog, DedupStrategy, ImportBatch, TenantId};
use roster_store::RecordStore;

use crate::seed::SeededPipeline;
use crate::source::SourceFile;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub tenant: TenantId,
    pub school_year: String,
    pub strategy: DedupStrategy,
    pub selector: MappingSelector,
    /// Name to store a suggested mapping under.
    pub save_as: Option<String>,
    pub operator: String,
    /// Stop after validation.
    pub dry_run: bool,
}

/// Everything an operator is shown after an import.
#[derive(Debug, Clone)]
pub struct ImportRun {
    pub batch: ImportBatch,
    pub proposal: MappingProposal,
    /// `name@vN` of a mapping stored during this run.
    pub saved_mapping: Option<String>,
    pub staged: StageSummary,
    pub errors: Vec<RowReport>,
    pub warnings: Vec<RowReport>,
    pub commit_log: Option<CommitLog>,
    /// Operator text for a commit that returned an error.
    pub commit_error: Option<String>,
    /// Records the tenant holds after the run.
    pub records_total: usize,
}

impl ImportRun {
    /// 1 when the batch failed, 0 otherwise. Invalid rows alone do not fail
    /// an import; they are reported and left out of the commit.
    pub fn exit_code(&self) -> i32 {
        if self.batch.status == BatchStatus::Failed || self.commit_error.is_some() {
            1
        } else {
            0
        }
    }
}

/// Wraps a pipeline error with the text an operator should see.
pub fn operator_error(error: PipelineError) -> anyhow::Error {
    let message = error.user_message();
    anyhow::Error::new(error).context(message)
}

/// Runs one upload through every stage up to commit.
///
/// A file no mapping fits is rejected: its batch is failed with the reason
/// and the error is returned.
pub fn import(
    seeded: &SeededPipeline,
    source: SourceFile,
    options: &ImportOptions,
) -> Result<ImportRun> {
    let pipeline = &seeded.pipeline;
    let tenant = &options.tenant;
    let span = info_span!("import", tenant = %tenant, file = %source.manifest.original_filename);
    let _guard = span.enter();

    let batch = pipeline
        .create_batch(BatchRequest {
            tenant: tenant.clone(),
            created_by: options.operator.clone(),
            school_year: options.school_year.clone(),
            strategy: options.strategy,
            manifest: source.manifest,
        })
        .map_err(operator_error)?;

    let proposal = match pipeline.propose_mapping(tenant, batch.id, &options.selector) {
        Ok(proposal) => proposal,
        Err(error) => {
            pipeline
                .reject(tenant, batch.id, error.user_message())
                .map_err(operator_error)?;
            return Err(operator_error(error));
        }
    };
    info!(
        mapping = %proposal.mapping,
        confidence = proposal.confidence,
        unmapped = proposal.unmapped_headers.len(),
        "mapping proposed"
    );

    let mut mapping = proposal.mapping.clone();
    let saved_mapping = match &options.save_as {
        Some(name) if proposal.source == ProposalSource::Suggested => {
            let version = seeded
                .mappings
                .latest(tenant, name)
                .context("failed to read saved mappings")?
                .map_or(1, |latest| latest.version + 1);
            mapping.name = name.clone();
            mapping.version = version;
            pipeline.save_mapping(&mapping).map_err(operator_error)?;
            Some(format!("{name}@v{version}"))
        }
        Some(name) => {
            warn!(name = %name, "only suggested mappings are saved");
            None
        }
        None => None,
    };

    pipeline
        .accept_mapping(tenant, batch.id, mapping)
        .map_err(operator_error)?;
    let staged = pipeline
        .stage_rows(tenant, batch.id, source.rows)
        .map_err(operator_error)?;
    let errors = pipeline
        .error_report(tenant, batch.id)
        .map_err(operator_error)?;
    let warnings = pipeline
        .warning_report(tenant, batch.id)
        .map_err(operator_error)?;

    let mut commit_log = None;
    let mut commit_error = None;
    if !options.dry_run {
        pipeline
            .confirm(tenant, batch.id)
            .map_err(operator_error)?;
        match pipeline.commit(tenant, batch.id) {
            Ok(log) => commit_log = Some(log),
            Err(error) => {
                warn!(batch_id = %batch.id, %error, "commit did not complete");
                commit_error = Some(error.user_message());
                commit_log = pipeline
                    .commit_log(tenant, batch.id)
                    .map_err(operator_error)?;
            }
        }
    }

    let batch = pipeline.status(tenant, batch.id).map_err(operator_error)?;
    let records_total = seeded
        .records
        .count(tenant)
        .context("failed to count records")?;
    Ok(ImportRun {
        batch,
        proposal,
        saved_mapping,
        staged,
        errors,
        warnings,
        commit_log,
        commit_error,
        records_total,
    })
}

/// The mapping [`import`] would start from, without opening a batch.
pub fn suggest(
    seeded: &SeededPipeline,
    tenant: &TenantId,
    headers: &[String],
) -> Result<MappingProposal> {
    let min_confidence = seeded.pipeline.config().mapping_min_confidence as f32;
    let resolver = MappingResolver::new(seeded.mappings.clone(), min_confidence);
    resolver
        .propose(tenant, headers, &MappingSelector::Auto)
        .map_err(|error| operator_error(PipelineError::Mapping(error)))
}
