use anyhow::{Context, Result};
use tracing::{debug, info_span};

use roster_cli::seed::{Seed, SeededPipeline};
use roster_cli::source::{SourceFile, read_csv};
use roster_cli::workflow::{self, ImportOptions, ImportRun};
use roster_core::PipelineConfig;
use roster_map::{MappingProposal, MappingSelector};
use roster_model::TenantId;

use crate::cli::{ImportArgs, SourceArgs, SuggestArgs};

pub fn run_import(args: &ImportArgs) -> Result<ImportRun> {
    let (seeded, source, tenant) = open_source(&args.source)?;
    let span = info_span!("run_import", tenant = %tenant);
    let _guard = span.enter();

    let selector = match &args.mapping {
        Some(name) => MappingSelector::Named {
            name: name.clone(),
            version: args.mapping_version,
        },
        None => MappingSelector::Auto,
    };
    let options = ImportOptions {
        tenant,
        school_year: args.school_year.clone(),
        strategy: args.strategy.into(),
        selector,
        save_as: args.save_mapping.clone(),
        operator: args.operator.clone(),
        dry_run: args.dry_run,
    };
    workflow::import(&seeded, source, &options)
}

pub fn run_suggest(args: &SuggestArgs) -> Result<MappingProposal> {
    let (seeded, source, tenant) = open_source(&args.source)?;
    workflow::suggest(&seeded, &tenant, &source.manifest.headers)
}

pub fn run_config() -> Result<()> {
    let text = PipelineConfig::default()
        .to_toml()
        .context("failed to render the default configuration")?;
    print!("{text}");
    Ok(())
}

fn open_source(args: &SourceArgs) -> Result<(SeededPipeline, SourceFile, TenantId)> {
    let tenant = TenantId::new(&args.tenant).context("invalid --tenant")?;
    let seed = match &args.seed {
        Some(path) => Seed::load(path)?,
        None => Seed::default(),
    };
    if seed.tenant(&tenant).is_none() {
        debug!(tenant = %tenant, "tenant not in seed, using default rules");
    }
    let seeded = seed.build(args.mapping_dir.as_deref())?;
    let source = read_csv(&args.file, args.delimiter)?;
    Ok((seeded, source, tenant))
}
