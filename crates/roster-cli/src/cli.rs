//! CLI argument definitions for the roster importer.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

use roster_model::DedupStrategy;

#[derive(Parser)]
#[command(
    name = "roster",
    version,
    about = "Import school rosters into tenant records",
    long_about = "Import student rosters exported from another system.\n\n\
                  Each import maps the file's columns, normalizes and validates\n\
                  every row, then commits the valid rows in chunks under a\n\
                  per-school lock."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for humans, json for machines).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Include row values (emails, phones) in trace logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Map, validate and commit a roster file for one school.
    Import(ImportArgs),

    /// Show the column mapping that would be proposed for a file.
    Suggest(SuggestArgs),

    /// Print the default pipeline configuration as TOML.
    Config,
}

/// Inputs shared by commands that read an upload.
#[derive(Parser)]
pub struct SourceArgs {
    /// Roster export to read (CSV).
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Seed file with pipeline settings and tenant fixtures.
    #[arg(long = "seed", value_name = "TOML")]
    pub seed: Option<PathBuf>,

    /// School (tenant) the file belongs to.
    #[arg(long = "tenant")]
    pub tenant: String,

    /// Column delimiter; detected from the header line when omitted.
    #[arg(long = "delimiter", value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,

    /// Directory holding saved mappings as JSON files.
    #[arg(long = "mapping-dir", value_name = "DIR")]
    pub mapping_dir: Option<PathBuf>,
}

#[derive(Parser)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// School year of the roster, e.g. 2024-2025.
    #[arg(long = "school-year")]
    pub school_year: String,

    /// What to do when a row matches an existing record.
    #[arg(long = "strategy", value_enum, default_value = "merge")]
    pub strategy: StrategyArg,

    /// Use this saved mapping instead of the automatic proposal.
    #[arg(long = "mapping", value_name = "NAME")]
    pub mapping: Option<String>,

    /// Version of `--mapping`; the latest when omitted.
    #[arg(long = "mapping-version", requires = "mapping")]
    pub mapping_version: Option<u32>,

    /// Store a suggested mapping under this name for later imports.
    #[arg(long = "save-mapping", value_name = "NAME", conflicts_with = "mapping")]
    pub save_mapping: Option<String>,

    /// Operator recorded on the batch.
    #[arg(long = "operator", default_value = "cli")]
    pub operator: String,

    /// Validate and report without committing.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// List rows that passed with warnings.
    #[arg(long = "show-warnings")]
    pub show_warnings: bool,
}

#[derive(Parser)]
pub struct SuggestArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    /// Fill missing person fields and refresh the student profile.
    Merge,
    /// Leave matched records untouched.
    Skip,
    /// Abort the commit on the first match.
    Fail,
}

impl From<StrategyArg> for DedupStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Merge => DedupStrategy::Merge,
            StrategyArg::Skip => DedupStrategy::Skip,
            StrategyArg::Fail => DedupStrategy::Fail,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" => Ok(b'\t'),
        _ => match value.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(format!("delimiter must be one ASCII character, got '{value}'")),
        },
    }
}
