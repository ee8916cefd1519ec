use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use roster_core::RowReport;
use roster_map::{MappingProposal, ProposalSource};
use roster_model::{BatchStatus, CommitLog, CommitOutcome, RowAction, Severity};

use roster_cli::workflow::ImportRun;

pub fn print_import(run: &ImportRun, show_warnings: bool) {
    let batch = &run.batch;
    println!("Batch: {} ({})", batch.id, status_label(batch.status));
    println!("Tenant: {}", batch.tenant);
    println!(
        "File: {} ({} rows, sha256 {})",
        batch.manifest.original_filename,
        batch.manifest.row_count,
        short_checksum(&batch.manifest.checksum_sha256)
    );
    println!(
        "Mapping: {} ({}, {:.0}% confidence)",
        run.proposal.mapping,
        source_label(run.proposal.source),
        run.proposal.confidence * 100.0
    );
    if let Some(saved) = &run.saved_mapping {
        println!("Saved mapping: {saved}");
    }
    if !run.proposal.unmapped_headers.is_empty() {
        println!("Ignored columns: {}", run.proposal.unmapped_headers.join(", "));
    }
    if let Some(reason) = &batch.failure_reason {
        println!("Failure: {reason}");
    }

    print_stage_table(run);
    if !run.errors.is_empty() {
        println!();
        println!("Rows with errors:");
        print_findings(&run.errors);
    }
    if show_warnings && !run.warnings.is_empty() {
        println!();
        println!("Rows with warnings:");
        print_findings(&run.warnings);
    }
    if let Some(log) = &run.commit_log {
        println!();
        print_commit_log(log);
    }
    if let Some(message) = &run.commit_error {
        println!();
        println!("Commit error: {message}");
    }
    println!("Records held by {}: {}", batch.tenant, run.records_total);
}

fn print_stage_table(run: &ImportRun) {
    let counters = &run.batch.counters;
    let validation = &run.staged.validation;
    let mut table = Table::new();
    table.set_header(vec![header_cell("Rows"), header_cell("Count")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![Cell::new("Received"), Cell::new(run.staged.received)]);
    table.add_row(vec![Cell::new("Staged"), Cell::new(counters.total_rows)]);
    table.add_row(vec![
        Cell::new("Duplicates dropped"),
        count_cell(counters.duplicate_rows, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Valid"),
        count_cell(validation.valid, Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("With warnings"),
        count_cell(validation.with_warnings, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Errors"),
        count_cell(validation.error, Color::Red),
    ]);
    println!("{table}");
}

pub fn print_findings(reports: &[RowReport]) {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Row"),
        header_cell("Severity"),
        header_cell("Field"),
        header_cell("Code"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    for report in reports {
        for finding in &report.findings {
            table.add_row(vec![
                Cell::new(report.row_index),
                severity_cell(finding.severity),
                finding
                    .field
                    .as_deref()
                    .map_or_else(|| dim_cell("-"), Cell::new),
                Cell::new(finding.code),
                Cell::new(&finding.message),
            ]);
        }
    }
    println!("{table}");
}

pub fn print_commit_log(log: &CommitLog) {
    println!(
        "Commit: {} ({} chunks, {} ms, strategy {})",
        outcome_label(&log.outcome),
        log.chunks_applied,
        log.duration_ms,
        log.strategy
    );
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Created"),
        header_cell("Updated"),
        header_cell("Skipped"),
        header_cell("Not committed"),
    ]);
    apply_table_style(&mut table);
    for idx in 0..4 {
        align_column(&mut table, idx, CellAlignment::Right);
    }
    table.add_row(vec![
        count_cell(log.counts.created, Color::Green),
        count_cell(log.counts.updated, Color::Blue),
        count_cell(log.counts.skipped, Color::Yellow),
        count_cell(log.counts.error_rows, Color::Red),
    ]);
    println!("{table}");

    if log.sample.is_empty() {
        return;
    }
    let mut sample = Table::new();
    sample.set_header(vec![
        header_cell("Row"),
        header_cell("Action"),
        header_cell("Identifier"),
        header_cell("Record"),
    ]);
    apply_table_style(&mut sample);
    align_column(&mut sample, 0, CellAlignment::Right);
    for line in &log.sample {
        sample.add_row(vec![
            Cell::new(line.row_index),
            action_cell(line.action),
            line.identifier
                .as_deref()
                .map_or_else(|| dim_cell("-"), Cell::new),
            dim_cell(line.record_id),
        ]);
    }
    println!("{sample}");
}

pub fn print_proposal(proposal: &MappingProposal) {
    println!(
        "Mapping: {} ({}, {:.0}% confidence)",
        proposal.mapping,
        source_label(proposal.source),
        proposal.confidence * 100.0
    );
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Field"),
        header_cell("Score"),
        header_cell("Why"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Right);

    if proposal.suggestions.is_empty() {
        for (column, field) in &proposal.mapping.field_mappings {
            table.add_row(vec![
                Cell::new(column),
                Cell::new(field),
                dim_cell("-"),
                dim_cell("stored mapping"),
            ]);
        }
    } else {
        for suggestion in &proposal.suggestions {
            table.add_row(vec![
                Cell::new(&suggestion.header),
                Cell::new(&suggestion.target),
                Cell::new(format!("{:.0}%", suggestion.score.score * 100.0)),
                Cell::new(suggestion.score.explain()),
            ]);
        }
    }
    for header in &proposal.unmapped_headers {
        table.add_row(vec![
            Cell::new(header).fg(Color::DarkGrey),
            dim_cell("-"),
            dim_cell("-"),
            dim_cell("ignored"),
        ]);
    }
    println!("{table}");
}

fn source_label(source: ProposalSource) -> &'static str {
    match source {
        ProposalSource::Selected => "selected",
        ProposalSource::BestExisting => "best stored match",
        ProposalSource::Suggested => "suggested from headers",
    }
}

fn status_label(status: BatchStatus) -> String {
    status.to_string().replace('_', " ")
}

fn outcome_label(outcome: &CommitOutcome) -> String {
    match outcome {
        CommitOutcome::Completed => "completed".to_string(),
        CommitOutcome::Aborted {
            chunk_index,
            row_index: Some(row),
            reason,
        } => format!("aborted at chunk {chunk_index}, row {row}: {reason}"),
        CommitOutcome::Aborted {
            chunk_index,
            row_index: None,
            reason,
        } => format!("aborted at chunk {chunk_index}: {reason}"),
        CommitOutcome::Cancelled { chunk_index } => {
            format!("cancelled before chunk {chunk_index}")
        }
    }
}

fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, idx: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(idx) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count == 0 {
        dim_cell(count)
    } else {
        Cell::new(count).fg(color)
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn action_cell(action: RowAction) -> Cell {
    let color = match action {
        RowAction::Created => Color::Green,
        RowAction::Updated => Color::Blue,
        RowAction::Skipped => Color::DarkGrey,
    };
    Cell::new(action).fg(color)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
