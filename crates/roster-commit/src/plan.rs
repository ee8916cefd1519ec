//! Chunk planning: turns prepared rows into one bulk write.
//!
//! Rows are planned sequentially in row order so that two rows of the same
//! chunk resolving to the same person end up in a single write.

use std::collections::HashMap;

use roster_model::{
    CanonicalRecord, DedupStrategy, Identifier, Provenance, RecordDraft, RecordId, RowAction,
    TenantId,
};
use roster_store::RecordWrite;

/// A valid staged row with everything the plan needs already fetched.
#[derive(Debug, Clone)]
pub(crate) struct PreparedRow {
    pub row_index: u32,
    pub provenance: Provenance,
    pub draft: RecordDraft,
    /// Record already created from this very row by an earlier run.
    pub replay: Option<RecordId>,
    /// Existing records per identifier, in priority order.
    pub matches: Vec<(Identifier, CanonicalRecord)>,
}

impl PreparedRow {
    /// Identifier shown in the audit sample.
    pub fn primary_identifier(&self) -> Option<Identifier> {
        self.draft.identifiers().into_iter().next()
    }
}

/// Record a planned row refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    /// Resolved from the outcome of the write at this position.
    Write(usize),
    Record(RecordId),
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedRow {
    pub row_index: u32,
    pub action: RowAction,
    pub target: Target,
    pub identifier: Option<Identifier>,
}

#[derive(Debug)]
pub(crate) enum ChunkPlan {
    Ready {
        writes: Vec<RecordWrite>,
        rows: Vec<PlannedRow>,
    },
    /// A row matched an existing record under the `fail` strategy.
    Conflict { row_index: u32, reason: String },
}

#[derive(Clone, Copy)]
enum Found {
    Pending(usize),
    Stored(usize),
}

pub(crate) fn plan_chunk(
    tenant: &TenantId,
    strategy: DedupStrategy,
    rows: &[PreparedRow],
) -> ChunkPlan {
    let mut writes: Vec<RecordWrite> = Vec::new();
    let mut planned = Vec::with_capacity(rows.len());
    // Identifier -> write carrying it, for rows later in the chunk.
    let mut pending: HashMap<Identifier, usize> = HashMap::new();
    let mut updates: HashMap<RecordId, usize> = HashMap::new();

    for row in rows {
        let identifier = row.primary_identifier();
        if let Some(id) = row.replay {
            planned.push(PlannedRow {
                row_index: row.row_index,
                action: RowAction::Skipped,
                target: Target::Record(id),
                identifier,
            });
            continue;
        }

        let found = row.draft.identifiers().iter().find_map(|id| {
            pending.get(id).map(|&w| Found::Pending(w)).or_else(|| {
                row.matches
                    .iter()
                    .position(|(matched, _)| matched == id)
                    .map(Found::Stored)
            })
        });

        let Some(found) = found else {
            let write = writes.len();
            for id in row.draft.identifiers() {
                pending.entry(id).or_insert(write);
            }
            writes.push(RecordWrite::Create {
                draft: row.draft.clone(),
                provenance: row.provenance,
            });
            planned.push(PlannedRow {
                row_index: row.row_index,
                action: RowAction::Created,
                target: Target::Write(write),
                identifier,
            });
            continue;
        };

        match strategy {
            DedupStrategy::Fail => {
                let matched = identifier
                    .as_ref()
                    .map_or_else(|| "identifier".to_string(), ToString::to_string);
                return ChunkPlan::Conflict {
                    row_index: row.row_index,
                    reason: format!(
                        "row {} matches an existing record ({matched})",
                        row.row_index
                    ),
                };
            }
            DedupStrategy::Skip => {
                let target = match found {
                    Found::Pending(write) => Target::Write(write),
                    Found::Stored(position) => Target::Record(row.matches[position].1.id),
                };
                planned.push(PlannedRow {
                    row_index: row.row_index,
                    action: RowAction::Skipped,
                    target,
                    identifier,
                });
            }
            DedupStrategy::Merge => {
                let write = match found {
                    Found::Pending(write) => write,
                    Found::Stored(position) => {
                        let record = &row.matches[position].1;
                        *updates.entry(record.id).or_insert_with(|| {
                            writes.push(RecordWrite::Update {
                                record: record.clone(),
                            });
                            writes.len() - 1
                        })
                    }
                };
                let owner = match &writes[write] {
                    RecordWrite::Update { record } => Some(record.id),
                    RecordWrite::Create { .. } => None,
                };
                let draft = without_pending_claims(
                    without_foreign_identifiers(&row.draft, &row.matches, owner),
                    &pending,
                    write,
                );
                merge_into(tenant, &mut writes[write], &draft);
                for id in draft.identifiers() {
                    pending.entry(id).or_insert(write);
                }
                planned.push(PlannedRow {
                    row_index: row.row_index,
                    action: RowAction::Updated,
                    target: Target::Write(write),
                    identifier,
                });
            }
        }
    }

    ChunkPlan::Ready {
        writes,
        rows: planned,
    }
}

/// Drops identifiers that already belong to a record other than `owner`,
/// so a merge never steals another record's email or phone.
fn without_foreign_identifiers(
    draft: &RecordDraft,
    matches: &[(Identifier, CanonicalRecord)],
    owner: Option<RecordId>,
) -> RecordDraft {
    let mut draft = draft.clone();
    for (identifier, record) in matches {
        if Some(record.id) != owner {
            clear_identifier(&mut draft, identifier);
        }
    }
    draft
}

/// Drops identifiers that an earlier write of the chunk, other than
/// `write`, already carries.
fn without_pending_claims(
    mut draft: RecordDraft,
    pending: &HashMap<Identifier, usize>,
    write: usize,
) -> RecordDraft {
    for identifier in draft.identifiers() {
        if pending.get(&identifier).is_some_and(|&claimed| claimed != write) {
            clear_identifier(&mut draft, &identifier);
        }
    }
    draft
}

fn clear_identifier(draft: &mut RecordDraft, identifier: &Identifier) {
    match identifier {
        Identifier::Email(_) => draft.person.email = None,
        Identifier::Phone(_) => draft.person.phone = None,
        Identifier::Matricule(_) => draft.profile.matricule = None,
    }
}

fn merge_into(tenant: &TenantId, write: &mut RecordWrite, draft: &RecordDraft) {
    match write {
        RecordWrite::Update { record } => record.merge(draft),
        RecordWrite::Create { draft: pending, .. } => {
            let mut staged = CanonicalRecord::new(tenant.clone(), pending.clone(), None);
            staged.merge(draft);
            pending.person = staged.person;
            pending.profile = staged.profile;
        }
    }
}
