//! Canonical person + student profile records.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::{self, Identifier, present};
use crate::ids::{BatchId, RecordId, ReferenceId, RowHash, TenantId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentContact {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub matricule: Option<String>,
    pub school_year: Option<String>,
    pub level_id: Option<ReferenceId>,
    pub department_id: Option<ReferenceId>,
    pub parents: Vec<ParentContact>,
    pub address: Option<String>,
}

/// Field values extracted from a valid staged row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub person: Person,
    pub profile: StudentProfile,
}

impl RecordDraft {
    /// Builds a draft from canonical fields. Reference codes must already be
    /// resolved by the caller.
    pub fn from_normalized(
        normalized: &BTreeMap<String, String>,
        level_id: Option<ReferenceId>,
        department_id: Option<ReferenceId>,
    ) -> Self {
        let owned = |field: &str| present(normalized, field).map(str::to_string);
        let full_name = owned(fields::FULL_NAME).or_else(|| {
            let parts: Vec<&str> = [fields::FIRST_NAME, fields::LAST_NAME]
                .iter()
                .filter_map(|f| present(normalized, f))
                .collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        });
        let parents = [
            (fields::PARENT_NAME_1, fields::PARENT_PHONE_1),
            (fields::PARENT_NAME_2, fields::PARENT_PHONE_2),
        ]
        .iter()
        .map(|&(name, phone)| ParentContact {
            name: owned(name),
            phone: owned(phone),
        })
        .filter(|p| p.name.is_some() || p.phone.is_some())
        .collect();

        Self {
            person: Person {
                email: owned(fields::EMAIL).map(|e| e.to_lowercase()),
                phone: owned(fields::PHONE),
                full_name,
                date_of_birth: present(normalized, fields::DATE_OF_BIRTH)
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()),
            },
            profile: StudentProfile {
                matricule: owned(fields::MATRICULE),
                school_year: owned(fields::SCHOOL_YEAR),
                level_id,
                department_id,
                parents,
                address: owned(fields::ADDRESS),
            },
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        identifiers_of(&self.person, &self.profile)
    }
}

/// Where a record was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    pub batch_id: BatchId,
    pub row_hash: RowHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub id: RecordId,
    pub tenant: TenantId,
    pub person: Person,
    pub profile: StudentProfile,
    /// Set when the record was created by an import.
    pub provenance: Option<Provenance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalRecord {
    pub fn new(tenant: TenantId, draft: RecordDraft, provenance: Option<Provenance>) -> Self {
        let now = Utc::now();
        Self {
            id: RecordId::new(),
            tenant,
            person: draft.person,
            profile: draft.profile,
            provenance,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identifiers(&self) -> Vec<Identifier> {
        identifiers_of(&self.person, &self.profile)
    }

    /// Applies a row under the `merge` strategy.
    ///
    /// Profile fields present in the row overwrite the stored ones; person
    /// fields are only filled where the record has none.
    pub fn merge(&mut self, draft: &RecordDraft) {
        fill(&mut self.person.email, &draft.person.email);
        fill(&mut self.person.phone, &draft.person.phone);
        fill(&mut self.person.full_name, &draft.person.full_name);
        if self.person.date_of_birth.is_none() {
            self.person.date_of_birth = draft.person.date_of_birth;
        }

        let profile = &mut self.profile;
        overwrite(&mut profile.matricule, &draft.profile.matricule);
        overwrite(&mut profile.school_year, &draft.profile.school_year);
        overwrite(&mut profile.level_id, &draft.profile.level_id);
        overwrite(&mut profile.department_id, &draft.profile.department_id);
        overwrite(&mut profile.address, &draft.profile.address);
        if !draft.profile.parents.is_empty() {
            profile.parents = draft.profile.parents.clone();
        }
        self.updated_at = Utc::now();
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

fn overwrite<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        slot.clone_from(value);
    }
}

fn identifiers_of(person: &Person, profile: &StudentProfile) -> Vec<Identifier> {
    let mut out = Vec::with_capacity(3);
    if let Some(email) = &person.email {
        out.push(Identifier::Email(email.to_lowercase()));
    }
    if let Some(phone) = &person.phone {
        out.push(Identifier::Phone(phone.clone()));
    }
    if let Some(matricule) = &profile.matricule {
        out.push(Identifier::Matricule(matricule.clone()));
    }
    out
}
