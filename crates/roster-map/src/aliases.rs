//! Built-in header alias dictionary.
//!
//! Tenants export from many school-management tools, mostly in French or
//! English. These aliases seed suggestion when a tenant has no mapping yet;
//! tenant mapping aliases are merged on top.

use std::collections::BTreeMap;

use roster_model::fields;

use crate::fold::fold_header;

const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    (
        fields::EMAIL,
        &["email", "e-mail", "mail", "courriel", "adresse email", "adresse mail"],
    ),
    (
        fields::PHONE,
        &[
            "phone",
            "telephone",
            "tel",
            "mobile",
            "portable",
            "numero de telephone",
            "contact",
        ],
    ),
    (
        fields::MATRICULE,
        &[
            "matricule",
            "numero matricule",
            "n° matricule",
            "student id",
            "id eleve",
            "identifiant",
        ],
    ),
    (fields::FULL_NAME, &["nom complet", "full name", "noms et prenoms", "nom et prenom"]),
    (fields::FIRST_NAME, &["prenom", "prenoms", "first name", "given name"]),
    (fields::LAST_NAME, &["nom", "last name", "surname", "nom de famille"]),
    (
        fields::DATE_OF_BIRTH,
        &["date de naissance", "date of birth", "dob", "ne le", "naissance", "birth date"],
    ),
    (fields::SCHOOL_YEAR, &["annee scolaire", "school year", "annee"]),
    (fields::LEVEL, &["niveau", "classe", "level", "grade"]),
    (fields::DEPARTMENT, &["filiere", "departement", "serie", "department", "section"]),
    (
        fields::PARENT_NAME_1,
        &["nom parent 1", "parent 1", "nom du pere", "pere", "tuteur", "parent name"],
    ),
    (
        fields::PARENT_PHONE_1,
        &["telephone parent 1", "tel parent 1", "tel pere", "telephone tuteur", "parent phone"],
    ),
    (fields::PARENT_NAME_2, &["nom parent 2", "parent 2", "nom de la mere", "mere"]),
    (
        fields::PARENT_PHONE_2,
        &["telephone parent 2", "tel parent 2", "tel mere"],
    ),
    (fields::ADDRESS, &["adresse", "address", "quartier", "domicile"]),
];

/// Canonical field -> folded aliases, including the field name itself.
pub fn default_aliases() -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    for (field, aliases) in DEFAULT_ALIASES {
        let mut folded: Vec<String> = std::iter::once(*field)
            .chain(aliases.iter().copied())
            .map(fold_header)
            .collect();
        folded.sort();
        folded.dedup();
        out.insert((*field).to_string(), folded);
    }
    out
}

/// Adds `extra` aliases to `base`, folding them.
pub fn merge_aliases(
    base: &mut BTreeMap<String, Vec<String>>,
    extra: &BTreeMap<String, Vec<String>>,
) {
    for (field, aliases) in extra {
        let entry = base.entry(field.clone()).or_default();
        entry.extend(aliases.iter().map(|a| fold_header(a)));
        entry.sort();
        entry.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_every_canonical_field() {
        let aliases = default_aliases();
        for field in fields::ALL {
            assert!(aliases.contains_key(*field), "missing aliases for {field}");
        }
        assert!(aliases[fields::EMAIL].contains(&"e mail".to_string()));
        assert!(aliases[fields::DATE_OF_BIRTH].contains(&"date of birth".to_string()));
    }

    #[test]
    fn test_merge_folds_tenant_aliases() {
        let mut aliases = default_aliases();
        let mut extra = BTreeMap::new();
        extra.insert(fields::EMAIL.to_string(), vec!["Adresse Électronique".to_string()]);
        merge_aliases(&mut aliases, &extra);
        assert!(aliases[fields::EMAIL].contains(&"adresse electronique".to_string()));
    }
}
