//! Date of birth and school year checks.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use roster_model::{
    ErrorCode, ErrorDescriptor, fields, fields::present, validate_school_year,
};

pub fn check_date_of_birth(
    normalized: &BTreeMap<String, String>,
    today: NaiveDate,
    min_age_years: Option<u32>,
) -> Vec<ErrorDescriptor> {
    let Some(value) = present(normalized, fields::DATE_OF_BIRTH) else {
        return Vec::new();
    };
    let invalid = |message: String| {
        vec![ErrorDescriptor::error(
            Some(fields::DATE_OF_BIRTH),
            ErrorCode::InvalidDateOfBirth,
            message,
        )]
    };

    let Ok(dob) = NaiveDate::parse_from_str(value, "%Y-%m-%d") else {
        return invalid(format!("'{value}' is not a date in YYYY-MM-DD form"));
    };
    if dob > today {
        return invalid("Date of birth is in the future".to_string());
    }
    if let Some(min) = min_age_years
        && age_on(dob, today) < min
    {
        return invalid(format!("Student must be at least {min} years old"));
    }
    Vec::new()
}

/// Whole years between `dob` and `today`.
fn age_on(dob: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Rows without a school year inherit the batch's, checked at batch
/// creation.
pub fn check_school_year(normalized: &BTreeMap<String, String>) -> Vec<ErrorDescriptor> {
    let Some(value) = present(normalized, fields::SCHOOL_YEAR) else {
        return Vec::new();
    };
    match validate_school_year(value) {
        Ok(_) => Vec::new(),
        Err(error) => vec![ErrorDescriptor::error(
            Some(fields::SCHOOL_YEAR),
            ErrorCode::InvalidSchoolYear,
            error.to_string(),
        )],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(field: &str, value: &str) -> BTreeMap<String, String> {
        BTreeMap::from([(field.to_string(), value.to_string())])
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
    }

    #[test]
    fn test_future_birth_date() {
        let issues = check_date_of_birth(&row("date_of_birth", "2026-01-01"), today(), None);
        assert_eq!(issues[0].code, ErrorCode::InvalidDateOfBirth);
        assert!(check_date_of_birth(&row("date_of_birth", "2025-09-01"), today(), None).is_empty());
    }

    #[test]
    fn test_unparseable_birth_date() {
        let issues = check_date_of_birth(&row("date_of_birth", "14/03/2010"), today(), None);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_minimum_age() {
        let dob = row("date_of_birth", "2022-09-02");
        assert_eq!(check_date_of_birth(&dob, today(), Some(3)).len(), 1);
        let dob = row("date_of_birth", "2022-09-01");
        assert!(check_date_of_birth(&dob, today(), Some(3)).is_empty());
    }

    #[test]
    fn test_school_year_must_be_consecutive() {
        let issues = check_school_year(&row("school_year", "2024-2026"));
        assert_eq!(issues[0].code, ErrorCode::InvalidSchoolYear);
        assert!(check_school_year(&row("school_year", "2024-2025")).is_empty());
        assert!(check_school_year(&BTreeMap::new()).is_empty());
    }
}
