//! Flattening of raw declarations into exportable rows.
//!
//! Everything here is pure: the geographic reference is passed in, and rows
//! come out in the same order the declarations went in. A declaration whose
//! date cannot be read is dropped on its own; the rest of the batch survives.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::NormalizeError;
use crate::gazetteer::GeoReference;
use crate::state_fips::state_fips;
use crate::types::{NO_ELIGIBILITY, NormalizedRecord, Program, RawDeclaration, ZipCodes};

/// Rows produced from a batch, plus the declarations that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<NormalizeError>,
}

/// Normalize a batch, skipping (and logging) declarations that fail.
pub fn normalize(raw: &[RawDeclaration], geo: &GeoReference) -> Vec<NormalizedRecord> {
    normalize_report(raw, geo).records
}

/// Normalize a batch, keeping the per-declaration failures.
pub fn normalize_report(raw: &[RawDeclaration], geo: &GeoReference) -> NormalizeReport {
    let mut report = NormalizeReport::default();
    for declaration in raw {
        match normalize_record(declaration, geo) {
            Ok(record) => report.records.push(record),
            Err(err) => {
                tracing::warn!(error = %err, "skipping declaration");
                report.rejected.push(err);
            }
        }
    }
    report
}

pub fn normalize_record(
    raw: &RawDeclaration,
    geo: &GeoReference,
) -> Result<NormalizedRecord, NormalizeError> {
    let declaration_date =
        canonical_date(&raw.declaration_date).ok_or_else(|| NormalizeError::InvalidDate {
            disaster_number: raw.disaster_number,
            value: raw.declaration_date.clone(),
        })?;

    let county = county_name(raw.designated_area_text());
    let zip_codes = resolve_zip_codes(&raw.state, &county, geo);

    Ok(NormalizedRecord {
        disaster_number: raw.disaster_number,
        disaster_name: display_name(raw),
        declaration_date,
        incident_type: raw.incident_type.clone(),
        state: raw.state.clone(),
        county,
        eligibility: eligibility_label(raw),
        individual_assistance: raw.ia_program_declared,
        individuals_and_households: raw.ih_program_declared,
        public_assistance: raw.pa_program_declared,
        hazard_mitigation: raw.hm_program_declared,
        zip_codes,
    })
}

/// Declaration title, or `"{state} {incident} (DR-{number})"` when absent.
pub fn display_name(raw: &RawDeclaration) -> String {
    match raw.declaration_title.as_deref().map(str::trim) {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => format!(
            "{} {} (DR-{})",
            raw.state, raw.incident_type, raw.disaster_number
        ),
    }
}

/// Text before the first `(` of the designated area, trimmed.
pub fn county_name(designated_area: Option<&str>) -> String {
    designated_area
        .and_then(|area| area.split('(').next())
        .map(|county| county.trim().to_string())
        .unwrap_or_default()
}

/// Declared programs in fixed order joined by `", "`, or `"None"`.
pub fn eligibility_label(raw: &RawDeclaration) -> String {
    let programs: Vec<&str> = Program::ALL
        .iter()
        .filter(|p| raw.program_declared(**p))
        .map(|p| p.label())
        .collect();

    if programs.is_empty() {
        NO_ELIGIBILITY.to_string()
    } else {
        programs.join(", ")
    }
}

/// ZIP codes filed under (state FIPS, county). Unknown states and unmatched
/// counties both come back as `Unavailable`.
pub fn resolve_zip_codes(state: &str, county: &str, geo: &GeoReference) -> ZipCodes {
    match state_fips(state) {
        Some(fips) => ZipCodes::from_lookup(geo.lookup(fips, county)),
        None => ZipCodes::Unavailable,
    }
}

/// Reformat a declaration timestamp as `YYYY-MM-DD`.
///
/// Accepts RFC 3339 (the date is taken in the timestamp's own offset), naive
/// date-times with optional fractional seconds, and bare dates.
pub fn canonical_date(value: &str) -> Option<String> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}
