//! Stateless selection over normalized rows.
//!
//! The presentation layer owns the selection state (region, declaration,
//! sub-filters) and calls these with it; nothing here holds on to anything.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::NormalizedRecord;

/// Region codes present, sorted and distinct.
pub fn regions(records: &[NormalizedRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.state.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Display names of declarations in `region`, sorted and distinct.
pub fn declarations_in(records: &[NormalizedRecord], region: &str) -> Vec<String> {
    records
        .iter()
        .filter(|r| r.state == region)
        .map(|r| r.disaster_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Rows of one declaration in one region, in input order.
pub fn select(records: &[NormalizedRecord], region: &str, name: &str) -> Vec<NormalizedRecord> {
    records
        .iter()
        .filter(|r| r.state == region && r.disaster_name == name)
        .cloned()
        .collect()
}

/// Distinct counties in first-appearance order.
pub fn counties(records: &[NormalizedRecord]) -> Vec<String> {
    distinct_in_order(records.iter().map(|r| r.county.as_str()))
}

/// Distinct eligibility labels in first-appearance order.
pub fn eligibilities(records: &[NormalizedRecord]) -> Vec<String> {
    distinct_in_order(records.iter().map(|r| r.eligibility.as_str()))
}

fn distinct_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

/// Optional inclusion filters. A missing or empty set lets everything through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub counties: Option<BTreeSet<String>>,
    #[serde(default)]
    pub eligibilities: Option<BTreeSet<String>>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counties<I, S>(mut self, counties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.counties = Some(counties.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_eligibilities<I, S>(mut self, eligibilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eligibilities = Some(eligibilities.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, record: &NormalizedRecord) -> bool {
        passes(&self.counties, &record.county) && passes(&self.eligibilities, &record.eligibility)
    }
}

fn passes(allowed: &Option<BTreeSet<String>>, value: &str) -> bool {
    match allowed {
        Some(set) if !set.is_empty() => set.contains(value),
        _ => true,
    }
}

/// Rows matching `filter`, in input order.
pub fn filter(records: &[NormalizedRecord], filter: &RecordFilter) -> Vec<NormalizedRecord> {
    records.iter().filter(|r| filter.matches(r)).cloned().collect()
}

/// Header facts for a selected declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationSummary {
    pub disaster_name: String,
    pub disaster_number: u64,
    pub declaration_date: String,
    pub incident_type: String,
    pub state: String,
    pub affected_areas: usize,
}

/// Summary taken from the first row; `None` for an empty selection.
pub fn summarize(records: &[NormalizedRecord]) -> Option<DeclarationSummary> {
    let first = records.first()?;
    Some(DeclarationSummary {
        disaster_name: first.disaster_name.clone(),
        disaster_number: first.disaster_number,
        declaration_date: first.declaration_date.clone(),
        incident_type: first.incident_type.clone(),
        state: first.state.clone(),
        affected_areas: records.len(),
    })
}
