//! CSV export of normalized rows.

use crate::error::ExportError;
use crate::types::NormalizedRecord;

/// Serialize rows with a header row. Every field is written as text.
pub fn to_csv(records: &[NormalizedRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(Vec::new());

    if records.is_empty() {
        writer.write_record(crate::types::COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))
}

/// Read an export back.
pub fn from_csv(bytes: &[u8]) -> Result<Vec<NormalizedRecord>, ExportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    reader
        .deserialize::<NormalizedRecord>()
        .map(|row| row.map_err(ExportError::from))
        .collect()
}

/// Download name for a declaration's export: spaces become underscores.
pub fn export_file_name(disaster_name: &str) -> String {
    format!("{}_data.csv", disaster_name.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{COLUMNS, ZipCodes};

    fn records() -> Vec<NormalizedRecord> {
        vec![
            NormalizedRecord {
                disaster_number: 4999,
                disaster_name: "CA Flood (DR-4999)".to_string(),
                declaration_date: "2024-01-15".to_string(),
                incident_type: "Flood".to_string(),
                state: "CA".to_string(),
                county: "Los Angeles".to_string(),
                eligibility: "Individual Assistance, Public Assistance".to_string(),
                individual_assistance: true,
                individuals_and_households: false,
                public_assistance: true,
                hazard_mitigation: false,
                zip_codes: ZipCodes::Resolved(vec!["00601".to_string(), "90001".to_string()]),
            },
            NormalizedRecord {
                disaster_number: 5001,
                disaster_name: "Quote \"Storm\", Part 2".to_string(),
                declaration_date: "2024-01-10".to_string(),
                incident_type: "Severe Storm".to_string(),
                state: "TX".to_string(),
                county: String::new(),
                eligibility: "None".to_string(),
                individual_assistance: false,
                individuals_and_households: false,
                public_assistance: false,
                hazard_mitigation: false,
                zip_codes: ZipCodes::Unavailable,
            },
        ]
    }

    #[test]
    fn test_header_row() {
        let bytes = to_csv(&records()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, COLUMNS.join(","));
    }

    #[test]
    fn test_flags_and_sentinel_as_text() {
        let text = String::from_utf8(to_csv(&records()).unwrap()).unwrap();
        assert!(text.contains("Yes,No,Yes,No,\"00601, 90001\""));
        assert!(text.contains("No,No,No,No,Not available"));
    }

    #[test]
    fn test_round_trip() {
        let original = records();
        let restored = from_csv(&to_csv(&original).unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn test_empty_export_still_has_header() {
        let bytes = to_csv(&[]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.trim_end(), COLUMNS.join(","));
        assert!(from_csv(text.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(
            export_file_name("CA Flood (DR-4999)"),
            "CA_Flood_(DR-4999)_data.csv"
        );
    }
}
