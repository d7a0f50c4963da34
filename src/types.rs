use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Sentinel exported when a county could not be resolved to any ZIP code.
pub const ZIP_UNAVAILABLE: &str = "Not available";

/// Eligibility label used when no program flag is set.
pub const NO_ELIGIBILITY: &str = "None";

/// Assistance programs a declaration can authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    IndividualAssistance,
    IndividualsAndHouseholds,
    PublicAssistance,
    HazardMitigation,
}

impl Program {
    /// Fixed order used when building eligibility labels.
    pub const ALL: [Program; 4] = [
        Program::IndividualAssistance,
        Program::IndividualsAndHouseholds,
        Program::PublicAssistance,
        Program::HazardMitigation,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::IndividualAssistance => "Individual Assistance",
            Self::IndividualsAndHouseholds => "Individual and Households Program",
            Self::PublicAssistance => "Public Assistance",
            Self::HazardMitigation => "Hazard Mitigation",
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Response envelope from the OpenFEMA declarations endpoint
#[derive(Debug, Deserialize)]
pub struct DeclarationsResponse {
    #[serde(rename = "DisasterDeclarationsSummaries", default)]
    pub declarations: Vec<RawDeclaration>,
}

/// One declaration summary as published by OpenFEMA.
///
/// Only the fields the pipeline reads are declared; everything else in the
/// payload is ignored. A record missing one of the required fields fails
/// deserialization of the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeclaration {
    pub disaster_number: u64,
    pub declaration_date: String,
    pub incident_type: String,
    pub state: String,
    /// Usually `"<county> (<descriptor>)"`, but not guaranteed to be text.
    #[serde(default)]
    pub designated_area: Option<serde_json::Value>,
    #[serde(default)]
    pub declaration_title: Option<String>,
    #[serde(default)]
    pub ia_program_declared: bool,
    #[serde(default)]
    pub ih_program_declared: bool,
    #[serde(default)]
    pub pa_program_declared: bool,
    #[serde(default)]
    pub hm_program_declared: bool,
}

impl RawDeclaration {
    pub fn program_declared(&self, program: Program) -> bool {
        match program {
            Program::IndividualAssistance => self.ia_program_declared,
            Program::IndividualsAndHouseholds => self.ih_program_declared,
            Program::PublicAssistance => self.pa_program_declared,
            Program::HazardMitigation => self.hm_program_declared,
        }
    }

    /// Designated area text, if the source sent a string.
    pub fn designated_area_text(&self) -> Option<&str> {
        self.designated_area.as_ref().and_then(|v| v.as_str())
    }
}

/// ZIP codes resolved for a county, or the explicit miss marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipCodes {
    Resolved(Vec<String>),
    Unavailable,
}

impl ZipCodes {
    pub fn from_lookup(zips: &[String]) -> Self {
        if zips.is_empty() {
            Self::Unavailable
        } else {
            Self::Resolved(zips.to_vec())
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Parse the exported text form back.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() || text == ZIP_UNAVAILABLE {
            return Self::Unavailable;
        }
        Self::Resolved(text.split(',').map(|z| z.trim().to_string()).collect())
    }
}

impl fmt::Display for ZipCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(zips) => write!(f, "{}", zips.join(", ")),
            Self::Unavailable => f.write_str(ZIP_UNAVAILABLE),
        }
    }
}

impl Serialize for ZipCodes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ZipCodes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}

/// Flattened declaration row, one per affected area.
///
/// Field names serialize to the column headers of the tabular output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    #[serde(rename = "Disaster Number")]
    pub disaster_number: u64,
    #[serde(rename = "Disaster Name")]
    pub disaster_name: String,
    #[serde(rename = "Declaration Date")]
    pub declaration_date: String,
    #[serde(rename = "Incident Type")]
    pub incident_type: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "County")]
    pub county: String,
    #[serde(rename = "Eligibility")]
    pub eligibility: String,
    #[serde(rename = "Individual Assistance", with = "yes_no")]
    pub individual_assistance: bool,
    #[serde(rename = "Individual and Households Program", with = "yes_no")]
    pub individuals_and_households: bool,
    #[serde(rename = "Public Assistance", with = "yes_no")]
    pub public_assistance: bool,
    #[serde(rename = "Hazard Mitigation", with = "yes_no")]
    pub hazard_mitigation: bool,
    #[serde(rename = "Zip Codes")]
    pub zip_codes: ZipCodes,
}

/// Column headers in output order
pub const COLUMNS: [&str; 12] = [
    "Disaster Number",
    "Disaster Name",
    "Declaration Date",
    "Incident Type",
    "State",
    "County",
    "Eligibility",
    "Individual Assistance",
    "Individual and Households Program",
    "Public Assistance",
    "Hazard Mitigation",
    "Zip Codes",
];

/// Program flags travel as `Yes`/`No` text in every tabular output.
mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "Yes" } else { "No" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.as_str() {
            "Yes" => Ok(true),
            "No" => Ok(false),
            other => Err(D::Error::custom(format!("expected Yes or No, got {other:?}"))),
        }
    }
}
