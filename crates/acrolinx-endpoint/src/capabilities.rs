//! What the platform supports: guidance profiles, formats, report types

use crate::user::CustomField;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuidanceProfileStatus {
    Ready,
    Loading,
    Unavailable,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Language {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Goal {
    pub id: String,
    pub display_name: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TermSet {
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceProfile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub term_sets: Vec<TermSet>,
    pub status: GuidanceProfileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentFormat {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Batch,
    Interactive,
    Baseline,
    Automated,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    #[default]
    None,
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportType {
    TermHarvesting,
    Scorecard,
    ExtractedText,
    #[serde(other)]
    Unknown,
}

impl ReportType {
    /// Key of this report in `CheckResult::reports`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::TermHarvesting => "termHarvesting",
            Self::Scorecard => "scorecard",
            Self::ExtractedText => "extractedText",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckingCapabilities {
    pub guidance_profiles: Vec<GuidanceProfile>,
    pub content_formats: Vec<ContentFormat>,
    pub content_encodings: Vec<ContentEncoding>,
    pub check_types: Vec<CheckType>,
    pub report_types: Vec<ReportType>,
    pub reference_pattern: String,
}

impl CheckingCapabilities {
    pub fn guidance_profile(&self, id: &str) -> Option<&GuidanceProfile> {
        self.guidance_profiles.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentCapabilities {
    pub custom_fields: Vec<CustomField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformCapabilities {
    pub checking: CheckingCapabilities,
    pub document: DocumentCapabilities,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInformation {
    pub version: String,
    pub name: String,
}

/// Answer of `GET /api/v1/`, available without signing in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformInformation {
    pub server: ServerInformation,
    pub locales: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformFeatures {
    /// Server runs in Targets mode.
    pub enable_target_service: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct PlatformFeaturesResponse {
    pub(crate) features: PlatformFeatures,
}
