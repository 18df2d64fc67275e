//! Text extraction for add-on apps (`/api/v1/apps/analyses`)

use crate::check::{CheckOptions, Report};
use crate::document::DocumentDescriptorRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisType {
    ExtractedText,
    Offsets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequestOptions {
    #[serde(flatten)]
    pub check_options: CheckOptions,
    pub analysis_types: Vec<AnalysisType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<AnalysisRequestOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentDescriptorRequest>,
    /// Also sent as the `X-Acrolinx-App` header.
    pub app_signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractionOptions {
    pub content_format: String,
    pub language_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub options: ExtractionOptions,
    pub extracted: Report,
    #[serde(default)]
    pub offsets: Option<Report>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub begin: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedOffsetRange {
    pub original: OffsetRange,
    pub extracted: OffsetRange,
    #[serde(default)]
    pub changed: Option<bool>,
}

/// Mapping between original and extracted text, served at `offsets.link`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetReport {
    pub ranges: Vec<MappedOffsetRange>,
}
