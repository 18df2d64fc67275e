//! Adding words to a dictionary

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DictionaryScope {
    Language,
    GuidanceProfile,
    Document,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryCapabilities {
    pub scopes: Vec<DictionaryScope>,
}

/// Body of `POST /api/v1/dictionary/submit`. The scope decides which ids are required.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum AddToDictionaryRequest {
    #[serde(rename_all = "camelCase")]
    Language { surface: String, language_id: String },
    #[serde(rename_all = "camelCase")]
    GuidanceProfile {
        surface: String,
        guidance_profile_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        language_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Document {
        surface: String,
        language_id: String,
        document_id: String,
    },
}

impl AddToDictionaryRequest {
    pub fn scope(&self) -> DictionaryScope {
        match self {
            Self::Language { .. } => DictionaryScope::Language,
            Self::GuidanceProfile { .. } => DictionaryScope::GuidanceProfile,
            Self::Document { .. } => DictionaryScope::Document,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToDictionaryResponse {
    pub surface: String,
    pub scope: DictionaryScope,
    #[serde(default)]
    pub language_id: String,
    #[serde(default)]
    pub guidance_profile_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}
