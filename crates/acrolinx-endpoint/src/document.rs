//! Document descriptors

use crate::user::CustomField;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// A document as the platform knows it. `custom_fields` is empty, never
/// absent, when the platform omits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub custom_fields: Vec<CustomField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_info: Option<DisplayInfo>,
}

/// Document part of a check request. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptorRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_info: Option<DisplayInfo>,
}

impl DocumentDescriptorRequest {
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            ..Self::default()
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<CustomField>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<CustomField>>::deserialize(deserializer)?.unwrap_or_default())
}
