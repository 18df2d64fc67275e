//! User metadata and custom fields

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldType {
    List,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldInputType {
    Required,
    ExternallyProvided,
    Optional,
}

/// A field the platform asks users or documents to fill in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomField {
    #[serde(default)]
    pub display_name: String,
    pub key: String,
    pub input_type: CustomFieldInputType,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Only for `list` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_values: Option<Vec<String>>,
}

impl CustomField {
    /// Required and still empty.
    pub fn is_missing(&self) -> bool {
        self.input_type == CustomFieldInputType::Required
            && self.value.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
}

impl KeyValuePair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub sign_in: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomField>,
}

/// Body of `PUT /api/v1/user/{id}` and `PUT /api/v1/document/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CustomFieldsUpdate<'a> {
    pub(crate) id: &'a str,
    pub(crate) custom_fields: &'a [KeyValuePair],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_with_custom_fields() {
        let user: User = serde_json::from_value(json!({
            "id": "dummyUserId",
            "signIn": "dummy@username.org",
            "fullName": "Dummy User",
            "tenantId": "acme",
            "properties": {"role": "writer"},
            "customFields": [
                {"displayName": "Department", "key": "dept", "inputType": "required", "type": "list", "possibleValues": ["R&D", "Docs"]},
                {"displayName": "Team", "key": "team", "inputType": "externally_provided", "type": "text", "value": "core"}
            ]
        }))
        .unwrap();

        assert_eq!(user.custom_fields[0].field_type, CustomFieldType::List);
        assert!(user.custom_fields[0].is_missing());
        assert_eq!(user.custom_fields[1].input_type, CustomFieldInputType::ExternallyProvided);
        assert!(!user.custom_fields[1].is_missing());
    }

    #[test]
    fn update_body_shape() {
        let fields = [KeyValuePair::new("dept", "Docs")];
        let body = serde_json::to_value(CustomFieldsUpdate {
            id: "doc-1",
            custom_fields: &fields,
        })
        .unwrap();
        assert_eq!(body, json!({"id": "doc-1", "customFields": [{"key": "dept", "value": "Docs"}]}));
    }
}
