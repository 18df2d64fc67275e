//! Platform-wide broadcast messages

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerNotificationImportance {
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerNotification {
    pub id: String,
    pub title: String,
    pub body: String,
    pub importance: ServerNotificationImportance,
    /// Epoch milliseconds
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerNotificationResponseData {
    pub request_time_in_milliseconds: u64,
    pub platform_notifications: Vec<ServerNotification>,
}

/// A broadcast to publish. `start` and `end` are epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNotificationPost {
    pub title: String,
    pub body: String,
    pub start: u64,
    pub end: u64,
}
