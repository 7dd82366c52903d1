use serde::Serialize;

use crate::types::HealthState;

/// Attachment color for additions and passing checks
pub const COLOR_GOOD: &str = "#36a64f";

/// Attachment color for removals and critical checks
pub const COLOR_DANGER: &str = "#cc0000";

/// Attachment color for warning checks
pub const COLOR_WARNING: &str = "#daa038";

impl HealthState {
    /// Attachment color used when reporting checks in this state.
    pub fn color(&self) -> &'static str {
        match self {
            HealthState::Passing => COLOR_GOOD,
            HealthState::Warning => COLOR_WARNING,
            HealthState::Critical => COLOR_DANGER,
        }
    }
}

/// Incoming-webhook message body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Message {
    pub username: String,
    pub icon_emoji: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// A colored section within a message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Attachment {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

/// A title/value pair rendered inside an attachment.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    pub short: bool,
}
