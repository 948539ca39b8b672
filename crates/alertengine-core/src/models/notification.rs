//! Notification channel configuration

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured instance of a notifier type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    /// Unique identifier, 0 for unsaved channels
    pub id: i64,
    /// Owning organisation
    pub org_id: i64,
    /// Registered notifier type id
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name
    pub name: String,
    /// Attached to every rule of the org
    pub is_default: bool,
    /// Disabled channels are never dispatched to
    pub enabled: bool,
    /// Announce recoveries to `ok`
    pub send_on_ok: bool,
    /// Re-send while a rule keeps alerting
    pub send_reminder: bool,
    /// Minimum time between reminders
    #[serde(default, with = "humantime_serde")]
    pub frequency: Option<Duration>,
    /// Include rendered panel images
    pub upload_image: bool,
    /// Type specific settings, validated by the notifier constructor
    pub settings: serde_json::Value,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl AlertNotification {
    /// Materialise an unsaved channel from input
    pub fn from_input(org_id: i64, input: ChannelInput, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            org_id,
            kind: input.kind,
            name: input.name,
            is_default: input.is_default,
            enabled: input.enabled,
            send_on_ok: input.send_on_ok,
            send_reminder: input.send_reminder,
            frequency: input.frequency,
            upload_image: input.upload_image,
            settings: input.settings,
            created: now,
            updated: now,
        }
    }
}

/// Create or update payload for a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default = "enabled_by_default")]
    pub send_on_ok: bool,
    #[serde(default)]
    pub send_reminder: bool,
    #[serde(default, with = "humantime_serde")]
    pub frequency: Option<Duration>,
    #[serde(default = "enabled_by_default")]
    pub upload_image: bool,
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChannelInput {
    /// Input with default flags
    pub fn new(kind: impl Into<String>, name: impl Into<String>, settings: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            is_default: false,
            enabled: true,
            send_on_ok: true,
            send_reminder: false,
            frequency: None,
            upload_image: true,
            settings,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}
