//! Alert data models

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Recorded state of an alert rule
///
/// `Paused` is only ever written by the pause operations; the authority for
/// whether a rule may be evaluated is [`Alert::paused`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    /// Never evaluated, or freshly unpaused
    #[default]
    Unknown,
    /// Condition not met
    Ok,
    /// Condition met
    Alerting,
    /// Query returned no data
    NoData,
    /// Evaluation suspended
    Paused,
    /// Waiting for the next evaluation cycle
    Pending,
}

impl AlertState {
    /// Wire name of the state
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Alerting => "alerting",
            Self::NoData => "no_data",
            Self::Paused => "paused",
            Self::Pending => "pending",
        }
    }

    /// Title fragment used in notification headlines
    pub fn title(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Ok => "OK",
            Self::Alerting => "Alerting",
            Self::NoData => "No Data",
            Self::Paused => "Paused",
            Self::Pending => "Pending",
        }
    }

    /// Attachment color used by chat integrations
    pub fn color(self) -> &'static str {
        match self {
            Self::Ok => "#36a64f",
            Self::Alerting => "#D63232",
            Self::NoData | Self::Paused | Self::Pending | Self::Unknown => "#888888",
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "ok" => Ok(Self::Ok),
            "alerting" => Ok(Self::Alerting),
            "no_data" => Ok(Self::NoData),
            "paused" => Ok(Self::Paused),
            "pending" => Ok(Self::Pending),
            other => Err(Error::validation(format!("unknown alert state '{other}'"))),
        }
    }
}

/// One series that matched the rule condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMatch {
    /// Series name
    pub metric: String,
    /// Value at evaluation time, `None` for null points
    pub value: Option<f64>,
    /// Series tags
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl EvalMatch {
    /// Create a match without tags
    pub fn new(metric: impl Into<String>, value: f64) -> Self {
        Self {
            metric: metric.into(),
            value: Some(value),
            tags: BTreeMap::new(),
        }
    }

    /// Value rendered for human-readable payloads
    pub fn display_value(&self) -> String {
        match self.value {
            Some(v) => v.to_string(),
            None => "null".to_string(),
        }
    }
}

/// An alert rule bound to one dashboard panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier
    pub id: i64,
    /// Owning organisation
    pub org_id: i64,
    /// Dashboard the panel lives on
    pub dashboard_id: i64,
    /// Panel the rule is attached to
    pub panel_id: i64,

    /// Human-readable name
    pub name: String,
    /// Message template sent with notifications
    pub message: String,
    /// Evaluation frequency in seconds
    pub frequency: i64,
    /// Handler id, kept for compatibility with the dashboard model
    pub handler: i64,
    /// Free-form severity label
    pub severity: String,
    /// Condition settings, opaque to the engine
    pub settings: serde_json::Value,
    /// Associated notification channel ids
    pub notifications: Vec<i64>,

    // State
    /// Pause gate
    pub paused: bool,
    /// Last recorded state
    pub state: AlertState,
    /// When state (or the pause gate) last changed
    pub new_state_date: DateTime<Utc>,
    /// Number of recorded state changes
    pub state_changes: i64,
    /// Last evaluation time
    pub eval_date: Option<DateTime<Utc>>,
    /// Last evaluation error
    pub execution_error: Option<String>,
    /// Raw data of the last evaluation
    pub eval_data: Option<serde_json::Value>,

    // Metadata
    /// When the rule was created
    pub created: DateTime<Utc>,
    /// When the rule metadata was last updated
    pub updated: DateTime<Utc>,
}

impl Alert {
    /// Build a freshly created rule from dashboard input
    pub fn from_input(
        org_id: i64,
        dashboard_id: i64,
        input: AlertInput,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            org_id,
            dashboard_id,
            panel_id: input.panel_id,
            name: input.name,
            message: input.message,
            frequency: input.frequency,
            handler: input.handler,
            severity: input.severity,
            settings: input.settings,
            notifications: input.notifications,
            paused: false,
            state: AlertState::Unknown,
            new_state_date: now,
            state_changes: 0,
            eval_date: None,
            execution_error: None,
            eval_data: None,
            created: now,
            updated: now,
        }
    }

    /// Whether `input` differs from the stored metadata
    pub fn contains_updates(&self, input: &AlertInput) -> bool {
        self.name != input.name
            || self.message != input.message
            || self.frequency != input.frequency
            || self.handler != input.handler
            || self.severity != input.severity
            || self.settings != input.settings
            || self.notifications != input.notifications
    }

    /// Overwrite metadata from `input`, leaving state untouched
    pub fn apply_update(&mut self, input: AlertInput, now: DateTime<Utc>) {
        self.name = input.name;
        self.message = input.message;
        self.frequency = input.frequency;
        self.handler = input.handler;
        self.severity = input.severity;
        self.settings = input.settings;
        self.notifications = input.notifications;
        self.updated = now;
    }

    /// Whether the rule should be evaluated at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.paused {
            return false;
        }
        match self.eval_date {
            None => true,
            Some(last) => now - last >= Duration::seconds(self.frequency.max(1)),
        }
    }
}

/// Rule definition extracted from a dashboard panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInput {
    pub panel_id: i64,
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_frequency")]
    pub frequency: i64,
    #[serde(default = "default_handler")]
    pub handler: i64,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub notifications: Vec<i64>,
}

impl AlertInput {
    /// Minimal input for a panel
    pub fn new(panel_id: i64, name: impl Into<String>) -> Self {
        Self {
            panel_id,
            name: name.into(),
            message: String::new(),
            frequency: default_frequency(),
            handler: default_handler(),
            severity: String::new(),
            settings: serde_json::json!({}),
            notifications: Vec::new(),
        }
    }
}

fn default_frequency() -> i64 {
    60
}

fn default_handler() -> i64 {
    1
}
