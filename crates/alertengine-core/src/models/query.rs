//! Command and query types shared between the service and store layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{Alert, AlertInput, AlertState};

/// Organisation role of the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Viewer,
    Editor,
    Admin,
}

/// Identity of the caller issuing a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    pub user_id: i64,
    pub org_id: i64,
    pub org_role: OrgRole,
}

impl SignedInUser {
    pub fn new(user_id: i64, org_id: i64, org_role: OrgRole) -> Self {
        Self {
            user_id,
            org_id,
            org_role,
        }
    }
}

/// Replace every rule of a dashboard with `alerts`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveAlertsCommand {
    pub dashboard_id: i64,
    pub org_id: i64,
    pub user_id: i64,
    pub alerts: Vec<AlertInput>,
}

/// Record the verdict of one evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetAlertStateCommand {
    pub alert_id: i64,
    pub state: AlertState,
    pub error: Option<String>,
    pub eval_data: Option<serde_json::Value>,
}

impl SetAlertStateCommand {
    pub fn new(alert_id: i64, state: AlertState) -> Self {
        Self {
            alert_id,
            state,
            error: None,
            eval_data: None,
        }
    }
}

/// Row written by a state update, with the state it replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub alert: Alert,
    pub previous: AlertState,
}

impl StateUpdate {
    pub fn changed(&self) -> bool {
        self.previous != self.alert.state
    }
}

/// Pause or resume specific rules of one organisation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseAlertCommand {
    pub org_id: i64,
    pub alert_ids: Vec<i64>,
    pub paused: bool,
}

/// Pause or resume every rule (maintenance mode)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PauseAllAlertsCommand {
    pub paused: bool,
}

/// Remove a dashboard and all rules it owns
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeleteDashboardCommand {
    pub org_id: i64,
    pub id: i64,
}

/// Filtered rule listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetAlertsQuery {
    pub org_id: i64,
    /// Restrict to these dashboards, empty means all
    #[serde(default)]
    pub dashboard_ids: Vec<i64>,
    /// Restrict to one panel, 0 means any
    #[serde(default)]
    pub panel_id: i64,
    /// State names; `all` disables the filter
    #[serde(default)]
    pub states: Vec<String>,
    /// Case-insensitive substring of the rule name
    #[serde(default)]
    pub query: String,
    /// Maximum rows, 0 means unlimited
    #[serde(default)]
    pub limit: usize,
}

impl GetAlertsQuery {
    pub fn for_dashboard(org_id: i64, dashboard_id: i64) -> Self {
        Self {
            org_id,
            dashboard_ids: vec![dashboard_id],
            ..Self::default()
        }
    }
}

/// Compact per-panel state used by dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStateInfo {
    pub id: i64,
    pub dashboard_id: i64,
    pub panel_id: i64,
    pub state: AlertState,
    pub new_state_date: DateTime<Utc>,
}
