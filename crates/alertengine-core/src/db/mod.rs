//! Storage layer for alertengine
//!
//! The engine talks to storage only through [`AlertStore`] and
//! [`NotificationStore`]. [`MemoryStore`] implements both.

mod clock;
mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Alert, AlertNotification, AlertStateInfo, Dashboard, DeleteDashboardCommand, GetAlertsQuery,
    PauseAlertCommand, PauseAllAlertsCommand, SaveAlertsCommand, SetAlertStateCommand,
    SignedInUser, StateUpdate,
};

/// Rule persistence and the rule state machine guards
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Insert or replace a dashboard record
    async fn save_dashboard(&self, dashboard: Dashboard) -> Result<Dashboard>;

    /// Fetch a dashboard of an organisation
    async fn get_dashboard(&self, org_id: i64, id: i64) -> Result<Dashboard>;

    /// Delete a dashboard and cascade to its rules, returning the number of rules removed
    async fn delete_dashboard(&self, cmd: DeleteDashboardCommand) -> Result<usize>;

    /// Upsert the rule set of a dashboard by panel id and delete missing panels
    async fn save_alerts(&self, cmd: SaveAlertsCommand) -> Result<Vec<Alert>>;

    /// Fetch a rule by id
    async fn get_alert_by_id(&self, id: i64) -> Result<Alert>;

    /// Filtered listing, empty for callers below the minimum read role
    async fn get_alerts(&self, query: &GetAlertsQuery, user: &SignedInUser) -> Result<Vec<Alert>>;

    /// Per-panel states of one dashboard
    async fn get_alert_states_for_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<AlertStateInfo>>;

    /// Every rule across all organisations
    async fn list_alerts(&self) -> Result<Vec<Alert>>;

    /// Record an evaluation verdict; fails with `PausedAlert` while the pause gate is set
    async fn set_alert_state(&self, cmd: SetAlertStateCommand) -> Result<StateUpdate>;

    /// Pause or resume rules of one organisation, returning rows committed
    async fn pause_alert(&self, cmd: PauseAlertCommand) -> Result<usize>;

    /// Pause or resume every rule, returning rows committed
    async fn pause_all_alerts(&self, cmd: PauseAllAlertsCommand) -> Result<usize>;
}

/// Notification channel persistence
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, channel: AlertNotification) -> Result<AlertNotification>;

    async fn update_notification(&self, channel: AlertNotification) -> Result<AlertNotification>;

    async fn delete_notification(&self, org_id: i64, id: i64) -> Result<()>;

    async fn get_notification(&self, org_id: i64, id: i64) -> Result<AlertNotification>;

    async fn list_notifications(&self, org_id: i64) -> Result<Vec<AlertNotification>>;

    /// Channels with the given ids plus the org's default channels, without duplicates
    async fn notifications_for_alert(
        &self,
        org_id: i64,
        ids: &[i64],
    ) -> Result<Vec<AlertNotification>>;
}
