//! Command surface over rule and channel storage

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{AppConfig, Config};
use crate::db::{AlertStore, NotificationStore};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertNotification, AlertState, AlertStateInfo, ChannelInput, Dashboard,
    DeleteDashboardCommand, GetAlertsQuery, PauseAlertCommand, PauseAllAlertsCommand,
    SaveAlertsCommand, SetAlertStateCommand, SignedInUser, StateUpdate,
};

use super::context::EvalContext;
use super::registry::NotifierRegistry;

/// Outcome of a pause or resume request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseResult {
    /// State the affected rules were moved to
    pub state: AlertState,
    pub affected: usize,
    pub message: String,
}

/// Rule and channel commands used by dashboards, the API layer and the CLI
pub struct AlertService {
    store: Arc<dyn AlertStore>,
    channels: Arc<dyn NotificationStore>,
    registry: Arc<NotifierRegistry>,
    app: AppConfig,
    match_limit: usize,
}

impl AlertService {
    pub fn new(
        config: &Config,
        store: Arc<dyn AlertStore>,
        channels: Arc<dyn NotificationStore>,
        registry: Arc<NotifierRegistry>,
    ) -> Self {
        Self {
            store,
            channels,
            registry,
            app: config.app.clone(),
            match_limit: config.alerting.max_match_fields,
        }
    }

    pub fn registry(&self) -> &NotifierRegistry {
        &self.registry
    }

    pub async fn save_dashboard(&self, dashboard: Dashboard) -> Result<Dashboard> {
        self.store.save_dashboard(dashboard).await
    }

    /// Replace the rule set of a dashboard, diffing by panel id
    pub async fn save_alerts(&self, cmd: SaveAlertsCommand) -> Result<Vec<Alert>> {
        for input in &cmd.alerts {
            if input.name.trim().is_empty() {
                return Err(Error::validation(format!(
                    "alert on panel {} has no name",
                    input.panel_id
                )));
            }
            if input.frequency <= 0 {
                return Err(Error::validation(format!(
                    "alert '{}' must have a positive frequency",
                    input.name
                )));
            }
        }

        let dashboard_id = cmd.dashboard_id;
        let saved = self.store.save_alerts(cmd).await?;
        info!(dashboard_id, count = saved.len(), "Saved dashboard alerts");
        Ok(saved)
    }

    pub async fn get_alert_by_id(&self, id: i64) -> Result<Alert> {
        self.store.get_alert_by_id(id).await
    }

    pub async fn get_alerts(&self, query: &GetAlertsQuery, user: &SignedInUser) -> Result<Vec<Alert>> {
        self.store.get_alerts(query, user).await
    }

    pub async fn get_alert_states_for_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<AlertStateInfo>> {
        self.store
            .get_alert_states_for_dashboard(org_id, dashboard_id)
            .await
    }

    pub async fn set_alert_state(&self, cmd: SetAlertStateCommand) -> Result<StateUpdate> {
        self.store.set_alert_state(cmd).await
    }

    /// Pause or resume one rule of `org_id`
    pub async fn pause_alert(&self, org_id: i64, alert_id: i64, paused: bool) -> Result<PauseResult> {
        let rule = self.store.get_alert_by_id(alert_id).await?;
        if rule.org_id != org_id {
            return Err(Error::not_found("alert", alert_id));
        }

        let affected = self
            .store
            .pause_alert(PauseAlertCommand {
                org_id,
                alert_ids: vec![alert_id],
                paused,
            })
            .await?;

        let (state, verb) = if paused {
            (AlertState::Paused, "paused")
        } else {
            (AlertState::Unknown, "un-paused")
        };
        info!(alert_id, paused, "Alert pause toggled");

        Ok(PauseResult {
            state,
            affected,
            message: format!("Alert {verb}"),
        })
    }

    /// Pause or resume every rule of every organisation
    pub async fn pause_all_alerts(&self, paused: bool) -> Result<PauseResult> {
        let affected = self
            .store
            .pause_all_alerts(PauseAllAlertsCommand { paused })
            .await?;

        let (state, verb) = if paused {
            (AlertState::Paused, "paused")
        } else {
            (AlertState::Pending, "un-paused")
        };
        info!(affected, paused, "All alerts pause toggled");

        Ok(PauseResult {
            state,
            affected,
            message: format!("alerts {verb}"),
        })
    }

    pub async fn delete_dashboard(&self, cmd: DeleteDashboardCommand) -> Result<usize> {
        self.store.delete_dashboard(cmd).await
    }

    /// Validate the channel through its notifier, then persist it
    pub async fn create_channel(&self, org_id: i64, input: ChannelInput) -> Result<AlertNotification> {
        let channel = AlertNotification::from_input(org_id, input, Utc::now());
        self.registry.build(&channel)?;

        let channel = self.channels.create_notification(channel).await?;
        info!(channel_id = channel.id, kind = %channel.kind, "Created notification channel");
        Ok(channel)
    }

    pub async fn update_channel(
        &self,
        org_id: i64,
        id: i64,
        input: ChannelInput,
    ) -> Result<AlertNotification> {
        let existing = self.channels.get_notification(org_id, id).await?;

        let mut channel = AlertNotification::from_input(org_id, input, Utc::now());
        channel.id = existing.id;
        channel.created = existing.created;
        self.registry.build(&channel)?;

        self.channels.update_notification(channel).await
    }

    pub async fn delete_channel(&self, org_id: i64, id: i64) -> Result<()> {
        self.channels.delete_notification(org_id, id).await
    }

    pub async fn get_channel(&self, org_id: i64, id: i64) -> Result<AlertNotification> {
        self.channels.get_notification(org_id, id).await
    }

    pub async fn list_channels(&self, org_id: i64) -> Result<Vec<AlertNotification>> {
        self.channels.list_notifications(org_id).await
    }

    /// Send a synthetic alerting notification through an unsaved channel
    pub async fn test_notification(
        &self,
        org_id: i64,
        input: ChannelInput,
        cancel: CancellationToken,
    ) -> Result<()> {
        let channel = AlertNotification::from_input(org_id, input, Utc::now());
        let notifier = self.registry.build(&channel)?;

        let ctx = EvalContext::test_run(org_id, self.app.clone(), cancel)
            .with_match_limit(self.match_limit);

        info!(kind = %channel.kind, channel = %channel.name, "Sending test notification");
        notifier.notify(&ctx).await
    }
}
