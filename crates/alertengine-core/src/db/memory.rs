//! In-memory store for alert rules, dashboards and notification channels

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::{AlertStore, NotificationStore};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertNotification, AlertState, AlertStateInfo, Dashboard, DeleteDashboardCommand,
    GetAlertsQuery, OrgRole, PauseAlertCommand, PauseAllAlertsCommand, SaveAlertsCommand,
    SetAlertStateCommand, SignedInUser, StateUpdate,
};

/// Store keeping everything behind one lock
///
/// Every mutation replaces whole rows while holding the write lock, so
/// readers never observe a partially updated rule.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
    min_read_role: OrgRole,
}

#[derive(Default)]
struct Inner {
    dashboards: HashMap<i64, Dashboard>,
    alerts: BTreeMap<i64, Alert>,
    notifications: BTreeMap<i64, AlertNotification>,
    next_alert_id: i64,
    next_notification_id: i64,
}

impl MemoryStore {
    /// Create an empty store using the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store with a custom time source
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
            min_read_role: OrgRole::Viewer,
        }
    }

    /// Hide rules from callers below `role`
    #[must_use]
    pub fn with_min_read_role(mut self, role: OrgRole) -> Self {
        self.min_read_role = role;
        self
    }

    /// Apply a pause or resume to one row, returning whether it was committed
    fn apply_pause(&self, id: i64, paused: bool, resume_state: AlertState) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let Some(current) = inner.alerts.get(&id) else {
            return false;
        };

        let mut next = current.clone();
        next.paused = paused;
        next.state = if paused { AlertState::Paused } else { resume_state };
        next.new_state_date = advance(current.new_state_date, now);

        inner.alerts.insert(id, next);
        true
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Next state-change timestamp, strictly after `prev`
fn advance(prev: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

fn state_filter(states: &[String]) -> Result<Option<HashSet<AlertState>>> {
    if states.is_empty() || states.iter().any(|s| s == "all") {
        return Ok(None);
    }
    states
        .iter()
        .map(|s| s.parse::<AlertState>())
        .collect::<Result<HashSet<_>>>()
        .map(Some)
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn save_dashboard(&self, dashboard: Dashboard) -> Result<Dashboard> {
        self.inner
            .write()
            .dashboards
            .insert(dashboard.id, dashboard.clone());
        Ok(dashboard)
    }

    async fn get_dashboard(&self, org_id: i64, id: i64) -> Result<Dashboard> {
        self.inner
            .read()
            .dashboards
            .get(&id)
            .filter(|d| d.org_id == org_id)
            .cloned()
            .ok_or_else(|| Error::not_found("dashboard", id))
    }

    async fn delete_dashboard(&self, cmd: DeleteDashboardCommand) -> Result<usize> {
        let mut inner = self.inner.write();

        match inner.dashboards.get(&cmd.id) {
            Some(d) if d.org_id == cmd.org_id => {}
            _ => return Err(Error::not_found("dashboard", cmd.id)),
        }
        inner.dashboards.remove(&cmd.id);

        let before = inner.alerts.len();
        inner
            .alerts
            .retain(|_, a| !(a.dashboard_id == cmd.id && a.org_id == cmd.org_id));
        let removed = before - inner.alerts.len();

        info!(dashboard_id = cmd.id, removed, "Deleted dashboard and its alerts");
        Ok(removed)
    }

    async fn save_alerts(&self, cmd: SaveAlertsCommand) -> Result<Vec<Alert>> {
        let now = self.clock.now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        match inner.dashboards.get(&cmd.dashboard_id) {
            Some(d) if d.org_id == cmd.org_id => {}
            _ => return Err(Error::not_found("dashboard", cmd.dashboard_id)),
        }

        let mut panels = HashSet::with_capacity(cmd.alerts.len());
        for input in &cmd.alerts {
            if !panels.insert(input.panel_id) {
                return Err(Error::validation(format!(
                    "more than one alert for panel {}",
                    input.panel_id
                )));
            }
        }

        let existing: HashMap<i64, i64> = inner
            .alerts
            .values()
            .filter(|a| a.dashboard_id == cmd.dashboard_id && a.org_id == cmd.org_id)
            .map(|a| (a.panel_id, a.id))
            .collect();

        let mut saved = Vec::with_capacity(cmd.alerts.len());
        for input in cmd.alerts {
            if let Some(alert) = existing
                .get(&input.panel_id)
                .and_then(|id| inner.alerts.get_mut(id))
            {
                if alert.contains_updates(&input) {
                    debug!(alert_id = alert.id, panel_id = alert.panel_id, "Updating alert");
                    alert.apply_update(input, now);
                }
                saved.push(alert.clone());
                continue;
            }

            inner.next_alert_id += 1;
            let mut alert = Alert::from_input(cmd.org_id, cmd.dashboard_id, input, now);
            alert.id = inner.next_alert_id;
            debug!(alert_id = alert.id, panel_id = alert.panel_id, "Creating alert");
            inner.alerts.insert(alert.id, alert.clone());
            saved.push(alert);
        }

        for (panel_id, id) in existing {
            if !panels.contains(&panel_id) {
                debug!(alert_id = id, panel_id, "Deleting alert missing from dashboard");
                inner.alerts.remove(&id);
            }
        }

        Ok(saved)
    }

    async fn get_alert_by_id(&self, id: i64) -> Result<Alert> {
        self.inner
            .read()
            .alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("alert", id))
    }

    async fn get_alerts(&self, query: &GetAlertsQuery, user: &SignedInUser) -> Result<Vec<Alert>> {
        if user.org_role < self.min_read_role {
            debug!(user_id = user.user_id, role = ?user.org_role, "Caller may not read alerts");
            return Ok(Vec::new());
        }

        let states = state_filter(&query.states)?;
        let needle = query.query.to_lowercase();

        let inner = self.inner.read();
        let mut rows: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.org_id == query.org_id)
            .filter(|a| query.dashboard_ids.is_empty() || query.dashboard_ids.contains(&a.dashboard_id))
            .filter(|a| query.panel_id == 0 || a.panel_id == query.panel_id)
            .filter(|a| states.as_ref().map_or(true, |s| s.contains(&a.state)))
            .filter(|a| needle.is_empty() || a.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        drop(inner);

        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        if query.limit > 0 {
            rows.truncate(query.limit);
        }
        Ok(rows)
    }

    async fn get_alert_states_for_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<AlertStateInfo>> {
        Ok(self
            .inner
            .read()
            .alerts
            .values()
            .filter(|a| a.org_id == org_id && a.dashboard_id == dashboard_id)
            .map(|a| AlertStateInfo {
                id: a.id,
                dashboard_id: a.dashboard_id,
                panel_id: a.panel_id,
                state: a.state,
                new_state_date: a.new_state_date,
            })
            .collect())
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        Ok(self.inner.read().alerts.values().cloned().collect())
    }

    async fn set_alert_state(&self, cmd: SetAlertStateCommand) -> Result<StateUpdate> {
        if cmd.state == AlertState::Paused {
            return Err(Error::validation(
                "state 'paused' can only be set by pausing the alert",
            ));
        }

        let now = self.clock.now();
        let mut inner = self.inner.write();

        let current = inner
            .alerts
            .get(&cmd.alert_id)
            .ok_or_else(|| Error::not_found("alert", cmd.alert_id))?;
        if current.paused {
            return Err(Error::PausedAlert(current.id));
        }

        let mut next = current.clone();
        if next.state != cmd.state {
            next.state = cmd.state;
            next.state_changes += 1;
            next.new_state_date = advance(current.new_state_date, now);
        }
        next.eval_date = Some(now);
        next.execution_error = cmd.error;
        next.eval_data = cmd.eval_data;

        let previous = current.state;
        inner.alerts.insert(next.id, next.clone());
        Ok(StateUpdate {
            alert: next,
            previous,
        })
    }

    async fn pause_alert(&self, cmd: PauseAlertCommand) -> Result<usize> {
        let ids: Vec<i64> = {
            let inner = self.inner.read();
            cmd.alert_ids
                .iter()
                .copied()
                .filter(|id| inner.alerts.get(id).is_some_and(|a| a.org_id == cmd.org_id))
                .collect()
        };

        let affected = ids
            .into_iter()
            .filter(|id| self.apply_pause(*id, cmd.paused, AlertState::Unknown))
            .count();
        Ok(affected)
    }

    async fn pause_all_alerts(&self, cmd: PauseAllAlertsCommand) -> Result<usize> {
        let ids: Vec<i64> = self.inner.read().alerts.keys().copied().collect();

        let affected = ids
            .into_iter()
            .filter(|id| self.apply_pause(*id, cmd.paused, AlertState::Pending))
            .count();
        Ok(affected)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(&self, channel: AlertNotification) -> Result<AlertNotification> {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        if inner
            .notifications
            .values()
            .any(|n| n.org_id == channel.org_id && n.name == channel.name)
        {
            return Err(Error::validation(format!(
                "a notification channel named '{}' already exists",
                channel.name
            )));
        }

        inner.next_notification_id += 1;
        let mut channel = channel;
        channel.id = inner.next_notification_id;
        channel.created = now;
        channel.updated = now;

        inner.notifications.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn update_notification(&self, channel: AlertNotification) -> Result<AlertNotification> {
        let now = self.clock.now();
        let mut inner = self.inner.write();

        let created = match inner.notifications.get(&channel.id) {
            Some(existing) if existing.org_id == channel.org_id => existing.created,
            _ => return Err(Error::not_found("notification channel", channel.id)),
        };
        if inner
            .notifications
            .values()
            .any(|n| n.org_id == channel.org_id && n.name == channel.name && n.id != channel.id)
        {
            return Err(Error::validation(format!(
                "a notification channel named '{}' already exists",
                channel.name
            )));
        }

        let mut channel = channel;
        channel.created = created;
        channel.updated = now;

        inner.notifications.insert(channel.id, channel.clone());
        Ok(channel)
    }

    async fn delete_notification(&self, org_id: i64, id: i64) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.notifications.get(&id) {
            Some(n) if n.org_id == org_id => {
                inner.notifications.remove(&id);
                Ok(())
            }
            _ => Err(Error::not_found("notification channel", id)),
        }
    }

    async fn get_notification(&self, org_id: i64, id: i64) -> Result<AlertNotification> {
        self.inner
            .read()
            .notifications
            .get(&id)
            .filter(|n| n.org_id == org_id)
            .cloned()
            .ok_or_else(|| Error::not_found("notification channel", id))
    }

    async fn list_notifications(&self, org_id: i64) -> Result<Vec<AlertNotification>> {
        Ok(self
            .inner
            .read()
            .notifications
            .values()
            .filter(|n| n.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn notifications_for_alert(
        &self,
        org_id: i64,
        ids: &[i64],
    ) -> Result<Vec<AlertNotification>> {
        Ok(self
            .inner
            .read()
            .notifications
            .values()
            .filter(|n| n.org_id == org_id && (n.is_default || ids.contains(&n.id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ManualClock;
    use crate::models::{AlertInput, ChannelInput};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn admin() -> SignedInUser {
        SignedInUser::new(1, 1, OrgRole::Admin)
    }

    fn frozen_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        ))
    }

    async fn store_with_dashboard() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .save_dashboard(Dashboard::new(1, 1, "abc123", "Dashboard with alerts"))
            .await
            .unwrap();
        store
    }

    fn save_cmd(alerts: Vec<AlertInput>) -> SaveAlertsCommand {
        SaveAlertsCommand {
            dashboard_id: 1,
            org_id: 1,
            user_id: 1,
            alerts,
        }
    }

    fn alert_input() -> AlertInput {
        let mut input = AlertInput::new(1, "Alerting title");
        input.message = "Alerting message".to_string();
        input.frequency = 1;
        input
    }

    #[tokio::test]
    async fn saved_alert_starts_unknown() {
        let store = store_with_dashboard().await;
        store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();

        let query = GetAlertsQuery {
            panel_id: 1,
            ..GetAlertsQuery::for_dashboard(1, 1)
        };
        let alerts = store.get_alerts(&query, &admin()).await.unwrap();

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert!(alert.id > 0);
        assert_eq!(alert.dashboard_id, 1);
        assert_eq!(alert.panel_id, 1);
        assert_eq!(alert.name, "Alerting title");
        assert_eq!(alert.state, AlertState::Unknown);
        assert_eq!(alert.execution_error, None);
    }

    #[tokio::test]
    async fn save_requires_dashboard() {
        let store = MemoryStore::new();
        let err = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn set_state_records_evaluation() {
        let store = store_with_dashboard().await;
        let saved = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();
        let id = saved[0].id;

        let cmd = SetAlertStateCommand {
            eval_data: Some(serde_json::json!({"test": "test"})),
            error: Some("query timed out".to_string()),
            ..SetAlertStateCommand::new(id, AlertState::Alerting)
        };
        let update = store.set_alert_state(cmd).await.unwrap();
        assert_eq!(update.previous, AlertState::Unknown);
        assert!(update.changed());

        let alert = update.alert;
        assert_eq!(alert.state, AlertState::Alerting);
        assert_eq!(alert.state_changes, 1);
        assert!(alert.eval_date.is_some());
        assert_eq!(alert.execution_error.as_deref(), Some("query timed out"));
        assert_eq!(alert.eval_data.unwrap()["test"], "test");
    }

    #[tokio::test]
    async fn same_state_keeps_state_date() {
        let store = store_with_dashboard().await;
        let id = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap()[0].id;

        let first = store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Ok))
            .await
            .unwrap()
            .alert;
        let second = store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Ok))
            .await
            .unwrap();

        assert!(!second.changed());
        assert_eq!(first.new_state_date, second.alert.new_state_date);
        assert_eq!(second.alert.state_changes, 1);
    }

    #[tokio::test]
    async fn set_state_unknown_alert() {
        let store = store_with_dashboard().await;
        let err = store
            .set_alert_state(SetAlertStateCommand::new(42, AlertState::Ok))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn paused_state_cannot_be_set_directly() {
        let store = store_with_dashboard().await;
        let id = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap()[0].id;
        let err = store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Paused))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn pause_all_blocks_state_changes() {
        let store = store_with_dashboard().await;
        let id = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap()[0].id;
        store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Ok))
            .await
            .unwrap();
        let before = store.get_alert_by_id(id).await.unwrap().new_state_date;

        let affected = store
            .pause_all_alerts(PauseAllAlertsCommand { paused: true })
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let err = store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Ok))
            .await
            .unwrap_err();
        assert!(err.is_paused());

        let paused = store.get_alert_by_id(id).await.unwrap();
        assert_eq!(paused.state, AlertState::Paused);
        assert!(before < paused.new_state_date);

        store
            .pause_all_alerts(PauseAllAlertsCommand { paused: false })
            .await
            .unwrap();
        let resumed = store.get_alert_by_id(id).await.unwrap();
        assert_eq!(resumed.state, AlertState::Pending);
        assert!(paused.new_state_date < resumed.new_state_date);

        store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Ok))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pause_single_alert_bumps_state_date() {
        let store = MemoryStore::with_clock(frozen_clock());
        store
            .save_dashboard(Dashboard::new(1, 1, "abc123", "Dashboard with alerts"))
            .await
            .unwrap();
        let alert = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap().remove(0);

        let pause = |paused| PauseAlertCommand {
            org_id: 1,
            alert_ids: vec![alert.id],
            paused,
        };

        assert_eq!(store.pause_alert(pause(true)).await.unwrap(), 1);
        let after_pause = store.get_alert_by_id(alert.id).await.unwrap();
        assert!(alert.new_state_date < after_pause.new_state_date);

        // idempotent, and still bumps
        assert_eq!(store.pause_alert(pause(true)).await.unwrap(), 1);
        let paused_again = store.get_alert_by_id(alert.id).await.unwrap();
        assert!(after_pause.new_state_date < paused_again.new_state_date);

        assert_eq!(store.pause_alert(pause(false)).await.unwrap(), 1);
        let after_unpause = store.get_alert_by_id(alert.id).await.unwrap();
        assert!(paused_again.new_state_date < after_unpause.new_state_date);
        assert_eq!(after_unpause.state, AlertState::Unknown);
        assert!(!after_unpause.paused);
    }

    #[tokio::test]
    async fn pause_ignores_other_orgs() {
        let store = store_with_dashboard().await;
        let id = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap()[0].id;

        let affected = store
            .pause_alert(PauseAlertCommand {
                org_id: 2,
                alert_ids: vec![id],
                paused: true,
            })
            .await
            .unwrap();

        assert_eq!(affected, 0);
        assert!(!store.get_alert_by_id(id).await.unwrap().paused);
    }

    #[tokio::test]
    async fn viewer_below_min_role_sees_nothing() {
        let store = MemoryStore::new().with_min_read_role(OrgRole::Editor);
        store
            .save_dashboard(Dashboard::new(1, 1, "abc123", "Dashboard with alerts"))
            .await
            .unwrap();
        store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();

        let query = GetAlertsQuery::for_dashboard(1, 1);
        let viewer = SignedInUser::new(2, 1, OrgRole::Viewer);
        assert!(store.get_alerts(&query, &viewer).await.unwrap().is_empty());
        assert_eq!(store.get_alerts(&query, &admin()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn viewer_reads_by_default() {
        let store = store_with_dashboard().await;
        store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();

        let viewer = SignedInUser::new(2, 1, OrgRole::Viewer);
        let alerts = store
            .get_alerts(&GetAlertsQuery::for_dashboard(1, 1), &viewer)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn update_same_panel_keeps_state() {
        let store = store_with_dashboard().await;
        store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();

        let mut modified = alert_input();
        modified.name = "Name".to_string();
        store.save_alerts(save_cmd(vec![modified])).await.unwrap();

        let alerts = store
            .get_alerts(&GetAlertsQuery::for_dashboard(1, 1), &admin())
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "Name");
        assert_eq!(alerts[0].state, AlertState::Unknown);
    }

    #[tokio::test]
    async fn resaving_unchanged_set_is_noop() {
        let store = store_with_dashboard().await;
        let first = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();
        let id = first[0].id;
        store
            .set_alert_state(SetAlertStateCommand::new(id, AlertState::Alerting))
            .await
            .unwrap();
        let before = store.get_alert_by_id(id).await.unwrap();

        store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap();
        let after = store.get_alert_by_id(id).await.unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn saving_subset_deletes_missing_panel() {
        let store = store_with_dashboard().await;
        let inputs: Vec<AlertInput> = (1..=3)
            .map(|panel| AlertInput::new(panel, panel.to_string()))
            .collect();
        let saved = store.save_alerts(save_cmd(inputs.clone())).await.unwrap();
        assert_eq!(saved.len(), 3);

        store.save_alerts(save_cmd(inputs[..2].to_vec())).await.unwrap();

        let alerts = store
            .get_alerts(&GetAlertsQuery::for_dashboard(1, 1), &admin())
            .await
            .unwrap();
        let panels: Vec<i64> = alerts.iter().map(|a| a.panel_id).collect();
        assert_eq!(panels, vec![1, 2]);
        assert_eq!(alerts[0].id, saved[0].id);
        assert_eq!(alerts[1].id, saved[1].id);
    }

    #[tokio::test]
    async fn duplicate_panels_rejected() {
        let store = store_with_dashboard().await;
        let err = store
            .save_alerts(save_cmd(vec![AlertInput::new(1, "a"), AlertInput::new(1, "b")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn deleting_dashboard_removes_alerts() {
        let store = store_with_dashboard().await;
        let inputs = (1..=3).map(|p| AlertInput::new(p, p.to_string())).collect();
        store.save_alerts(save_cmd(inputs)).await.unwrap();

        let removed = store
            .delete_dashboard(DeleteDashboardCommand { org_id: 1, id: 1 })
            .await
            .unwrap();
        assert_eq!(removed, 3);

        let alerts = store
            .get_alerts(&GetAlertsQuery::for_dashboard(1, 1), &admin())
            .await
            .unwrap();
        assert!(alerts.is_empty());
        assert!(store.get_dashboard(1, 1).await.is_err());
    }

    #[tokio::test]
    async fn query_filters_state_and_name() {
        let store = store_with_dashboard().await;
        let saved = store
            .save_alerts(save_cmd(vec![
                AlertInput::new(1, "CPU high"),
                AlertInput::new(2, "Disk full"),
                AlertInput::new(3, "cpu steal"),
            ]))
            .await
            .unwrap();
        store
            .set_alert_state(SetAlertStateCommand::new(saved[0].id, AlertState::Alerting))
            .await
            .unwrap();

        let by_state = GetAlertsQuery {
            states: vec!["alerting".to_string()],
            ..GetAlertsQuery::for_dashboard(1, 1)
        };
        let rows = store.get_alerts(&by_state, &admin()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "CPU high");

        let by_name = GetAlertsQuery {
            query: "cpu".to_string(),
            states: vec!["all".to_string()],
            ..GetAlertsQuery::for_dashboard(1, 1)
        };
        let names: Vec<String> = store
            .get_alerts(&by_name, &admin())
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["CPU high", "cpu steal"]);

        let bad = GetAlertsQuery {
            states: vec!["exploded".to_string()],
            ..GetAlertsQuery::default()
        };
        assert!(store.get_alerts(&bad, &admin()).await.is_err());
    }

    #[tokio::test]
    async fn dashboard_states() {
        let store = store_with_dashboard().await;
        store
            .save_alerts(save_cmd(vec![AlertInput::new(4, "a"), AlertInput::new(7, "b")]))
            .await
            .unwrap();

        let states = store.get_alert_states_for_dashboard(1, 1).await.unwrap();
        let panels: Vec<i64> = states.iter().map(|s| s.panel_id).collect();
        assert_eq!(panels, vec![4, 7]);
        assert!(states.iter().all(|s| s.state == AlertState::Unknown));
    }

    #[tokio::test]
    async fn channels_include_org_defaults() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mk = |name: &str, default: bool, org| {
            let mut input = ChannelInput::new("webhook", name, serde_json::json!({}));
            input.is_default = default;
            AlertNotification::from_input(org, input, now)
        };

        let explicit = store.create_notification(mk("explicit", false, 1)).await.unwrap();
        let default = store.create_notification(mk("default", true, 1)).await.unwrap();
        store.create_notification(mk("unrelated", false, 1)).await.unwrap();
        store.create_notification(mk("other org", true, 2)).await.unwrap();

        let ids: Vec<i64> = store
            .notifications_for_alert(1, &[explicit.id, default.id])
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![explicit.id, default.id]);
    }

    #[tokio::test]
    async fn channel_names_unique_per_org() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let channel = AlertNotification::from_input(
            1,
            ChannelInput::new("webhook", "ops", serde_json::json!({})),
            now,
        );
        store.create_notification(channel.clone()).await.unwrap();
        assert!(matches!(
            store.create_notification(channel).await,
            Err(Error::Validation(_))
        ));
    }

    proptest! {
        #[test]
        fn pause_toggles_strictly_advance(toggles in proptest::collection::vec(any::<bool>(), 1..20)) {
            tokio_test::block_on(async move {
                let store = MemoryStore::with_clock(frozen_clock());
                store
                    .save_dashboard(Dashboard::new(1, 1, "uid", "dash"))
                    .await
                    .unwrap();
                let alert = store.save_alerts(save_cmd(vec![alert_input()])).await.unwrap().remove(0);

                let mut last = alert.new_state_date;
                for paused in toggles {
                    if paused {
                        store.pause_all_alerts(PauseAllAlertsCommand { paused }).await.unwrap();
                    } else {
                        store
                            .pause_alert(PauseAlertCommand { org_id: 1, alert_ids: vec![alert.id], paused })
                            .await
                            .unwrap();
                    }
                    let current = store.get_alert_by_id(alert.id).await.unwrap().new_state_date;
                    prop_assert!(last < current);
                    last = current;
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
