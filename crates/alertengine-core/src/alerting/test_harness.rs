//! Doubles and fixtures for exercising the alerting pipeline without a network

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::db::{AlertStore, MemoryStore};
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertInput, AlertState, AlertStateInfo, Dashboard, DeleteDashboardCommand,
    GetAlertsQuery, PauseAlertCommand, PauseAllAlertsCommand, SaveAlertsCommand,
    SetAlertStateCommand, SignedInUser, StateUpdate,
};

use super::context::{EvalContext, EvaluationResult};
use super::evaluator::ConditionEvaluator;
use super::sender::{WebhookRequest, WebhookSender};

/// [`WebhookSender`] that records requests instead of sending them
#[derive(Debug, Default)]
pub struct RecordingSender {
    requests: Mutex<Vec<WebhookRequest>>,
    failing_prefixes: Vec<String>,
    delay: Option<Duration>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request whose URL starts with `prefix`
    #[must_use]
    pub fn failing_on(mut self, prefix: impl Into<String>) -> Self {
        self.failing_prefixes.push(prefix.into());
        self
    }

    /// Hold every request for `delay` before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests seen so far, failed ones included
    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent to URLs starting with `prefix`
    pub fn requests_to(&self, prefix: &str) -> Vec<WebhookRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.requests.lock().clear();
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn send(&self, request: WebhookRequest, cancel: &CancellationToken) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::delivery(request.target(), "cancelled")),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let target = request.target();
        let fails = self
            .failing_prefixes
            .iter()
            .any(|prefix| request.url.starts_with(prefix.as_str()));
        self.requests.lock().push(request);

        if fails {
            return Err(Error::delivery(target, "remote returned 500 Internal Server Error"));
        }
        Ok(())
    }
}

/// [`ConditionEvaluator`] answering from a per-rule script, `Ok` otherwise
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    results: Mutex<HashMap<i64, EvaluationResult>>,
}

impl ScriptedEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `result` for `rule_id` until scripted again
    pub fn script(&self, rule_id: i64, result: EvaluationResult) {
        self.results.lock().insert(rule_id, result);
    }
}

#[async_trait]
impl ConditionEvaluator for ScriptedEvaluator {
    async fn evaluate(&self, rule: &Alert, _cancel: &CancellationToken) -> EvaluationResult {
        self.results
            .lock()
            .get(&rule.id)
            .cloned()
            .unwrap_or_else(EvaluationResult::ok)
    }
}

/// [`AlertStore`] whose state writes always fail, everything else is delegated
pub struct FailingStateStore {
    inner: Arc<MemoryStore>,
}

impl FailingStateStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AlertStore for FailingStateStore {
    async fn save_dashboard(&self, dashboard: Dashboard) -> Result<Dashboard> {
        self.inner.save_dashboard(dashboard).await
    }

    async fn get_dashboard(&self, org_id: i64, id: i64) -> Result<Dashboard> {
        self.inner.get_dashboard(org_id, id).await
    }

    async fn delete_dashboard(&self, cmd: DeleteDashboardCommand) -> Result<usize> {
        self.inner.delete_dashboard(cmd).await
    }

    async fn save_alerts(&self, cmd: SaveAlertsCommand) -> Result<Vec<Alert>> {
        self.inner.save_alerts(cmd).await
    }

    async fn get_alert_by_id(&self, id: i64) -> Result<Alert> {
        self.inner.get_alert_by_id(id).await
    }

    async fn get_alerts(&self, query: &GetAlertsQuery, user: &SignedInUser) -> Result<Vec<Alert>> {
        self.inner.get_alerts(query, user).await
    }

    async fn get_alert_states_for_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<AlertStateInfo>> {
        self.inner
            .get_alert_states_for_dashboard(org_id, dashboard_id)
            .await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>> {
        self.inner.list_alerts().await
    }

    async fn set_alert_state(&self, cmd: SetAlertStateCommand) -> Result<StateUpdate> {
        Err(Error::Persistence(format!(
            "store unavailable while saving alert {}",
            cmd.alert_id
        )))
    }

    async fn pause_alert(&self, cmd: PauseAlertCommand) -> Result<usize> {
        self.inner.pause_alert(cmd).await
    }

    async fn pause_all_alerts(&self, cmd: PauseAllAlertsCommand) -> Result<usize> {
        self.inner.pause_all_alerts(cmd).await
    }
}

/// Context for rule 42 "High CPU" on panel 3 of dashboard 7 (org 1), previously in `prev`
pub fn context(prev: AlertState) -> EvalContext {
    let mut rule = Alert::from_input(1, 7, AlertInput::new(3, "High CPU"), Utc::now());
    rule.id = 42;
    rule.state = prev;

    EvalContext::new(rule, AppConfig::default(), CancellationToken::new())
        .with_dashboard(Dashboard::new(7, 1, "abc123", "Prod Overview"))
}

/// Store a rule named `name` on a fresh dashboard of org 1
pub async fn seed_rule(store: &MemoryStore, name: &str) -> Result<Alert> {
    let dashboard_id = store.list_alerts().await?.len() as i64 + 1;
    store
        .save_dashboard(Dashboard::new(
            dashboard_id,
            1,
            format!("dash{dashboard_id}"),
            format!("Dashboard {dashboard_id}"),
        ))
        .await?;

    let mut saved = store
        .save_alerts(SaveAlertsCommand {
            dashboard_id,
            org_id: 1,
            user_id: 1,
            alerts: vec![AlertInput::new(1, name)],
        })
        .await?;
    saved
        .pop()
        .ok_or_else(|| Error::internal("seeded rule was not saved"))
}

/// Re-save `rule` with the given channel ids attached
pub async fn attach_channels(store: &MemoryStore, rule: &Alert, channel_ids: &[i64]) -> Result<Alert> {
    let input = AlertInput {
        message: rule.message.clone(),
        frequency: rule.frequency,
        handler: rule.handler,
        severity: rule.severity.clone(),
        settings: rule.settings.clone(),
        notifications: channel_ids.to_vec(),
        ..AlertInput::new(rule.panel_id, rule.name.clone())
    };

    let mut saved = store
        .save_alerts(SaveAlertsCommand {
            dashboard_id: rule.dashboard_id,
            org_id: rule.org_id,
            user_id: 1,
            alerts: vec![input],
        })
        .await?;
    saved
        .pop()
        .ok_or_else(|| Error::internal("rule disappeared while attaching channels"))
}
