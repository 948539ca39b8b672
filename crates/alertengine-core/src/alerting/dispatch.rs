//! Fan-out of one evaluation cycle to the rule's channels

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::db::NotificationStore;
use crate::error::{Error, Result};
use crate::models::AlertNotification;

use super::context::EvalContext;
use super::notifier::{NotificationResult, Notifier};
use super::registry::NotifierRegistry;

/// Outcome of one fan-out
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub results: Vec<NotificationResult>,
}

impl DispatchReport {
    /// Number of notifiers invoked
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NotificationResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

/// Resolves channels, applies eligibility and invokes notifiers concurrently
pub struct NotificationDispatcher {
    registry: Arc<NotifierRegistry>,
    channels: Arc<dyn NotificationStore>,
    timeout: Duration,
    /// Last successful delivery per rule id, then channel id
    journal: DashMap<i64, HashMap<i64, DateTime<Utc>>>,
}

impl NotificationDispatcher {
    pub fn new(
        registry: Arc<NotifierRegistry>,
        channels: Arc<dyn NotificationStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            channels,
            timeout,
            journal: DashMap::new(),
        }
    }

    /// Last successful delivery of `rule_id` through `channel_id`
    pub fn last_sent(&self, rule_id: i64, channel_id: i64) -> Option<DateTime<Utc>> {
        self.journal
            .get(&rule_id)
            .and_then(|sent| sent.get(&channel_id).copied())
    }

    /// Drop reminder history of rules not in `live`
    pub fn retain_rules(&self, live: &HashSet<i64>) {
        self.journal.retain(|rule_id, _| live.contains(rule_id));
    }

    /// Drop reminder history of channels no longer attached to `rule_id`
    fn retain_channels(&self, rule_id: i64, channels: &[AlertNotification]) {
        if let Some(mut sent) = self.journal.get_mut(&rule_id) {
            sent.retain(|channel_id, _| channels.iter().any(|c| c.id == *channel_id));
        }
    }

    /// Notify every eligible channel of the rule in `ctx`.
    ///
    /// Channel failures are reported in the returned [`DispatchReport`]; only a
    /// failure to resolve the channel list is returned as an error.
    pub async fn dispatch(&self, ctx: &EvalContext) -> Result<DispatchReport> {
        let channels = self
            .channels
            .notifications_for_alert(ctx.rule.org_id, &ctx.rule.notifications)
            .await?;
        self.retain_channels(ctx.rule.id, &channels);

        let mut eligible: Vec<(AlertNotification, Box<dyn Notifier>)> = Vec::new();
        for channel in channels.into_iter().filter(|c| c.enabled) {
            let notifier = match self.registry.build(&channel) {
                Ok(notifier) => notifier,
                Err(e) => {
                    warn!(
                        rule_id = ctx.rule.id,
                        channel_id = channel.id,
                        error = %e,
                        "Could not build notifier, skipping channel"
                    );
                    continue;
                }
            };

            if notifier
                .base()
                .should_notify(ctx, self.last_sent(ctx.rule.id, channel.id))
            {
                eligible.push((channel, notifier));
            }
        }

        if eligible.is_empty() {
            debug!(rule_id = ctx.rule.id, state = %ctx.state, "No channels to notify");
            return Ok(DispatchReport::default());
        }

        debug!(
            rule_id = ctx.rule.id,
            count = eligible.len(),
            "Sending notifications"
        );

        let results = join_all(
            eligible
                .iter()
                .map(|(channel, notifier)| self.invoke(ctx, channel, notifier.as_ref())),
        )
        .await;

        Ok(DispatchReport { results })
    }

    async fn invoke(
        &self,
        ctx: &EvalContext,
        channel: &AlertNotification,
        notifier: &dyn Notifier,
    ) -> NotificationResult {
        let sent_at = Utc::now();

        let outcome = match tokio::time::timeout(self.timeout, notifier.notify(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::delivery(
                channel.name.clone(),
                format!("timed out after {:?}", self.timeout),
            )),
        };

        let result = match &outcome {
            Ok(()) => "success",
            Err(_) => "failure",
        };
        metrics::counter!(
            "alerting_notifications_sent_total",
            "type" => channel.kind.clone(),
            "result" => result
        )
        .increment(1);

        match outcome {
            Ok(()) => {
                self.journal
                    .entry(ctx.rule.id)
                    .or_default()
                    .insert(channel.id, sent_at);
                info!(
                    rule_id = ctx.rule.id,
                    channel_id = channel.id,
                    channel = %channel.name,
                    state = %ctx.state,
                    "Notification sent"
                );
                NotificationResult {
                    channel_id: channel.id,
                    channel_name: channel.name.clone(),
                    channel_type: channel.kind.clone(),
                    success: true,
                    error: None,
                    sent_at,
                }
            }
            Err(e) => {
                error!(
                    rule_id = ctx.rule.id,
                    channel_id = channel.id,
                    channel = %channel.name,
                    error = %e,
                    "Notification failed"
                );
                NotificationResult {
                    channel_id: channel.id,
                    channel_name: channel.name.clone(),
                    channel_type: channel.kind.clone(),
                    success: false,
                    error: Some(e.to_string()),
                    sent_at,
                }
            }
        }
    }
}
