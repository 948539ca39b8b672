//! Notifier contract and the eligibility rules shared by every channel type

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::models::{AlertNotification, AlertState};

use super::context::EvalContext;

/// Result of sending a notification
#[derive(Debug, Clone, Serialize)]
pub struct NotificationResult {
    pub channel_id: i64,
    pub channel_name: String,
    pub channel_type: String,
    pub success: bool,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Channel settings every notifier carries
#[derive(Debug, Clone, PartialEq)]
pub struct NotifierBase {
    pub id: i64,
    pub org_id: i64,
    pub name: String,
    pub kind: String,
    pub is_default: bool,
    pub send_on_ok: bool,
    pub send_reminder: bool,
    pub frequency: Option<Duration>,
    pub upload_image: bool,
}

impl NotifierBase {
    pub fn new(channel: &AlertNotification) -> Self {
        Self {
            id: channel.id,
            org_id: channel.org_id,
            name: channel.name.clone(),
            kind: channel.kind.clone(),
            is_default: channel.is_default,
            send_on_ok: channel.send_on_ok,
            send_reminder: channel.send_reminder,
            frequency: channel.frequency,
            upload_image: channel.upload_image,
        }
    }

    /// Whether this channel should hear about the cycle in `ctx`.
    ///
    /// `last_sent` is the last successful delivery of this rule through this
    /// channel and only matters for reminders.
    pub fn should_notify(&self, ctx: &EvalContext, last_sent: Option<DateTime<Utc>>) -> bool {
        if matches!(ctx.state, AlertState::Paused | AlertState::Pending) {
            return false;
        }

        if ctx.state_changed() {
            // nobody was told about the rule yet, so there is nothing to resolve
            let fresh = matches!(
                ctx.prev_state,
                AlertState::Unknown | AlertState::Pending | AlertState::Paused
            );
            return !(ctx.state == AlertState::Ok && fresh);
        }

        if !self.send_reminder || ctx.state != AlertState::Alerting {
            return false;
        }

        match (last_sent, self.frequency) {
            (None, _) | (Some(_), None) => true,
            (Some(last), Some(frequency)) => chrono::Duration::from_std(frequency)
                .map(|frequency| ctx.start_time - last >= frequency)
                .unwrap_or(false),
        }
    }

    /// Recovery announcements are only sent when the channel opts in
    pub fn skips_recovery(&self, ctx: &EvalContext) -> bool {
        ctx.state == AlertState::Ok && !self.send_on_ok
    }
}

/// A configured notification channel able to deliver one cycle's outcome
#[async_trait]
pub trait Notifier: Send + Sync {
    fn base(&self) -> &NotifierBase;

    /// Render and deliver the payload unconditionally
    async fn send(&self, ctx: &EvalContext) -> Result<()>;

    /// Deliver unless the channel opted out of recovery announcements
    async fn notify(&self, ctx: &EvalContext) -> Result<()> {
        let base = self.base();
        if base.skips_recovery(ctx) {
            info!(
                rule_id = ctx.rule.id,
                channel = %base.name,
                "Channel does not announce recoveries, skipping"
            );
            return Ok(());
        }
        self.send(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::{Alert, AlertInput, ChannelInput};
    use rstest::rstest;
    use tokio_util::sync::CancellationToken;

    fn base(send_reminder: bool, frequency: Option<Duration>) -> NotifierBase {
        let mut input = ChannelInput::new("webhook", "ops", serde_json::json!({}));
        input.send_reminder = send_reminder;
        input.frequency = frequency;
        NotifierBase::new(&AlertNotification::from_input(1, input, Utc::now()))
    }

    fn ctx(prev: AlertState, state: AlertState) -> EvalContext {
        let mut rule = Alert::from_input(1, 1, AlertInput::new(1, "rule"), Utc::now());
        rule.state = prev;
        let mut ctx = EvalContext::new(rule, AppConfig::default(), CancellationToken::new());
        ctx.state = state;
        ctx
    }

    #[rstest]
    #[case(AlertState::Unknown, AlertState::Alerting, true)]
    #[case(AlertState::Alerting, AlertState::Ok, true)]
    #[case(AlertState::Ok, AlertState::NoData, true)]
    #[case(AlertState::Ok, AlertState::Alerting, true)]
    #[case(AlertState::Unknown, AlertState::Ok, false)]
    #[case(AlertState::Pending, AlertState::Ok, false)]
    #[case(AlertState::Ok, AlertState::Ok, false)]
    #[case(AlertState::Alerting, AlertState::Pending, false)]
    #[case(AlertState::Alerting, AlertState::Paused, false)]
    fn state_changes(#[case] prev: AlertState, #[case] state: AlertState, #[case] expected: bool) {
        assert_eq!(base(false, None).should_notify(&ctx(prev, state), None), expected);
    }

    #[test]
    fn reminders_need_opt_in() {
        let ctx = ctx(AlertState::Alerting, AlertState::Alerting);
        let hour_ago = Some(ctx.start_time - chrono::Duration::hours(1));

        assert!(!base(false, None).should_notify(&ctx, hour_ago));
        assert!(base(true, None).should_notify(&ctx, hour_ago));
    }

    #[test]
    fn reminders_respect_frequency() {
        let ctx = ctx(AlertState::Alerting, AlertState::Alerting);
        let channel = base(true, Some(Duration::from_secs(600)));

        let recent = Some(ctx.start_time - chrono::Duration::minutes(5));
        let stale = Some(ctx.start_time - chrono::Duration::minutes(10));

        assert!(!channel.should_notify(&ctx, recent));
        assert!(channel.should_notify(&ctx, stale));
        assert!(channel.should_notify(&ctx, None));
    }

    #[test]
    fn no_reminders_outside_alerting() {
        let ctx = ctx(AlertState::NoData, AlertState::NoData);
        assert!(!base(true, None).should_notify(&ctx, None));
    }

    #[test]
    fn recovery_skipped_without_send_on_ok() {
        let mut channel = base(false, None);
        channel.send_on_ok = false;

        assert!(channel.skips_recovery(&ctx(AlertState::Alerting, AlertState::Ok)));
        assert!(!channel.skips_recovery(&ctx(AlertState::Ok, AlertState::Alerting)));
    }
}
