//! PagerDuty Events API v2

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::{Error, Result};
use crate::models::{AlertNotification, AlertState};

use super::non_empty;

pub const KIND: &str = "pagerduty";

pub const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

const OPTIONS: &[NotifierOption] = &[
    NotifierOption::required("integrationKey", "Integration key").secret(),
    NotifierOption::optional("autoResolve", "Auto resolve incidents"),
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "PagerDuty",
        description: "Sends notifications to PagerDuty",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(PagerDutyNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PagerDutySettings {
    #[serde(rename = "integrationKey")]
    integration_key: String,
    #[serde(rename = "autoResolve")]
    auto_resolve: Option<bool>,
}

pub struct PagerDutyNotifier {
    base: NotifierBase,
    key: String,
    sender: Arc<dyn WebhookSender>,
}

impl PagerDutyNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        let settings: PagerDutySettings = super::decode_settings(channel)?;
        let key = non_empty(&settings.integration_key).ok_or_else(|| {
            Error::validation("Could not find integration key property in pagerduty settings")
        })?;

        let mut base = NotifierBase::new(channel);
        // auto resolve decides whether recoveries are sent as resolve events
        if let Some(auto_resolve) = settings.auto_resolve {
            base.send_on_ok = auto_resolve;
        }

        Ok(Self { base, key, sender })
    }

    fn payload(&self, ctx: &EvalContext) -> Result<PagerDutyPayload> {
        let rule_url = ctx.rule_url()?;

        let event_action = if ctx.state == AlertState::Ok {
            "resolve"
        } else {
            "trigger"
        };

        let mut custom_details = String::from("Triggered metrics:\n\n");
        for m in ctx.limited_matches() {
            custom_details.push_str(&format!("{}: {}\n", m.metric, m.display_value()));
        }

        let images = ctx
            .image_public_url
            .clone()
            .map(|src| vec![PagerDutyImage { src }])
            .unwrap_or_default();

        Ok(PagerDutyPayload {
            routing_key: self.key.clone(),
            event_action,
            dedup_key: format!("alertId-{}", ctx.rule.id),
            payload: PagerDutyEventPayload {
                summary: format!("{} - {}", ctx.rule.name, ctx.rule.message),
                source: source_host(),
                severity: "critical",
                timestamp: ctx.start_time.to_rfc3339(),
                component: "alertengine",
                custom_details,
            },
            client: "alertengine",
            client_url: rule_url.clone(),
            links: vec![PagerDutyLink { href: rule_url }],
            images,
        })
    }
}

/// Host name reported as the event source
fn source_host() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .and_then(|h| non_empty(&h))
        .unwrap_or_else(|| "alertengine".to_string())
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        let payload = self.payload(ctx)?;
        info!(
            rule_id = ctx.rule.id,
            event_action = payload.event_action,
            "Notifying PagerDuty"
        );

        let request = WebhookRequest::post(EVENTS_URL).json(&payload)?;
        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send PagerDuty event"))
    }
}

// PagerDuty payload types
#[derive(Debug, Serialize)]
struct PagerDutyPayload {
    routing_key: String,
    event_action: &'static str,
    dedup_key: String,
    payload: PagerDutyEventPayload,
    client: &'static str,
    client_url: String,
    links: Vec<PagerDutyLink>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<PagerDutyImage>,
}

#[derive(Debug, Serialize)]
struct PagerDutyEventPayload {
    summary: String,
    source: String,
    severity: &'static str,
    timestamp: String,
    component: &'static str,
    custom_details: String,
}

#[derive(Debug, Serialize)]
struct PagerDutyLink {
    href: String,
}

#[derive(Debug, Serialize)]
struct PagerDutyImage {
    src: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::context::EvaluationResult;
    use crate::alerting::test_harness::{self, RecordingSender};
    use crate::models::{ChannelInput, EvalMatch};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn channel(settings: serde_json::Value) -> AlertNotification {
        AlertNotification::from_input(1, ChannelInput::new(KIND, "pager", settings), Utc::now())
    }

    #[test]
    fn integration_key_is_required() {
        let err = PagerDutyNotifier::new(&channel(json!({})), Arc::new(RecordingSender::new()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn auto_resolve_overrides_send_on_ok() {
        let sender = Arc::new(RecordingSender::new());

        let off = PagerDutyNotifier::new(
            &channel(json!({"integrationKey": "abcdefgh0123456789", "autoResolve": false})),
            sender.clone(),
        )
        .unwrap();
        assert!(!off.base.send_on_ok);

        let default = PagerDutyNotifier::new(&channel(json!({"integrationKey": "abc"})), sender).unwrap();
        assert!(default.base.send_on_ok);
    }

    #[tokio::test]
    async fn trigger_event() {
        let sender = Arc::new(RecordingSender::new());
        let notifier =
            PagerDutyNotifier::new(&channel(json!({"integrationKey": "key-1"})), sender.clone()).unwrap();

        let mut ctx = test_harness::context(AlertState::Ok);
        ctx.rule.message = "cpu above 90%".into();
        ctx.apply_result(
            EvaluationResult::alerting(vec![EvalMatch::new("cpu", 93.0)])
                .with_image(Some("http://img/cpu.png".into()), None),
        );

        notifier.notify(&ctx).await.unwrap();

        let requests = sender.requests();
        assert_eq!(requests[0].url, EVENTS_URL);
        let body = requests[0].json_body().unwrap();
        assert_eq!(body["routing_key"], "key-1");
        assert_eq!(body["event_action"], "trigger");
        assert_eq!(body["dedup_key"], format!("alertId-{}", ctx.rule.id));
        assert_eq!(body["payload"]["summary"], "High CPU - cpu above 90%");
        assert_eq!(body["payload"]["severity"], "critical");
        assert_eq!(body["payload"]["custom_details"], "Triggered metrics:\n\ncpu: 93\n");
        assert_eq!(body["images"], json!([{"src": "http://img/cpu.png"}]));
        assert_eq!(body["links"][0]["href"], body["client_url"]);
    }

    #[tokio::test]
    async fn resolve_event_unless_auto_resolve_disabled() {
        let sender = Arc::new(RecordingSender::new());
        let resolving =
            PagerDutyNotifier::new(&channel(json!({"integrationKey": "key-1"})), sender.clone()).unwrap();
        let silent = PagerDutyNotifier::new(
            &channel(json!({"integrationKey": "key-2", "autoResolve": false})),
            sender.clone(),
        )
        .unwrap();

        let mut ctx = test_harness::context(AlertState::Alerting);
        ctx.apply_result(EvaluationResult::ok());

        resolving.notify(&ctx).await.unwrap();
        silent.notify(&ctx).await.unwrap();

        let requests = sender.requests();
        assert_eq!(requests.len(), 1);
        let body = requests[0].json_body().unwrap();
        assert_eq!(body["event_action"], "resolve");
        assert!(body.get("images").is_none());
    }
}
