//! Threema Gateway basic mode messages

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::{Error, Result};
use crate::models::{AlertNotification, AlertState};

pub const KIND: &str = "threema";

pub const SEND_URL: &str = "https://msgapi.threema.ch/send_simple";

/// Gateway ids are `*` followed by seven uppercase alphanumerics
static GATEWAY_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\*[0-9A-Z]{7}$").expect("valid regex"));

static RECIPIENT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Z]{8}$").expect("valid regex"));

const OPTIONS: &[NotifierOption] = &[
    NotifierOption::required("gateway_id", "Gateway ID"),
    NotifierOption::required("recipient_id", "Recipient ID"),
    NotifierOption::required("api_secret", "API Secret").secret(),
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "Threema Gateway",
        description: "Sends notifications to Threema using the Threema Gateway",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(ThreemaNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThreemaSettings {
    gateway_id: String,
    recipient_id: String,
    api_secret: String,
}

pub struct ThreemaNotifier {
    base: NotifierBase,
    gateway_id: String,
    recipient_id: String,
    api_secret: String,
    sender: Arc<dyn WebhookSender>,
}

impl ThreemaNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        if channel.settings.is_null() {
            return Err(Error::validation("No threema settings supplied"));
        }
        let settings: ThreemaSettings = super::decode_settings(channel)?;

        if settings.gateway_id.is_empty() {
            return Err(Error::validation("Could not find Threema Gateway ID in settings"));
        }
        if !GATEWAY_ID.is_match(&settings.gateway_id) {
            return Err(Error::validation(
                "Invalid Threema Gateway ID: must be '*' followed by 7 characters [0-9A-Z]",
            ));
        }
        if settings.recipient_id.is_empty() {
            return Err(Error::validation("Could not find Threema Recipient ID in settings"));
        }
        if !RECIPIENT_ID.is_match(&settings.recipient_id) {
            return Err(Error::validation(
                "Invalid Threema Recipient ID: must be 8 characters [0-9A-Z]",
            ));
        }
        if settings.api_secret.is_empty() {
            return Err(Error::validation("Could not find Threema API secret in settings"));
        }

        Ok(Self {
            base: NotifierBase::new(channel),
            gateway_id: settings.gateway_id,
            recipient_id: settings.recipient_id,
            api_secret: settings.api_secret,
            sender,
        })
    }

    fn message(&self, ctx: &EvalContext) -> String {
        let emoji = match ctx.state {
            AlertState::Ok => "\u{2705} ",
            AlertState::NoData => "\u{2753} ",
            AlertState::Alerting => "\u{26A0} ",
            _ => "",
        };

        let mut message = format!(
            "{emoji}{}\n\n*State:* {}\n*Message:* {}\n",
            ctx.notification_title(),
            ctx.rule.name,
            ctx.rule.message
        );
        if let Ok(url) = ctx.rule_url() {
            message.push_str(&format!("*URL:* {url}\n"));
        }
        if let Some(image) = &ctx.image_public_url {
            message.push_str(&format!("*Image:* {image}\n"));
        }
        message
    }
}

#[async_trait]
impl Notifier for ThreemaNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        info!(
            rule_id = ctx.rule.id,
            from = %self.gateway_id,
            to = %self.recipient_id,
            "Sending threema notification"
        );

        let text = self.message(ctx);
        let request = WebhookRequest::post(SEND_URL).form(&[
            ("from", self.gateway_id.as_str()),
            ("to", self.recipient_id.as_str()),
            ("secret", self.api_secret.as_str()),
            ("text", text.as_str()),
        ]);

        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send threema notification"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::context::EvaluationResult;
    use crate::alerting::test_harness::{self, RecordingSender};
    use crate::models::ChannelInput;
    use chrono::Utc;
    use rstest::rstest;
    use serde_json::json;

    fn channel(settings: serde_json::Value) -> AlertNotification {
        AlertNotification::from_input(1, ChannelInput::new(KIND, "threema", settings), Utc::now())
    }

    fn build(settings: serde_json::Value) -> Result<ThreemaNotifier> {
        ThreemaNotifier::new(&channel(settings), Arc::new(RecordingSender::new()))
    }

    #[test]
    fn valid_settings() {
        let notifier = build(json!({
            "gateway_id": "*3MAGWID",
            "recipient_id": "ECHOECHO",
            "api_secret": "1234"
        }))
        .unwrap();

        assert_eq!(notifier.gateway_id, "*3MAGWID");
        assert_eq!(notifier.recipient_id, "ECHOECHO");
        assert_eq!(notifier.api_secret, "1234");
    }

    #[rstest]
    #[case::missing_gateway(json!({"recipient_id": "ECHOECHO", "api_secret": "1234"}))]
    #[case::gateway_without_star(json!({"gateway_id": "3MA9GWID", "recipient_id": "ECHOECHO", "api_secret": "1234"}))]
    #[case::gateway_too_short(json!({"gateway_id": "*3MAGWI", "recipient_id": "ECHOECHO", "api_secret": "1234"}))]
    #[case::gateway_lowercase(json!({"gateway_id": "*3magwid", "recipient_id": "ECHOECHO", "api_secret": "1234"}))]
    #[case::recipient_too_long(json!({"gateway_id": "*3MAGWID", "recipient_id": "ECHOECH0A", "api_secret": "1234"}))]
    #[case::missing_secret(json!({"gateway_id": "*3MAGWID", "recipient_id": "ECHOECHO"}))]
    #[case::no_settings(serde_json::Value::Null)]
    fn invalid_settings(#[case] settings: serde_json::Value) {
        assert!(matches!(build(settings), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn sends_form_message() {
        let sender = Arc::new(RecordingSender::new());
        let notifier = ThreemaNotifier::new(
            &channel(json!({"gateway_id": "*3MAGWID", "recipient_id": "ECHOECHO", "api_secret": "1234"})),
            sender.clone(),
        )
        .unwrap();

        let mut ctx = test_harness::context(AlertState::Ok);
        ctx.rule.message = "too hot".into();
        ctx.apply_result(EvaluationResult::alerting(vec![]));
        notifier.send(&ctx).await.unwrap();

        let request = &sender.requests()[0];
        assert_eq!(request.url, SEND_URL);
        let fields: std::collections::HashMap<String, String> =
            url::form_urlencoded::parse(&request.body).into_owned().collect();
        assert_eq!(fields["from"], "*3MAGWID");
        assert_eq!(fields["to"], "ECHOECHO");
        assert_eq!(fields["secret"], "1234");
        assert!(fields["text"].starts_with("\u{26A0} [Alerting] High CPU\n\n*State:* High CPU\n*Message:* too hot\n*URL:* http"));
    }
}
