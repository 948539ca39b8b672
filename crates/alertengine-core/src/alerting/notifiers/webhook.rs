//! Generic JSON webhook

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::{Error, Result};
use crate::models::{AlertNotification, AlertState, EvalMatch};

use super::non_empty;

pub const KIND: &str = "webhook";

const OPTIONS: &[NotifierOption] = &[
    NotifierOption::required("url", "Url"),
    NotifierOption::optional("httpMethod", "Http Method"),
    NotifierOption::optional("username", "Username"),
    NotifierOption::optional("password", "Password").secret(),
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "webhook",
        description: "Sends HTTP POST request to a URL",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(WebhookNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebhookSettings {
    url: String,
    #[serde(rename = "httpMethod")]
    http_method: String,
    username: String,
    password: String,
}

pub struct WebhookNotifier {
    base: NotifierBase,
    url: String,
    method: Method,
    username: Option<String>,
    password: String,
    sender: Arc<dyn WebhookSender>,
}

impl WebhookNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        let settings: WebhookSettings = super::decode_settings(channel)?;
        let url = super::require_url(KIND, &settings.url)?;

        let method = match settings.http_method.trim().to_ascii_uppercase().as_str() {
            "" | "POST" => Method::POST,
            "PUT" => Method::PUT,
            other => {
                return Err(Error::validation(format!(
                    "Unsupported webhook http method '{other}', expected POST or PUT"
                )))
            }
        };

        Ok(Self {
            base: NotifierBase::new(channel),
            url,
            method,
            username: non_empty(&settings.username),
            password: settings.password,
            sender,
        })
    }

    fn payload<'a>(&self, ctx: &'a EvalContext) -> WebhookPayload<'a> {
        WebhookPayload {
            title: ctx.notification_title(),
            rule_id: ctx.rule.id,
            rule_name: &ctx.rule.name,
            state: ctx.state,
            eval_matches: ctx.limited_matches(),
            rule_url: ctx.rule_url().ok(),
            image_url: ctx.image_public_url.as_deref(),
            message: non_empty(&ctx.rule.message),
            error: ctx.error.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        info!(rule_id = ctx.rule.id, channel = %self.base.name, "Sending webhook");

        let mut request = WebhookRequest::new(self.method.clone(), &self.url).json(&self.payload(ctx))?;
        if let Some(username) = &self.username {
            request = request.basic_auth(username, &self.password);
        }

        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send webhook"))
    }
}

// Generic webhook payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    title: String,
    rule_id: i64,
    rule_name: &'a str,
    state: AlertState,
    eval_matches: &'a [EvalMatch],
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}
