//! Sensu check results posted to the Sensu API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::Result;
use crate::models::{AlertNotification, AlertState, EvalMatch};

use super::non_empty;

pub const KIND: &str = "sensu";

const DEFAULT_OUTPUT: &str = "alertengine metric condition met";

const OPTIONS: &[NotifierOption] = &[
    NotifierOption::required("url", "Url"),
    NotifierOption::optional("source", "Source"),
    NotifierOption::optional("handler", "Handler"),
    NotifierOption::optional("username", "Username"),
    NotifierOption::optional("password", "Password").secret(),
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "Sensu",
        description: "Sends HTTP POST request to a Sensu API",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(SensuNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SensuSettings {
    url: String,
    source: String,
    handler: String,
    username: String,
    password: String,
}

pub struct SensuNotifier {
    base: NotifierBase,
    url: String,
    source: Option<String>,
    handler: Option<String>,
    username: Option<String>,
    password: String,
    sender: Arc<dyn WebhookSender>,
}

impl SensuNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        let settings: SensuSettings = super::decode_settings(channel)?;
        Ok(Self {
            base: NotifierBase::new(channel),
            url: super::require_url(KIND, &settings.url)?,
            source: non_empty(&settings.source),
            handler: non_empty(&settings.handler),
            username: non_empty(&settings.username),
            password: settings.password,
            sender,
        })
    }

    fn check_result<'a>(&self, ctx: &'a EvalContext) -> SensuCheckResult<'a> {
        let status = match ctx.state {
            AlertState::Alerting => 2,
            AlertState::NoData => 1,
            _ => 0,
        };

        SensuCheckResult {
            rule_id: ctx.rule.id,
            // Sensu check names cannot contain spaces
            name: ctx.rule.name.replace(' ', "_"),
            source: self
                .source
                .clone()
                .unwrap_or_else(|| format!("alertengine_rule_{}", ctx.rule.id)),
            output: non_empty(&ctx.rule.message).unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
            eval_matches: ctx.limited_matches(),
            status,
            handler: self.handler.clone(),
            rule_url: ctx.rule_url().ok(),
            image_url: ctx.image_public_url.clone(),
        }
    }
}

#[async_trait]
impl Notifier for SensuNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        info!(rule_id = ctx.rule.id, channel = %self.base.name, "Sending sensu result");

        let mut request = WebhookRequest::post(&self.url).json(&self.check_result(ctx))?;
        if let Some(username) = &self.username {
            request = request.basic_auth(username, &self.password);
        }

        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send sensu event"))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SensuCheckResult<'a> {
    rule_id: i64,
    name: String,
    source: String,
    output: String,
    eval_matches: &'a [EvalMatch],
    status: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
}
