//! Microsoft Teams incoming webhooks (MessageCard)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::Result;
use crate::models::{AlertNotification, AlertState};

pub const KIND: &str = "teams";

const OPTIONS: &[NotifierOption] = &[NotifierOption::required("url", "Webhook URL").secret()];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "Microsoft Teams",
        description: "Sends notifications using an incoming webhook connector to Microsoft Teams",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(TeamsNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TeamsSettings {
    url: String,
}

pub struct TeamsNotifier {
    base: NotifierBase,
    url: String,
    sender: Arc<dyn WebhookSender>,
}

impl TeamsNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        let settings: TeamsSettings = super::decode_settings(channel)?;
        Ok(Self {
            base: NotifierBase::new(channel),
            url: super::require_url(KIND, &settings.url)?,
            sender,
        })
    }

    fn card(&self, ctx: &EvalContext) -> Result<MessageCard> {
        let rule_url = ctx.rule_url()?;

        let mut facts: Vec<Fact> = ctx
            .limited_matches()
            .iter()
            .map(|m| Fact {
                name: m.metric.clone(),
                value: m.display_value(),
            })
            .collect();
        if let Some(err) = &ctx.error {
            facts.push(Fact {
                name: "Error message".to_string(),
                value: err.clone(),
            });
        }

        let text = if ctx.state == AlertState::Ok {
            String::new()
        } else {
            ctx.rule.message.clone()
        };

        let mut actions = vec![OpenUri::new("View Rule", rule_url)];
        let mut images = Vec::new();
        if let Some(image) = &ctx.image_public_url {
            images.push(CardImage {
                image: image.clone(),
            });
            actions.push(OpenUri::new("View Graph", image.clone()));
        }

        let title = ctx.notification_title();
        Ok(MessageCard {
            kind: "MessageCard",
            context: "http://schema.org/extensions",
            // Teams rejects cards with an empty summary
            summary: title.clone(),
            title,
            theme_color: ctx.state.color().to_string(),
            sections: vec![Section {
                title: "Details",
                facts,
                images,
                text,
            }],
            potential_action: actions,
        })
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        info!(rule_id = ctx.rule.id, channel = %self.base.name, "Executing teams notification");

        let request = WebhookRequest::post(&self.url).json(&self.card(ctx)?)?;
        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send teams notification"))
    }
}

// MessageCard payload types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageCard {
    #[serde(rename = "@type")]
    kind: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    summary: String,
    title: String,
    theme_color: String,
    sections: Vec<Section>,
    potential_action: Vec<OpenUri>,
}

#[derive(Debug, Serialize)]
struct Section {
    title: &'static str,
    facts: Vec<Fact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<CardImage>,
    text: String,
}

#[derive(Debug, Serialize)]
struct Fact {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct CardImage {
    image: String,
}

#[derive(Debug, Serialize)]
struct OpenUri {
    #[serde(rename = "@context")]
    context: &'static str,
    #[serde(rename = "@type")]
    kind: &'static str,
    name: &'static str,
    targets: Vec<Target>,
}

impl OpenUri {
    fn new(name: &'static str, uri: String) -> Self {
        Self {
            context: "http://schema.org",
            kind: "OpenUri",
            name,
            targets: vec![Target { os: "default", uri }],
        }
    }
}

#[derive(Debug, Serialize)]
struct Target {
    os: &'static str,
    uri: String,
}
