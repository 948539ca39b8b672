//! Slack incoming webhooks, with optional image upload through the files API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::alerting::context::EvalContext;
use crate::alerting::notifier::{Notifier, NotifierBase};
use crate::alerting::registry::{NotifierOption, NotifierPlugin};
use crate::alerting::sender::{WebhookRequest, WebhookSender};
use crate::error::Result;
use crate::models::{AlertNotification, AlertState};

use super::{decode_settings, non_empty, require_url};

pub const KIND: &str = "slack";

/// Slack files API endpoint used for image uploads
pub const FILE_UPLOAD_URL: &str = "https://slack.com/api/files.upload";

const FOOTER_ICON: &str = "https://raw.githubusercontent.com/alertengine/alertengine/main/assets/icon-32.png";

const OPTIONS: &[NotifierOption] = &[
    NotifierOption::required("url", "Webhook URL").secret(),
    NotifierOption::optional("recipient", "Recipient"),
    NotifierOption::optional("username", "Username"),
    NotifierOption::optional("icon_emoji", "Icon emoji"),
    NotifierOption::optional("icon_url", "Icon URL"),
    NotifierOption::optional("mention", "Mention"),
    NotifierOption::optional("token", "Token").secret(),
    NotifierOption::optional("uploadImage", "Upload image"),
];

pub fn plugin() -> NotifierPlugin {
    NotifierPlugin {
        kind: KIND,
        name: "Slack",
        description: "Sends notifications to a Slack incoming webhook",
        options: OPTIONS,
        factory: build,
    }
}

fn build(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>> {
    Ok(Box::new(SlackNotifier::new(channel, sender)?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SlackSettings {
    url: String,
    recipient: String,
    username: String,
    icon_emoji: String,
    icon_url: String,
    mention: String,
    token: String,
    #[serde(rename = "uploadImage")]
    upload_image: Option<bool>,
}

pub struct SlackNotifier {
    base: NotifierBase,
    url: String,
    recipient: Option<String>,
    username: Option<String>,
    icon_emoji: Option<String>,
    icon_url: Option<String>,
    mention: Option<String>,
    token: Option<String>,
    upload: bool,
    sender: Arc<dyn WebhookSender>,
}

impl SlackNotifier {
    pub fn new(channel: &AlertNotification, sender: Arc<dyn WebhookSender>) -> Result<Self> {
        let settings: SlackSettings = decode_settings(channel)?;
        let url = require_url(KIND, &settings.url)?;

        Ok(Self {
            base: NotifierBase::new(channel),
            url,
            recipient: non_empty(&settings.recipient),
            username: non_empty(&settings.username),
            icon_emoji: non_empty(&settings.icon_emoji),
            icon_url: non_empty(&settings.icon_url),
            mention: non_empty(&settings.mention),
            token: non_empty(&settings.token),
            upload: settings.upload_image.unwrap_or(true),
            sender,
        })
    }

    /// The files API is used only with a bot token and both upload switches on
    fn uploads_images(&self) -> bool {
        self.token.is_some() && self.upload && self.base.upload_image
    }

    fn payload(&self, ctx: &EvalContext) -> Result<SlackPayload> {
        let rule_url = ctx.rule_url()?;

        let mut fields: Vec<SlackField> = ctx
            .limited_matches()
            .iter()
            .map(|m| SlackField {
                title: m.metric.clone(),
                value: m.display_value(),
                short: true,
            })
            .collect();
        if let Some(err) = &ctx.error {
            fields.push(SlackField {
                title: "Error message".to_string(),
                value: err.clone(),
                short: false,
            });
        }

        let mut text = self.mention.clone().unwrap_or_default();
        if ctx.state != AlertState::Ok && !ctx.rule.message.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&ctx.rule.message);
        }

        // with a token the image goes through the files API instead
        let image_url = if self.token.is_none() {
            ctx.image_public_url.clone()
        } else {
            None
        };

        let title = ctx.notification_title();
        Ok(SlackPayload {
            channel: self.recipient.clone(),
            username: self.username.clone(),
            icon_emoji: self.icon_emoji.clone(),
            icon_url: self.icon_url.clone(),
            attachments: vec![SlackAttachment {
                fallback: title.clone(),
                color: ctx.state.color().to_string(),
                title,
                title_link: rule_url,
                text,
                fields,
                image_url,
                footer: format!("alertengine v{}", ctx.app.build_version),
                footer_icon: FOOTER_ICON.to_string(),
                ts: ctx.start_time.timestamp(),
            }],
            parse: "full",
        })
    }

    async fn upload_image(&self, ctx: &EvalContext, path: &Path, token: &str) -> Result<()> {
        info!(rule_id = ctx.rule.id, path = %path.display(), "Uploading image to Slack");

        let file = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".to_string());
        let boundary = format!("alertengine-{}", uuid::Uuid::new_v4().simple());
        let recipient = self.recipient.as_deref().unwrap_or_default();

        let request = WebhookRequest::post(FILE_UPLOAD_URL)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("Authorization", format!("auth_token=\"{token}\""))
            .body(multipart_body(&boundary, &file_name, &file, token, recipient));

        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to upload Slack image"))
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn base(&self) -> &NotifierBase {
        &self.base
    }

    async fn send(&self, ctx: &EvalContext) -> Result<()> {
        info!(rule_id = ctx.rule.id, channel = %self.base.name, "Executing slack notification");

        let payload = self.payload(ctx)?;
        let request = WebhookRequest::post(&self.url).json(&payload)?;
        self.sender
            .send(request, ctx.cancellation())
            .await
            .inspect_err(|e| error!(error = %e, channel = %self.base.name, "Failed to send slack notification"))?;

        if self.uploads_images() {
            if let (Some(path), Some(token)) = (&ctx.image_on_disk_path, &self.token) {
                self.upload_image(ctx, path, token).await?;
            }
        }

        Ok(())
    }
}

/// `multipart/form-data` body with the image plus `token` and `channels` fields
fn multipart_body(boundary: &str, file_name: &str, file: &[u8], token: &str, channels: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(file.len() + 512);
    let file_name = quoted_safe(file_name);

    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(file);
    body.extend_from_slice(b"\r\n");

    for (name, value) in [("token", token), ("channels", channels)] {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
        );
    }

    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

/// Replace characters that would end a quoted header parameter or the header line
fn quoted_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect()
}

// Slack payload types
#[derive(Debug, Serialize)]
struct SlackPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<String>,
    attachments: Vec<SlackAttachment>,
    parse: &'static str,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    title: String,
    title_link: String,
    text: String,
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    footer: String,
    footer_icon: String,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}
