//! Notifier plugin registry

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::AlertNotification;

use super::notifier::Notifier;
use super::notifiers;
use super::sender::WebhookSender;

/// Builds a notifier from a stored channel, validating its settings
pub type NotifierFactory =
    fn(&AlertNotification, Arc<dyn WebhookSender>) -> Result<Box<dyn Notifier>>;

/// One settings field shown on the channel form
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NotifierOption {
    pub key: &'static str,
    pub label: &'static str,
    pub required: bool,
    /// Value must not be echoed back to clients
    pub secure: bool,
}

impl NotifierOption {
    pub const fn required(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: true,
            secure: false,
        }
    }

    pub const fn optional(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            required: false,
            secure: false,
        }
    }

    pub const fn secret(self) -> Self {
        Self {
            secure: true,
            ..self
        }
    }
}

/// A registered channel type
#[derive(Clone, Serialize)]
pub struct NotifierPlugin {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub options: &'static [NotifierOption],
    #[serde(skip)]
    pub factory: NotifierFactory,
}

impl std::fmt::Debug for NotifierPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierPlugin")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps channel type identifiers to factories
pub struct NotifierRegistry {
    plugins: BTreeMap<&'static str, NotifierPlugin>,
    sender: Arc<dyn WebhookSender>,
}

impl NotifierRegistry {
    /// Empty registry whose notifiers deliver through `sender`
    pub fn new(sender: Arc<dyn WebhookSender>) -> Self {
        Self {
            plugins: BTreeMap::new(),
            sender,
        }
    }

    /// Registry with every built-in channel type
    pub fn with_builtin(sender: Arc<dyn WebhookSender>) -> Self {
        let mut registry = Self::new(sender);
        notifiers::register_builtin(&mut registry);
        registry
    }

    /// Register a channel type, replacing and returning any previous one with the same id
    pub fn register(&mut self, plugin: NotifierPlugin) -> Option<NotifierPlugin> {
        debug!(kind = plugin.kind, "Registering notifier");
        let previous = self.plugins.insert(plugin.kind, plugin);
        if let Some(previous) = &previous {
            warn!(kind = previous.kind, "Notifier type registered twice, keeping the latest");
        }
        previous
    }

    pub fn get(&self, kind: &str) -> Option<&NotifierPlugin> {
        self.plugins.get(kind)
    }

    /// Registered plugins ordered by type id
    pub fn plugins(&self) -> impl Iterator<Item = &NotifierPlugin> {
        self.plugins.values()
    }

    /// Instantiate the notifier for a stored channel
    pub fn build(&self, channel: &AlertNotification) -> Result<Box<dyn Notifier>> {
        let plugin = self.get(&channel.kind).ok_or_else(|| {
            Error::validation(format!("Unsupported notification type '{}'", channel.kind))
        })?;

        (plugin.factory)(channel, Arc::clone(&self.sender))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::test_harness::RecordingSender;
    use crate::models::ChannelInput;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn registry() -> NotifierRegistry {
        NotifierRegistry::with_builtin(Arc::new(RecordingSender::new()))
    }

    #[test]
    fn builtin_types_are_registered() {
        let kinds: Vec<_> = registry().plugins().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec!["pagerduty", "sensu", "slack", "teams", "threema", "webhook"]
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let channel = AlertNotification::from_input(
            1,
            ChannelInput::new("carrier-pigeon", "coo", serde_json::json!({})),
            Utc::now(),
        );

        let err = registry().build(&channel).err().unwrap();
        assert!(matches!(err, Error::Validation(msg) if msg.contains("carrier-pigeon")));
    }

    #[test]
    fn build_validates_settings() {
        let channel = AlertNotification::from_input(
            1,
            ChannelInput::new("slack", "ops", serde_json::json!({})),
            Utc::now(),
        );

        assert!(matches!(registry().build(&channel), Err(Error::Validation(_))));
    }

    #[test]
    fn re_registering_replaces() {
        let mut registry = registry();
        let mut plugin = registry.get("webhook").cloned().unwrap();
        plugin.name = "Custom webhook";

        let previous = registry.register(plugin).unwrap();

        assert_eq!(previous.name, "webhook");
        assert_eq!(registry.get("webhook").unwrap().name, "Custom webhook");
    }
}
