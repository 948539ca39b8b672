//! Built-in channel types

pub mod pagerduty;
pub mod sensu;
pub mod slack;
pub mod teams;
pub mod threema;
pub mod webhook;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::models::AlertNotification;

use super::registry::NotifierRegistry;

/// Register every built-in channel type
pub fn register_builtin(registry: &mut NotifierRegistry) {
    registry.register(slack::plugin());
    registry.register(pagerduty::plugin());
    registry.register(teams::plugin());
    registry.register(webhook::plugin());
    registry.register(sensu::plugin());
    registry.register(threema::plugin());
}

/// Decode the free-form settings of a channel into its typed form
pub(crate) fn decode_settings<T: DeserializeOwned>(channel: &AlertNotification) -> Result<T> {
    let settings = if channel.settings.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        channel.settings.clone()
    };

    serde_json::from_value(settings)
        .map_err(|e| Error::validation(format!("Invalid {} settings: {e}", channel.kind)))
}

/// A required, parseable URL setting
pub(crate) fn require_url(kind: &str, url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::validation(format!(
            "Could not find url property in {kind} settings"
        )));
    }
    url::Url::parse(url)
        .map_err(|e| Error::validation(format!("Invalid {kind} url '{url}': {e}")))?;
    Ok(url.to_string())
}

/// Empty strings count as unset
pub(crate) fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_must_be_present_and_valid() {
        assert!(require_url("webhook", "").is_err());
        assert!(require_url("webhook", "   ").is_err());
        assert!(require_url("webhook", "no scheme").is_err());
        assert_eq!(
            require_url("webhook", " http://example.com/hook ").unwrap(),
            "http://example.com/hook"
        );
    }

    #[test]
    fn blank_strings_are_unset() {
        assert_eq!(non_empty("  "), None);
        assert_eq!(non_empty(" #ops "), Some("#ops".to_string()));
    }
}
