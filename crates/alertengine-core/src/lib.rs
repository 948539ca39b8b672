//! # alertengine
//!
//! Alert rule state tracking and notification dispatch.
//!
//! alertengine keeps the lifecycle state of dashboard alert rules, decides when
//! a state change is worth telling someone about, and delivers notifications
//! to chat, paging and webhook channels.
//!
//! ## Architecture
//!
//! - **Store**: rule and channel persistence behind [`db::AlertStore`] and
//!   [`db::NotificationStore`], with an in-memory implementation
//! - **Engine**: periodic evaluation of due rules with bounded parallelism
//! - **Dispatcher**: eligibility checks and concurrent fan-out to notifiers
//! - **Notifiers**: Slack, PagerDuty, Microsoft Teams, Sensu, Threema and
//!   generic webhooks, looked up by type id in a registry
//!
//! ## Quick Start
//!
//! ```bash
//! # List channel types
//! alertengine notifiers
//!
//! # Check a channel configuration
//! alertengine validate --type slack --settings '{"url": "https://hooks.slack.com/services/..."}'
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{
        AlertEngine, AlertService, ConditionEvaluator, EvalContext, EvaluationResult,
        HttpWebhookSender, NotificationDispatcher, Notifier, NotifierRegistry, WebhookSender,
    };
    pub use crate::config::Config;
    pub use crate::db::{AlertStore, MemoryStore, NotificationStore};
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
}
