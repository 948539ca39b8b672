//! Alerting pipeline
//!
//! Rules are evaluated by the [`AlertEngine`], their verdict is persisted
//! through the store, and only then does the [`NotificationDispatcher`] fan out
//! to the notifiers built by the [`NotifierRegistry`].

mod context;
mod dispatch;
mod evaluator;
mod notifier;
pub mod notifiers;
mod registry;
mod sender;
mod service;
pub mod test_harness;

pub use context::{EvalContext, EvaluationResult, DEFAULT_MATCH_LIMIT, TEST_RULE_ID};
pub use dispatch::{DispatchReport, NotificationDispatcher};
pub use evaluator::{AlertEngine, ConditionEvaluator, CycleOutcome, ResultHandler};
pub use notifier::{NotificationResult, Notifier, NotifierBase};
pub use registry::{NotifierFactory, NotifierOption, NotifierPlugin, NotifierRegistry};
pub use sender::{HttpWebhookSender, WebhookRequest, WebhookSender};
pub use service::{AlertService, PauseResult};
