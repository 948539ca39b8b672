//! Per-cycle evaluation context handed to notifiers

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{Alert, AlertState, Dashboard, EvalMatch};

/// Default cap on eval matches rendered into payloads
pub const DEFAULT_MATCH_LIMIT: usize = 5;

/// Rule id carried by test notifications; stores allocate ids from 1
pub const TEST_RULE_ID: i64 = 0;

/// Outcome of evaluating one rule's condition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvaluationResult {
    pub state: AlertState,
    pub matches: Vec<EvalMatch>,
    pub error: Option<String>,
    pub eval_data: Option<serde_json::Value>,
    pub image_public_url: Option<String>,
    pub image_on_disk_path: Option<PathBuf>,
}

impl EvaluationResult {
    pub fn ok() -> Self {
        Self::with_state(AlertState::Ok)
    }

    pub fn alerting(matches: Vec<EvalMatch>) -> Self {
        Self {
            matches,
            ..Self::with_state(AlertState::Alerting)
        }
    }

    pub fn no_data() -> Self {
        Self::with_state(AlertState::NoData)
    }

    /// A condition that could not be evaluated alerts and carries the error
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::with_state(AlertState::Alerting)
        }
    }

    pub fn with_state(state: AlertState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_image(mut self, public_url: Option<String>, on_disk: Option<PathBuf>) -> Self {
        self.image_public_url = public_url;
        self.image_on_disk_path = on_disk;
        self
    }
}

/// Everything a notifier needs to render one cycle of one rule
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Unique id of this cycle
    pub id: Uuid,
    pub rule: Alert,
    pub dashboard: Option<Dashboard>,
    /// Persisted state before this cycle
    pub prev_state: AlertState,
    /// State computed by this cycle
    pub state: AlertState,
    pub eval_matches: Vec<EvalMatch>,
    pub error: Option<String>,
    pub eval_data: Option<serde_json::Value>,
    pub image_public_url: Option<String>,
    pub image_on_disk_path: Option<PathBuf>,
    pub is_test_run: bool,
    pub app: AppConfig,
    pub match_limit: usize,
    pub start_time: DateTime<Utc>,
    cancel: CancellationToken,
}

impl EvalContext {
    /// Start a cycle for `rule`; the state is carried over until a result is applied
    pub fn new(rule: Alert, app: AppConfig, cancel: CancellationToken) -> Self {
        let state = rule.state;
        Self {
            id: Uuid::new_v4(),
            rule,
            dashboard: None,
            prev_state: state,
            state,
            eval_matches: Vec::new(),
            error: None,
            eval_data: None,
            image_public_url: None,
            image_on_disk_path: None,
            is_test_run: false,
            app,
            match_limit: DEFAULT_MATCH_LIMIT,
            start_time: Utc::now(),
            cancel,
        }
    }

    /// Synthetic alerting context used to exercise a channel before saving it
    pub fn test_run(org_id: i64, app: AppConfig, cancel: CancellationToken) -> Self {
        let now = Utc::now();
        let mut rule = Alert::from_input(
            org_id,
            0,
            crate::models::AlertInput {
                message: "Someone is testing the alert notification within alertengine.".into(),
                ..crate::models::AlertInput::new(0, "Test notification")
            },
            now,
        );
        rule.id = TEST_RULE_ID;

        let mut ctx = Self::new(rule, app, cancel);
        ctx.is_test_run = true;
        ctx.apply_result(EvaluationResult::alerting(vec![
            EvalMatch::new("High value", 100.0),
            EvalMatch::new("Higher Value", 200.0),
        ]));
        ctx
    }

    #[must_use]
    pub fn with_dashboard(mut self, dashboard: Dashboard) -> Self {
        self.dashboard = Some(dashboard);
        self
    }

    #[must_use]
    pub fn with_match_limit(mut self, limit: usize) -> Self {
        self.match_limit = limit.max(1);
        self
    }

    pub fn apply_result(&mut self, result: EvaluationResult) {
        self.state = result.state;
        self.eval_matches = result.matches;
        self.error = result.error;
        self.eval_data = result.eval_data;
        self.image_public_url = result.image_public_url;
        self.image_on_disk_path = result.image_on_disk_path;
    }

    pub fn state_changed(&self) -> bool {
        self.prev_state != self.state
    }

    /// `[<state title>] <rule name>`
    pub fn notification_title(&self) -> String {
        format!("[{}] {}", self.state.title(), self.rule.name)
    }

    /// Deep link back to the rule's panel, or the root URL for test runs
    pub fn rule_url(&self) -> Result<String> {
        if self.is_test_run {
            return Ok(self.app.root_url.clone());
        }

        let dashboard = self
            .dashboard
            .as_ref()
            .ok_or_else(|| Error::not_found("dashboard", self.rule.dashboard_id))?;

        let mut root = self.app.root_url.clone();
        if !root.ends_with('/') {
            root.push('/');
        }
        let base = url::Url::parse(&root)
            .map_err(|e| Error::config(format!("invalid root_url '{root}': {e}")))?;
        let mut link = base
            .join(&format!("d/{}/{}", dashboard.uid, dashboard.slug))
            .map_err(|e| Error::internal(format!("could not build rule url: {e}")))?;
        link.set_query(Some(&format!(
            "fullscreen&edit&tab=alert&panelId={}&orgId={}",
            self.rule.panel_id, self.rule.org_id
        )));

        Ok(link.into())
    }

    /// Matches capped at the configured limit
    pub fn limited_matches(&self) -> &[EvalMatch] {
        let end = self.eval_matches.len().min(self.match_limit);
        &self.eval_matches[..end]
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertInput;
    use pretty_assertions::assert_eq;

    fn rule(state: AlertState) -> Alert {
        let mut rule = Alert::from_input(1, 7, AlertInput::new(3, "CPU high"), Utc::now());
        rule.id = 42;
        rule.state = state;
        rule
    }

    fn app(root_url: &str) -> AppConfig {
        AppConfig {
            root_url: root_url.to_string(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn rule_url_links_to_panel() {
        let ctx = EvalContext::new(
            rule(AlertState::Ok),
            app("http://grafana.local/sub"),
            CancellationToken::new(),
        )
        .with_dashboard(Dashboard::new(7, 1, "abc123", "Prod Overview"));

        assert_eq!(
            ctx.rule_url().unwrap(),
            "http://grafana.local/sub/d/abc123/prod-overview?fullscreen&edit&tab=alert&panelId=3&orgId=1"
        );
    }

    #[test]
    fn rule_url_needs_dashboard() {
        let ctx = EvalContext::new(rule(AlertState::Ok), app("http://x/"), CancellationToken::new());
        assert!(matches!(ctx.rule_url(), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_run_uses_root_url() {
        let ctx = EvalContext::test_run(1, app("http://x/"), CancellationToken::new());

        assert!(ctx.is_test_run);
        assert_eq!(ctx.state, AlertState::Alerting);
        assert_eq!(ctx.eval_matches.len(), 2);
        assert_eq!(ctx.rule_url().unwrap(), "http://x/");
        assert_eq!(ctx.notification_title(), "[Alerting] Test notification");
    }

    #[test]
    fn matches_are_capped() {
        let mut ctx = EvalContext::new(rule(AlertState::Ok), app("http://x/"), CancellationToken::new())
            .with_match_limit(2);
        ctx.apply_result(EvaluationResult::alerting(
            (0..4).map(|i| EvalMatch::new(format!("m{i}"), i as f64)).collect(),
        ));

        let names: Vec<_> = ctx.limited_matches().iter().map(|m| m.metric.as_str()).collect();
        assert_eq!(names, vec!["m0", "m1"]);
        assert!(ctx.state_changed());
    }

    #[test]
    fn failed_evaluation_alerts_with_error() {
        let result = EvaluationResult::failed("query timed out");
        assert_eq!(result.state, AlertState::Alerting);
        assert_eq!(result.error.as_deref(), Some("query timed out"));
    }
}
