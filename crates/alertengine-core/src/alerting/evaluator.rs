//! Alert rule evaluation engine

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AlertingConfig, AppConfig, Config};
use crate::db::AlertStore;
use crate::error::{Error, Result};
use crate::models::{Alert, SetAlertStateCommand};

use super::context::{EvalContext, EvaluationResult};
use super::dispatch::{DispatchReport, NotificationDispatcher};

/// Computes the state of a rule's condition
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluate `rule`; failures are reported through [`EvaluationResult::error`]
    async fn evaluate(&self, rule: &Alert, cancel: &CancellationToken) -> EvaluationResult;
}

/// What happened to one rule's cycle
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// State persisted and notifications dispatched
    Committed(DispatchReport),
    /// Rule was paused before the verdict could be stored
    Paused,
}

/// Persists a cycle's verdict, then fans out notifications
pub struct ResultHandler {
    store: Arc<dyn AlertStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ResultHandler {
    pub fn new(store: Arc<dyn AlertStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Nothing is sent unless the state write succeeds.
    ///
    /// `ctx.prev_state` is replaced by the state the write overwrote.
    pub async fn handle(&self, ctx: &mut EvalContext) -> Result<CycleOutcome> {
        let cmd = SetAlertStateCommand {
            alert_id: ctx.rule.id,
            state: ctx.state,
            error: ctx.error.clone(),
            eval_data: ctx.eval_data.clone(),
        };

        let update = match self.store.set_alert_state(cmd).await {
            Ok(update) => update,
            Err(e) if e.is_paused() => {
                info!(rule_id = ctx.rule.id, "Rule paused during evaluation, dropping result");
                return Ok(CycleOutcome::Paused);
            }
            Err(e) => {
                error!(rule_id = ctx.rule.id, error = %e, "Failed to save alert state");
                return Err(e);
            }
        };

        if update.previous != ctx.prev_state {
            debug!(
                rule_id = ctx.rule.id,
                listed = %ctx.prev_state,
                stored = %update.previous,
                "Rule state moved since it was scheduled"
            );
            ctx.prev_state = update.previous;
        }

        if update.changed() {
            metrics::counter!("alerting_state_transitions_total", "state" => ctx.state.as_str())
                .increment(1);
            info!(
                rule_id = ctx.rule.id,
                from = %ctx.prev_state,
                to = %ctx.state,
                "Alert state changed"
            );
        }

        let report = self.dispatcher.dispatch(ctx).await?;
        Ok(CycleOutcome::Committed(report))
    }
}

/// Periodically evaluates due rules with bounded parallelism
#[derive(Clone)]
pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    evaluator: Arc<dyn ConditionEvaluator>,
    handler: Arc<ResultHandler>,
    config: AlertingConfig,
    app: AppConfig,
    permits: Arc<Semaphore>,
    /// Rules with a cycle in progress
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl AlertEngine {
    pub fn new(
        config: &Config,
        store: Arc<dyn AlertStore>,
        evaluator: Arc<dyn ConditionEvaluator>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            handler: Arc::new(ResultHandler::new(Arc::clone(&store), dispatcher)),
            store,
            evaluator,
            permits: Arc::new(Semaphore::new(config.alerting.max_concurrent_evaluations.max(1))),
            config: config.alerting.clone(),
            app: config.app.clone(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Run the evaluation loop until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval = ?self.config.evaluation_interval,
            max_concurrent = self.config.max_concurrent_evaluations,
            "Starting alert engine"
        );

        let mut ticker = interval(self.config.evaluation_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let engine = self.clone();
                    let cancel = cancel.clone();
                    ticks.spawn(async move {
                        if let Err(e) = engine.run_once(&cancel).await {
                            error!(error = %e, "Error evaluating alerts");
                        }
                    });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Evaluation tick aborted");
                    }
                }
            }
        }

        info!("Stopping alert engine, waiting for in-flight cycles");
        while let Some(joined) = ticks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Evaluation tick aborted during shutdown");
            }
        }
        Ok(())
    }

    /// Evaluate every due rule once, skipping rules whose previous cycle is still running
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<Vec<(i64, Result<CycleOutcome>)>> {
        if !self.config.execute_alerts {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let rules = self.store.list_alerts().await?;
        self.handler
            .dispatcher
            .retain_rules(&rules.iter().map(|rule| rule.id).collect());

        let due: Vec<Alert> = rules.into_iter().filter(|rule| rule.is_due(now)).collect();

        debug!(count = due.len(), "Evaluating alert rules");

        let cycles = due.into_iter().filter_map(move |rule| {
            let Some(guard) = InFlightGuard::acquire(&self.in_flight, rule.id) else {
                debug!(rule_id = rule.id, "Previous cycle still running, skipping");
                return None;
            };
            Some(async move {
                let _guard = guard;
                let rule_id = rule.id;
                let outcome = match self.permits.acquire().await {
                    Ok(_permit) => self.evaluate_rule(rule, cancel.child_token()).await,
                    Err(_) => Err(Error::internal("evaluation permits closed")),
                };
                (rule_id, outcome)
            })
        });

        let outcomes = join_all(cycles).await;
        for (rule_id, outcome) in &outcomes {
            if let Err(e) = outcome {
                error!(rule_id = *rule_id, error = %e, "Error evaluating rule");
            }
        }
        Ok(outcomes)
    }

    /// Evaluate a single rule and handle its result
    pub async fn evaluate_rule(&self, rule: Alert, cancel: CancellationToken) -> Result<CycleOutcome> {
        let dashboard = match self.store.get_dashboard(rule.org_id, rule.dashboard_id).await {
            Ok(dashboard) => Some(dashboard),
            Err(e) => {
                warn!(rule_id = rule.id, error = %e, "Dashboard lookup failed, rule links unavailable");
                None
            }
        };

        let result = self.evaluator.evaluate(&rule, &cancel).await;
        metrics::counter!("alerting_evaluations_total").increment(1);

        if cancel.is_cancelled() {
            return Err(Error::internal(format!("evaluation of rule {} cancelled", rule.id)));
        }

        debug!(
            rule_id = rule.id,
            state = %result.state,
            matches = result.matches.len(),
            "Evaluated rule"
        );

        let mut ctx = EvalContext::new(rule, self.app.clone(), cancel)
            .with_match_limit(self.config.max_match_fields);
        if let Some(dashboard) = dashboard {
            ctx = ctx.with_dashboard(dashboard);
        }
        ctx.apply_result(result);

        self.handler.handle(&mut ctx).await
    }
}

/// Marks a rule as in flight until dropped
struct InFlightGuard {
    set: Arc<Mutex<HashSet<i64>>>,
    rule_id: i64,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<i64>>>, rule_id: i64) -> Option<Self> {
        set.lock().insert(rule_id).then(|| Self {
            set: Arc::clone(set),
            rule_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.rule_id);
    }
}
