//! Registered alert rules, their state and watermarks.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SubsecRound;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use warehouse_core::alert::{AlertRule, AlertSchedule, AlertState, Notification};
use warehouse_core::error::CoreError;
use warehouse_core::schema::Row;
use warehouse_core::types::Timestamp;
use warehouse_db::{EngineError, Warehouse, WriteEvent, WriteHook};

use super::{AlertError, AlertOutcome, EvaluationTrigger};
use crate::bus::{EventBus, PlatformEvent, ALERT_FIRED};
use crate::router::NotificationRouter;

/// Rows quoted in a notification body before it is truncated.
const MAX_ROWS_IN_BODY: usize = 10;

struct RegisteredAlert {
    rule: AlertRule,
    state: AlertState,
    /// Cutoff of the last successful evaluation; only rows stamped at or
    /// after it count.
    watermark: Timestamp,
    /// Next polling deadline; set only for active periodic rules.
    next_due: Option<Instant>,
    last_outcome: Option<AlertOutcome>,
}

/// Alert rules keyed by name.
///
/// Evaluations are serialized by one lock, so a watermark is never read
/// and advanced by two evaluations at once. Delivery happens after the
/// lock is released.
pub struct AlertRegistry {
    alerts: Mutex<BTreeMap<String, RegisteredAlert>>,
    router: Arc<NotificationRouter>,
    bus: Arc<EventBus>,
}

impl AlertRegistry {
    pub fn new(router: Arc<NotificationRouter>, bus: Arc<EventBus>) -> Self {
        Self {
            alerts: Mutex::new(BTreeMap::new()),
            router,
            bus,
        }
    }

    /// Create or replace a rule. The rule starts suspended with its
    /// watermark at registration time.
    pub async fn register_alert(&self, rule: AlertRule) -> Result<(), CoreError> {
        rule.validate()?;
        self.router.ensure_provisioned(&rule.action.channel)?;

        let name = rule.name.clone();
        let replaced = self
            .alerts
            .lock()
            .await
            .insert(
                name.clone(),
                RegisteredAlert {
                    rule,
                    state: AlertState::Suspended,
                    watermark: chrono::Utc::now().trunc_subsecs(6),
                    next_due: None,
                    last_outcome: None,
                },
            )
            .is_some();
        tracing::info!(alert = %name, replaced, "Alert registered");
        Ok(())
    }

    /// Resume or suspend a rule. Resuming a periodic rule schedules its
    /// first evaluation one interval from now.
    pub async fn set_alert_state(&self, name: &str, state: AlertState) -> Result<(), CoreError> {
        let mut alerts = self.alerts.lock().await;
        let entry = alerts.get_mut(name).ok_or_else(|| CoreError::NotFound {
            entity: "alert",
            name: name.to_string(),
        })?;

        entry.state = state;
        entry.next_due = match (state, entry.rule.schedule) {
            (AlertState::Active, AlertSchedule::Periodic { interval }) => {
                Some(Instant::now() + interval)
            }
            _ => None,
        };
        tracing::info!(alert = name, ?state, "Alert state changed");
        Ok(())
    }

    pub async fn state(&self, name: &str) -> Option<AlertState> {
        self.alerts.lock().await.get(name).map(|a| a.state)
    }

    pub async fn watermark(&self, name: &str) -> Option<Timestamp> {
        self.alerts.lock().await.get(name).map(|a| a.watermark)
    }

    pub async fn last_outcome(&self, name: &str) -> Option<AlertOutcome> {
        self.alerts
            .lock()
            .await
            .get(name)
            .and_then(|a| a.last_outcome.clone())
    }

    /// Evaluate one rule immediately, bypassing its schedule and state.
    pub async fn evaluate_now(
        &self,
        warehouse: &Warehouse,
        name: &str,
    ) -> Result<AlertOutcome, AlertError> {
        let (outcome, firing) = {
            let mut alerts = self.alerts.lock().await;
            let entry = alerts.get_mut(name).ok_or_else(|| CoreError::NotFound {
                entity: "alert",
                name: name.to_string(),
            })?;
            evaluate(warehouse, entry, EvaluationTrigger::Manual).await?
        };
        if let Some(firing) = firing {
            self.fire(firing).await;
        }
        Ok(outcome)
    }

    /// Evaluate every active periodic rule whose deadline has passed.
    pub async fn evaluate_due(&self, warehouse: &Warehouse) -> Vec<AlertOutcome> {
        let now = Instant::now();
        let mut outcomes = Vec::new();
        let mut firings = Vec::new();

        {
            let mut alerts = self.alerts.lock().await;
            for entry in alerts.values_mut() {
                let (Some(due), AlertSchedule::Periodic { interval }) =
                    (entry.next_due, entry.rule.schedule)
                else {
                    continue;
                };
                if entry.state != AlertState::Active || due > now {
                    continue;
                }
                entry.next_due = Some(now + interval);

                match evaluate(warehouse, entry, EvaluationTrigger::Schedule).await {
                    Ok((outcome, firing)) => {
                        outcomes.push(outcome);
                        firings.extend(firing);
                    }
                    Err(e) => {
                        tracing::error!(alert = %entry.rule.name, error = %e, "Scheduled evaluation failed");
                    }
                }
            }
        }

        for firing in firings {
            self.fire(firing).await;
        }
        outcomes
    }

    /// Notify and publish `alert.fired`. Delivery failures are logged only.
    ///
    /// Runs with the registry unlocked, so a slow channel never holds up
    /// other evaluations or the writes that trigger them.
    async fn fire(&self, firing: Firing) {
        let Firing {
            notification,
            event,
            matched_rows,
        } = firing;
        let alert = notification.alert.clone().unwrap_or_default();

        if let Err(e) = self.router.notify(&notification).await {
            tracing::error!(alert = %alert, error = %e, "Alert notification failed");
        }
        self.bus.publish(event);
        tracing::info!(alert = %alert, matched_rows, "Alert fired");
    }
}

/// A firing decided under the registry lock and delivered after it.
struct Firing {
    notification: Notification,
    event: PlatformEvent,
    matched_rows: usize,
}

/// Match `entry`'s condition against a snapshot of its table and move the
/// watermark to the snapshot's cutoff.
///
/// The cutoff is taken while no write to the table is in flight, and writes
/// stamp `processed_at` at commit, so a row missing from this snapshot is
/// stamped at or after the new watermark and is seen next time.
async fn evaluate(
    warehouse: &Warehouse,
    entry: &mut RegisteredAlert,
    trigger: EvaluationTrigger,
) -> Result<(AlertOutcome, Option<Firing>), EngineError> {
    let snapshot = warehouse.snapshot(&entry.rule.condition.table).await?;
    let matched: Vec<&Row> = snapshot
        .rows
        .iter()
        .filter(|row| entry.rule.condition.matches(row, entry.watermark))
        .collect();

    let firing = (!matched.is_empty())
        .then(|| prepare_firing(&entry.rule, &matched, entry.watermark));

    entry.watermark = snapshot.taken_at;
    let outcome = AlertOutcome {
        alert: entry.rule.name.clone(),
        trigger,
        fired: firing.is_some(),
        matched_rows: matched.len(),
        evaluated_at: snapshot.taken_at,
    };
    tracing::debug!(
        alert = %outcome.alert,
        ?trigger,
        fired = outcome.fired,
        matched_rows = outcome.matched_rows,
        "Alert evaluated"
    );
    entry.last_outcome = Some(outcome.clone());
    Ok((outcome, firing))
}

fn prepare_firing(rule: &AlertRule, matched: &[&Row], watermark: Timestamp) -> Firing {
    let body = render_body(rule, matched, watermark);
    Firing {
        notification: Notification::from_action(&rule.action, &rule.name, body),
        event: PlatformEvent::new(ALERT_FIRED)
            .with_alert(rule.name.clone())
            .with_table(rule.condition.table.clone())
            .with_payload(json!({
                "subject": rule.action.subject,
                "condition": rule.condition.description,
                "matched_rows": matched.len(),
            })),
        matched_rows: matched.len(),
    }
}

fn render_body(rule: &AlertRule, matched: &[&Row], watermark: Timestamp) -> String {
    let mut body = format!(
        "{}\n\nCondition: {} on {}\nNew matching rows since {}: {}",
        rule.action.body,
        rule.condition.description,
        rule.condition.table,
        watermark.to_rfc3339(),
        matched.len()
    );
    for row in matched.iter().take(MAX_ROWS_IN_BODY) {
        body.push_str("\n  ");
        body.push_str(&Value::Object((*row).clone()).to_string());
    }
    if matched.len() > MAX_ROWS_IN_BODY {
        body.push_str(&format!("\n  ... and {} more", matched.len() - MAX_ROWS_IN_BODY));
    }
    body
}

#[async_trait]
impl WriteHook for AlertRegistry {
    /// Evaluate active event-triggered rules watching the written table,
    /// then deliver whatever fired before the write call returns.
    async fn after_write(&self, warehouse: &Warehouse, event: &WriteEvent) {
        let mut firings = Vec::new();
        {
            let mut alerts = self.alerts.lock().await;
            let watching = alerts.values_mut().filter(|a| {
                a.state == AlertState::Active
                    && a.rule.schedule == AlertSchedule::EventTriggered
                    && a.rule.condition.table == event.table
            });
            for entry in watching {
                match evaluate(warehouse, entry, EvaluationTrigger::Write).await {
                    Ok((_, firing)) => firings.extend(firing),
                    Err(e) => {
                        tracing::error!(alert = %entry.rule.name, error = %e, "Write-triggered evaluation failed");
                    }
                }
            }
        }

        for firing in firings {
            self.fire(firing).await;
        }
    }
}
