//! The demo orchestrator.
//!
//! [`DemoOrchestrator`] issues every demo step against an explicit
//! [`Warehouse`] handle: table setup, the sequential and concurrent
//! pipelines, alert definition and checks, and the two convenience
//! statements. [`DemoOrchestrator::run_demo`] chains them in order.

use std::sync::Arc;
use std::time::Duration;

use chrono::SubsecRound;
use serde_json::json;
use tokio::time::Instant;
use warehouse_core::alert::{
    AlertCondition, AlertRule, AlertSchedule, AlertState, Comparison, NotifyAction,
};
use warehouse_core::channels::CHANNEL_LOG;
use warehouse_core::domain::{processed_record, Domain, ID_COLUMN};
use warehouse_core::pipeline_run::{PipelineMode, PipelineRun};
use warehouse_core::schema::{ColumnType, Row, TableSchema};
use warehouse_core::statements::{align_by_name, InsertMode, MultiTableInsert};
use warehouse_db::{EngineError, MergeOutcome, Warehouse};
use warehouse_events::bus::{PIPELINE_COMPLETED, SETUP_COMPLETED};
use warehouse_events::{AlertRegistry, EventBus, PlatformEvent};

use crate::error::{DemoError, RunError};
use crate::tasks::{await_all, submit, JoinPolicy};
use crate::worker;

pub const HIGH_SALES_ALERT: &str = "high_sales_alert";
pub const LOW_INVENTORY_ALERT: &str = "low_inventory_alert";

pub const HIGH_VALUE_SALES_TABLE: &str = "high_value_sales";
pub const STANDARD_SALES_TABLE: &str = "standard_sales";
pub const CUSTOMERS_STAGING_TABLE: &str = "customers_staging";

const HIGH_SALES_THRESHOLD: f64 = 5000.0;
const LOW_INVENTORY_THRESHOLD: f64 = 10.0;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Simulated processing time of one worker.
    pub worker_latency: Duration,
    /// Bound on the concurrent barrier; `None` waits forever.
    pub await_timeout: Option<Duration>,
    pub join_policy: JoinPolicy,
    pub alert_channel: String,
    pub alert_recipients: Vec<String>,
    pub sales_alert_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            worker_latency: Duration::from_secs(30),
            await_timeout: Some(Duration::from_secs(300)),
            join_policy: JoinPolicy::FailFast,
            alert_channel: CHANNEL_LOG.to_string(),
            alert_recipients: vec!["ops@example.com".to_string()],
            sales_alert_interval: Duration::from_secs(60),
        }
    }
}

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One step of the alert check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCheck {
    pub step: &'static str,
    pub alert: &'static str,
    pub expected: bool,
    pub fired: bool,
}

impl AlertCheck {
    pub fn passed(&self) -> bool {
        self.expected == self.fired
    }
}

#[derive(Debug, Clone)]
pub struct DemoReport {
    pub sequential: PipelineRun,
    pub concurrent: PipelineRun,
    pub alert_checks: Vec<AlertCheck>,
    /// Rows written per target table by the multi-table insert.
    pub routed: Vec<(String, u64)>,
    pub merged: MergeOutcome,
}

impl DemoReport {
    pub fn all_checks_passed(&self) -> bool {
        self.alert_checks.iter().all(AlertCheck::passed)
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![self.sequential.summary(), self.concurrent.summary()];
        let concurrent_secs = self.concurrent.elapsed.as_secs_f64();
        if concurrent_secs > 0.0 {
            lines.push(format!(
                "concurrent speedup: {:.1}x",
                self.sequential.elapsed.as_secs_f64() / concurrent_secs
            ));
        }
        for check in &self.alert_checks {
            lines.push(format!(
                "alert check '{}': {} {} ({})",
                check.step,
                check.alert,
                if check.fired { "fired" } else { "stayed quiet" },
                if check.passed() { "ok" } else { "UNEXPECTED" }
            ));
        }
        for (table, rows) in &self.routed {
            lines.push(format!("multi-table insert: {rows} row(s) into {table}"));
        }
        lines.push(format!(
            "merge by name: {} updated, {} inserted",
            self.merged.updated, self.merged.inserted
        ));
        lines
    }
}

// ---------------------------------------------------------------------------
// DemoOrchestrator
// ---------------------------------------------------------------------------

pub struct DemoOrchestrator {
    settings: OrchestratorSettings,
    alerts: Arc<AlertRegistry>,
    bus: Arc<EventBus>,
}

impl DemoOrchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        alerts: Arc<AlertRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            settings,
            alerts,
            bus,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn alerts(&self) -> &Arc<AlertRegistry> {
        &self.alerts
    }

    /// Route writes on `warehouse` through the alert registry so
    /// event-triggered rules are evaluated. Call once per warehouse.
    pub fn attach_alert_hooks(&self, warehouse: &Warehouse) {
        warehouse.add_write_hook(self.alerts.clone());
    }

    /// Create or replace the raw and processed tables of every domain and
    /// seed one row per raw table.
    pub async fn setup(&self, warehouse: &Warehouse) -> Result<(), DemoError> {
        for domain in Domain::ALL {
            warehouse
                .create_or_replace_table(&domain.source_schema())
                .await?;
            warehouse
                .create_or_replace_table(&domain.processed_schema())
                .await?;
            warehouse
                .insert(&domain.source_table(), &[domain.seed_row()])
                .await?;
        }

        tracing::info!(domains = Domain::ALL.len(), "Setup completed");
        self.bus.publish(
            PlatformEvent::new(SETUP_COMPLETED).with_payload(json!({
                "tables": Domain::ALL
                    .iter()
                    .flat_map(|d| [d.source_table(), d.processed_table()])
                    .collect::<Vec<_>>(),
            })),
        );
        Ok(())
    }

    pub async fn simulate_worker(
        &self,
        warehouse: &Warehouse,
        domain: Domain,
    ) -> Result<Row, DemoError> {
        worker::simulate_worker(warehouse, domain, self.settings.worker_latency).await
    }

    /// Run the three workers one after another.
    pub async fn run_sequential(&self, warehouse: &Warehouse) -> Result<PipelineRun, RunError> {
        let start_time = chrono::Utc::now();
        let started = Instant::now();

        for domain in Domain::ALL {
            if let Err(source) = self.simulate_worker(warehouse, domain).await {
                return Err(RunError::Pipeline {
                    mode: PipelineMode::Sequential,
                    partial_elapsed: started.elapsed(),
                    source,
                });
            }
        }

        Ok(self.finish(PipelineMode::Sequential, start_time, started))
    }

    /// Launch all three workers, then wait behind one barrier.
    pub async fn run_concurrent(&self, warehouse: &Warehouse) -> Result<PipelineRun, RunError> {
        let start_time = chrono::Utc::now();
        let started = Instant::now();

        let handles = Domain::ALL
            .into_iter()
            .map(|domain| {
                let warehouse = warehouse.clone();
                let latency = self.settings.worker_latency;
                submit(format!("{domain}_worker"), async move {
                    worker::simulate_worker(&warehouse, domain, latency).await
                })
            })
            .collect();

        if let Err(source) =
            await_all(handles, self.settings.join_policy, self.settings.await_timeout).await
        {
            return Err(RunError::Pipeline {
                mode: PipelineMode::Concurrent,
                partial_elapsed: started.elapsed(),
                source,
            });
        }

        Ok(self.finish(PipelineMode::Concurrent, start_time, started))
    }

    fn finish(
        &self,
        mode: PipelineMode,
        start_time: chrono::DateTime<chrono::Utc>,
        started: Instant,
    ) -> PipelineRun {
        let run = PipelineRun::new(
            mode,
            Domain::ALL.len(),
            start_time,
            chrono::Utc::now(),
            started.elapsed(),
        );
        tracing::info!(
            run_id = %run.id,
            %mode,
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Pipeline completed"
        );
        self.bus.publish(
            PlatformEvent::new(PIPELINE_COMPLETED).with_payload(json!({
                "run_id": run.id,
                "mode": mode,
                "workers": run.workers,
                "elapsed_ms": run.elapsed.as_millis() as u64,
            })),
        );
        run
    }

    // -- Alerts -----------------------------------------------------------

    /// Register `rule` and activate it.
    pub async fn define_alert(&self, rule: AlertRule) -> Result<(), DemoError> {
        let name = rule.name.clone();
        self.alerts.register_alert(rule).await?;
        self.alerts.set_alert_state(&name, AlertState::Active).await?;
        Ok(())
    }

    pub fn high_sales_alert(&self) -> AlertRule {
        AlertRule {
            name: HIGH_SALES_ALERT.to_string(),
            condition: AlertCondition::threshold(
                Domain::Sales.processed_table(),
                "amount",
                Comparison::GreaterThan,
                HIGH_SALES_THRESHOLD,
            ),
            schedule: AlertSchedule::Periodic {
                interval: self.settings.sales_alert_interval,
            },
            action: self.action(
                "High Sales Alert",
                "A processed sale exceeded the high-value threshold.",
            ),
        }
    }

    pub fn low_inventory_alert(&self) -> AlertRule {
        AlertRule {
            name: LOW_INVENTORY_ALERT.to_string(),
            condition: AlertCondition::threshold(
                Domain::Inventory.processed_table(),
                "qty",
                Comparison::LessThan,
                LOW_INVENTORY_THRESHOLD,
            ),
            schedule: AlertSchedule::EventTriggered,
            action: self.action(
                "Low Inventory Alert",
                "A processed stock level fell below the reorder threshold.",
            ),
        }
    }

    fn action(&self, subject: &str, body: &str) -> NotifyAction {
        NotifyAction {
            channel: self.settings.alert_channel.clone(),
            recipients: self.settings.alert_recipients.clone(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    pub async fn define_alerts(&self) -> Result<(), DemoError> {
        self.define_alert(self.high_sales_alert()).await?;
        self.define_alert(self.low_inventory_alert()).await?;
        Ok(())
    }

    /// Insert rows on both sides of each threshold and record whether the
    /// alerts fired. Needs [`Self::define_alerts`] and
    /// [`Self::attach_alert_hooks`] first.
    pub async fn test_alerts(&self, warehouse: &Warehouse) -> Result<Vec<AlertCheck>, DemoError> {
        let sales = Domain::Sales.processed_table();
        let inventory = Domain::Inventory.processed_table();
        let mut checks = Vec::with_capacity(4);

        // Keep the periodic scheduler off the rows the manual checks inspect.
        self.alerts
            .set_alert_state(HIGH_SALES_ALERT, AlertState::Suspended)
            .await?;

        insert_processed(warehouse, &sales, json!({"id": 101, "region": "east", "amount": 3000}))
            .await?;
        let outcome = self.alerts.evaluate_now(warehouse, HIGH_SALES_ALERT).await?;
        checks.push(AlertCheck {
            step: "insert sales 3000",
            alert: HIGH_SALES_ALERT,
            expected: false,
            fired: outcome.fired,
        });

        insert_processed(warehouse, &sales, json!({"id": 102, "region": "east", "amount": 7500}))
            .await?;
        let outcome = self.alerts.evaluate_now(warehouse, HIGH_SALES_ALERT).await?;
        checks.push(AlertCheck {
            step: "insert sales 7500",
            alert: HIGH_SALES_ALERT,
            expected: true,
            fired: outcome.fired,
        });
        self.alerts
            .set_alert_state(HIGH_SALES_ALERT, AlertState::Active)
            .await?;

        for (step, id, qty, expected) in [
            ("insert inventory 50", 101, 50, false),
            ("insert inventory 5", 102, 5, true),
        ] {
            let before = chrono::Utc::now().trunc_subsecs(6);
            insert_processed(
                warehouse,
                &inventory,
                json!({"id": id, "product": "widget", "qty": qty}),
            )
            .await?;
            // The write hook has already run by the time the insert returns.
            let fired = self
                .alerts
                .last_outcome(LOW_INVENTORY_ALERT)
                .await
                .is_some_and(|o| o.evaluated_at >= before && o.fired);
            checks.push(AlertCheck {
                step,
                alert: LOW_INVENTORY_ALERT,
                expected,
                fired,
            });
        }

        for check in &checks {
            tracing::info!(
                step = check.step,
                alert = check.alert,
                fired = check.fired,
                passed = check.passed(),
                "Alert check"
            );
        }
        Ok(checks)
    }

    // -- Statements -------------------------------------------------------

    /// Stage a few sales on both sides of the threshold, then route every
    /// `sales_raw` row into `high_value_sales` and `standard_sales`.
    /// Returns rows written per target table.
    pub async fn multi_table_insert(
        &self,
        warehouse: &Warehouse,
    ) -> Result<Vec<(String, u64)>, DemoError> {
        warehouse
            .merge(
                &Domain::Sales.source_table(),
                ID_COLUMN,
                &[
                    row(json!({"id": 11, "region": "east", "amount": 12000})),
                    row(json!({"id": 12, "region": "north", "amount": 4200})),
                    row(json!({"id": 13, "region": "south", "amount": 5000})),
                ],
            )
            .await?;

        let statement = MultiTableInsert::new(InsertMode::All)
            .when(
                format!("amount > {HIGH_SALES_THRESHOLD}"),
                Comparison::GreaterThan.predicate("amount", HIGH_SALES_THRESHOLD),
                HIGH_VALUE_SALES_TABLE,
            )
            .otherwise(STANDARD_SALES_TABLE);
        self.insert_routed(warehouse, &Domain::Sales.source_table(), &statement)
            .await
    }

    /// Apply `statement` to every row of `source_table`. Targets are
    /// created or replaced with the source table's columns.
    pub async fn insert_routed(
        &self,
        warehouse: &Warehouse,
        source_table: &str,
        statement: &MultiTableInsert,
    ) -> Result<Vec<(String, u64)>, DemoError> {
        let schema = warehouse.schema(source_table).await?;
        let rows = warehouse.select(source_table).await?;

        let mut written = Vec::new();
        for (target, target_rows) in statement.route(&rows) {
            warehouse
                .create_or_replace_table(&schema.renamed(target.as_str()))
                .await?;
            let count = if target_rows.is_empty() {
                0
            } else {
                warehouse.insert(&target, &target_rows).await?
            };
            tracing::debug!(source = source_table, target = %target, rows = count, "Rows routed");
            written.push((target, count));
        }
        Ok(written)
    }

    /// Stage customer rows with columns in a different order, then merge
    /// them into `customers_raw` by column name on `id`.
    pub async fn merge_by_name(&self, warehouse: &Warehouse) -> Result<MergeOutcome, DemoError> {
        let staging = TableSchema::new(CUSTOMERS_STAGING_TABLE)
            .column("email", ColumnType::Text)
            .column(ID_COLUMN, ColumnType::BigInt)
            .column("name", ColumnType::Text);
        warehouse.create_or_replace_table(&staging).await?;
        warehouse
            .insert(
                CUSTOMERS_STAGING_TABLE,
                &[
                    row(json!({"email": "billing@acme.example", "id": 1, "name": "Acme Corp"})),
                    row(json!({"email": "ops@globex.example", "id": 2, "name": "Globex"})),
                ],
            )
            .await?;

        self.merge_into_by_name(
            warehouse,
            CUSTOMERS_STAGING_TABLE,
            &Domain::Customers.source_table(),
            ID_COLUMN,
        )
        .await
    }

    /// Merge every row of `source_table` into `target_table`, matching
    /// columns by name and rows on `key`.
    pub async fn merge_into_by_name(
        &self,
        warehouse: &Warehouse,
        source_table: &str,
        target_table: &str,
        key: &str,
    ) -> Result<MergeOutcome, DemoError> {
        let target = warehouse.schema(target_table).await?;
        let source = warehouse.schema(source_table).await?;
        let mapping =
            align_by_name(&target, &source).map_err(|e| EngineError::from_core("merge", e))?;

        let rows: Vec<Row> = warehouse
            .select(source_table)
            .await?
            .iter()
            .map(|r| mapping.project(r))
            .collect();
        let outcome = warehouse.merge(target_table, key, &rows).await?;

        tracing::info!(
            source = source_table,
            target = target_table,
            updated = outcome.updated,
            inserted = outcome.inserted,
            "Merged by name"
        );
        Ok(outcome)
    }

    // -- Whole demo -------------------------------------------------------

    /// Setup, both pipelines (each from freshly set-up tables), alert
    /// definition and checks, then the two statements.
    pub async fn run_demo(&self, warehouse: &Warehouse) -> Result<DemoReport, RunError> {
        self.setup(warehouse).await.map_err(RunError::Setup)?;
        let sequential = self.run_sequential(warehouse).await?;

        self.setup(warehouse).await.map_err(RunError::Setup)?;
        let concurrent = self.run_concurrent(warehouse).await?;

        self.define_alerts().await.map_err(step("define_alerts"))?;
        let alert_checks = self
            .test_alerts(warehouse)
            .await
            .map_err(step("test_alerts"))?;
        let routed = self
            .multi_table_insert(warehouse)
            .await
            .map_err(step("multi_table_insert"))?;
        let merged = self
            .merge_by_name(warehouse)
            .await
            .map_err(step("merge_by_name"))?;

        let report = DemoReport {
            sequential,
            concurrent,
            alert_checks,
            routed,
            merged,
        };
        tracing::info!(
            checks_passed = report.all_checks_passed(),
            high_value = report
                .routed
                .iter()
                .find(|(t, _)| t == HIGH_VALUE_SALES_TABLE)
                .map_or(0, |(_, n)| *n),
            "Demo completed"
        );
        Ok(report)
    }
}

fn step(step: &'static str) -> impl Fn(DemoError) -> RunError {
    move |source| RunError::Step { step, source }
}

fn row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Row::new(),
    }
}

async fn insert_processed(
    warehouse: &Warehouse,
    table: &str,
    source: serde_json::Value,
) -> Result<(), EngineError> {
    let record = processed_record(&row(source), chrono::Utc::now());
    warehouse.insert(table, &[record]).await?;
    Ok(())
}
