use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::SubsecRound;
use serde_json::json;
use tokio::time::{sleep, Instant};
use warehouse_core::channels::{CHANNEL_EMAIL, CHANNEL_LOG};
use warehouse_core::domain::{Domain, PROCESSED_AT_COLUMN};
use warehouse_core::pipeline_run::PipelineMode;
use warehouse_core::schema::{number_of, timestamp_of, Row};
use warehouse_core::alert::AlertState;
use warehouse_db::{EngineError, MergeOutcome, Warehouse, WriteEvent, WriteHook};
use warehouse_events::{AlertRegistry, EventBus, NotificationRouter, RecordingSink};
use warehouse_pipeline::orchestrator::{HIGH_VALUE_SALES_TABLE, STANDARD_SALES_TABLE};
use warehouse_pipeline::{DemoError, DemoOrchestrator, JoinPolicy, OrchestratorSettings, RunError};

const LATENCY: Duration = Duration::from_secs(30);

struct Harness {
    warehouse: Warehouse,
    orchestrator: DemoOrchestrator,
    sink: Arc<RecordingSink>,
    bus: Arc<EventBus>,
    registry: Arc<AlertRegistry>,
}

fn harness_with(settings: OrchestratorSettings) -> Harness {
    let warehouse = Warehouse::in_memory();
    let bus = Arc::new(EventBus::default());
    let router = Arc::new(NotificationRouter::new());
    let sink = Arc::new(RecordingSink::new());
    router.provision(CHANNEL_LOG, sink.clone());
    let registry = Arc::new(AlertRegistry::new(router, bus.clone()));
    let orchestrator = DemoOrchestrator::new(settings, registry.clone(), bus.clone());
    orchestrator.attach_alert_hooks(&warehouse);
    Harness {
        warehouse,
        orchestrator,
        sink,
        bus,
        registry,
    }
}

fn harness() -> Harness {
    harness_with(OrchestratorSettings {
        worker_latency: LATENCY,
        ..OrchestratorSettings::default()
    })
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

#[tokio::test(start_paused = true)]
async fn sequential_takes_the_sum_of_latencies() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    let run = h.orchestrator.run_sequential(&h.warehouse).await.unwrap();

    assert_eq!(run.mode, PipelineMode::Sequential);
    assert!(run.elapsed >= LATENCY * 3);
    assert!(run.end_time >= run.start_time);
}

#[tokio::test(start_paused = true)]
async fn concurrent_takes_the_max_latency() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    let run = h.orchestrator.run_concurrent(&h.warehouse).await.unwrap();

    assert_eq!(run.mode, PipelineMode::Concurrent);
    assert!(run.elapsed >= LATENCY);
    assert!(run.elapsed < LATENCY * 3);
}

#[tokio::test(start_paused = true)]
async fn concurrent_writes_one_record_per_domain() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.orchestrator.run_concurrent(&h.warehouse).await.unwrap();

    for domain in Domain::ALL {
        let rows = h.warehouse.select(&domain.processed_table()).await.unwrap();
        assert_eq!(rows.len(), 1, "{domain}");
        assert!(timestamp_of(&rows[0], PROCESSED_AT_COLUMN).is_some());
    }
}

#[tokio::test(start_paused = true)]
async fn sequential_copies_the_seed_sale() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    let before = chrono::Utc::now().trunc_subsecs(6);

    h.orchestrator.run_sequential(&h.warehouse).await.unwrap();

    let rows = h.warehouse.select("sales_processed").await.unwrap();
    assert_eq!(rows.len(), 1);
    let sale = &rows[0];
    assert_eq!(sale["id"], 1);
    assert_eq!(sale["region"], "west");
    assert_eq!(number_of(sale, "amount"), Some(1000.0));
    assert!(timestamp_of(sale, PROCESSED_AT_COLUMN).unwrap() >= before);
}

#[tokio::test]
async fn setup_is_idempotent() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    for domain in Domain::ALL {
        assert_eq!(
            h.warehouse.schema(&domain.source_table()).await.unwrap(),
            domain.source_schema()
        );
        assert_eq!(
            h.warehouse.schema(&domain.processed_table()).await.unwrap(),
            domain.processed_schema()
        );
        assert_eq!(h.warehouse.count(&domain.source_table()).await.unwrap(), 1);
        assert_eq!(h.warehouse.count(&domain.processed_table()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn alerts_fire_only_past_their_thresholds() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.orchestrator.define_alerts().await.unwrap();

    let checks = h.orchestrator.test_alerts(&h.warehouse).await.unwrap();

    assert_eq!(checks.len(), 4);
    for check in &checks {
        assert!(check.passed(), "{check:?}");
    }
    let subjects: Vec<String> = h.sink.notifications().into_iter().map(|n| n.subject).collect();
    assert_eq!(subjects, vec!["High Sales Alert", "Low Inventory Alert"]);
}

/// Runs a due scheduler pass right after every sales write, as a busy
/// background scheduler could.
struct SchedulerAfterSalesWrite {
    registry: Arc<AlertRegistry>,
    interval: Duration,
}

#[async_trait]
impl WriteHook for SchedulerAfterSalesWrite {
    async fn after_write(&self, warehouse: &Warehouse, event: &WriteEvent) {
        if event.table == "sales_processed" {
            tokio::time::advance(self.interval).await;
            self.registry.evaluate_due(warehouse).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn alert_checks_hold_while_the_scheduler_races() {
    let interval = Duration::from_millis(5);
    let h = harness_with(OrchestratorSettings {
        sales_alert_interval: interval,
        ..OrchestratorSettings::default()
    });
    h.warehouse.add_write_hook(Arc::new(SchedulerAfterSalesWrite {
        registry: h.registry.clone(),
        interval,
    }));
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.orchestrator.define_alerts().await.unwrap();

    let checks = h.orchestrator.test_alerts(&h.warehouse).await.unwrap();

    for check in &checks {
        assert!(check.passed(), "{check:?}");
    }
    assert_eq!(
        h.registry.state("high_sales_alert").await,
        Some(AlertState::Active)
    );
}

#[tokio::test]
async fn low_stock_fires_right_after_the_insert() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.orchestrator
        .define_alert(h.orchestrator.low_inventory_alert())
        .await
        .unwrap();
    let stock = |id: i64, qty: i64| {
        let now = chrono::Utc::now().to_rfc3339();
        row(json!({"id": id, "product": "gadget", "qty": qty, "processed_at": now}))
    };

    h.warehouse
        .insert("inventory_processed", &[stock(7, 50)])
        .await
        .unwrap();
    assert!(h.sink.is_empty());

    h.warehouse
        .insert("inventory_processed", &[stock(8, 5)])
        .await
        .unwrap();
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.sink.notifications()[0].alert.as_deref(), Some("low_inventory_alert"));
}

#[tokio::test]
async fn unprovisioned_channel_is_a_config_error() {
    let h = harness_with(OrchestratorSettings {
        alert_channel: CHANNEL_EMAIL.to_string(),
        ..OrchestratorSettings::default()
    });
    let err = h.orchestrator.define_alerts().await.unwrap_err();
    assert_matches!(err, DemoError::Config(_));
}

#[tokio::test]
async fn multi_table_insert_splits_on_amount() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.warehouse
        .insert(
            "sales_raw",
            &[
                row(json!({"id": 2, "region": "east", "amount": 9000})),
                row(json!({"id": 3, "region": "north", "amount": 5000})),
            ],
        )
        .await
        .unwrap();

    let routed = h.orchestrator.multi_table_insert(&h.warehouse).await.unwrap();

    assert_eq!(
        routed,
        vec![
            (HIGH_VALUE_SALES_TABLE.to_string(), 2),
            (STANDARD_SALES_TABLE.to_string(), 4),
        ]
    );
    let high: Vec<i64> = h
        .warehouse
        .select(HIGH_VALUE_SALES_TABLE)
        .await
        .unwrap()
        .iter()
        .filter_map(|r| r["id"].as_i64())
        .collect();
    assert_eq!(high, vec![2, 11]);
}

#[tokio::test]
async fn merge_by_name_updates_and_inserts() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    let outcome = h.orchestrator.merge_by_name(&h.warehouse).await.unwrap();

    assert_eq!(
        outcome,
        MergeOutcome {
            updated: 1,
            inserted: 1
        }
    );
    let customers = h.warehouse.select("customers_raw").await.unwrap();
    assert_eq!(customers.len(), 2);
    assert_eq!(customers[0]["email"], "billing@acme.example");
    assert_eq!(customers[1]["name"], "Globex");
}

#[tokio::test]
async fn merge_rejects_columns_without_a_match() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    let err = h
        .orchestrator
        .merge_into_by_name(&h.warehouse, "sales_raw", "customers_raw", "id")
        .await
        .unwrap_err();
    assert_matches!(
        err,
        DemoError::Engine(EngineError::Rejected {
            statement: "merge",
            ..
        })
    );
}

#[tokio::test(start_paused = true)]
async fn barrier_timeout_aborts_workers() {
    let h = harness_with(OrchestratorSettings {
        worker_latency: LATENCY,
        await_timeout: Some(Duration::from_secs(10)),
        ..OrchestratorSettings::default()
    });
    h.orchestrator.setup(&h.warehouse).await.unwrap();

    let err = h.orchestrator.run_concurrent(&h.warehouse).await.unwrap_err();
    assert_matches!(
        err,
        RunError::Pipeline {
            mode: PipelineMode::Concurrent,
            partial_elapsed,
            source: DemoError::Timeout { pending: 3, .. },
        } if partial_elapsed >= Duration::from_secs(10) && partial_elapsed < LATENCY
    );

    sleep(LATENCY * 2).await;
    for domain in Domain::ALL {
        assert_eq!(h.warehouse.count(&domain.processed_table()).await.unwrap(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn missing_source_row_fails_the_concurrent_run() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.warehouse
        .create_or_replace_table(&Domain::Inventory.source_schema())
        .await
        .unwrap();

    let err = h.orchestrator.run_concurrent(&h.warehouse).await.unwrap_err();
    assert_matches!(
        err,
        RunError::Pipeline {
            source: DemoError::Engine(EngineError::Rejected { .. }),
            ..
        }
    );
}

#[tokio::test(start_paused = true)]
async fn collect_all_reports_every_failure() {
    let h = harness_with(OrchestratorSettings {
        worker_latency: LATENCY,
        join_policy: JoinPolicy::CollectAll,
        ..OrchestratorSettings::default()
    });
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    for domain in [Domain::Sales, Domain::Customers] {
        h.warehouse
            .create_or_replace_table(&domain.source_schema())
            .await
            .unwrap();
    }

    let err = h.orchestrator.run_concurrent(&h.warehouse).await.unwrap_err();
    assert_matches!(
        err,
        RunError::Pipeline { source: DemoError::Tasks(failures), .. } if failures.len() == 2
    );
    assert_eq!(h.warehouse.count("inventory_processed").await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn sequential_failure_reports_partial_elapsed() {
    let h = harness();
    h.orchestrator.setup(&h.warehouse).await.unwrap();
    h.warehouse
        .create_or_replace_table(&Domain::Inventory.source_schema())
        .await
        .unwrap();
    let start = Instant::now();

    let err = h.orchestrator.run_sequential(&h.warehouse).await.unwrap_err();

    assert_matches!(
        err,
        RunError::Pipeline { mode: PipelineMode::Sequential, partial_elapsed, .. }
            if partial_elapsed >= LATENCY * 2 && partial_elapsed < LATENCY * 3
    );
    assert!(start.elapsed() < LATENCY * 3);
    assert_eq!(h.warehouse.count("sales_processed").await.unwrap(), 1);
    assert_eq!(h.warehouse.count("customers_processed").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn full_demo_reports_every_step() {
    let h = harness();
    let mut events = h.bus.subscribe();

    let report = h.orchestrator.run_demo(&h.warehouse).await.unwrap();

    assert!(report.sequential.elapsed >= LATENCY * 3);
    assert!(report.concurrent.elapsed < report.sequential.elapsed);
    assert!(report.all_checks_passed());
    assert_eq!(
        report.merged,
        MergeOutcome {
            updated: 1,
            inserted: 1
        }
    );
    assert_eq!(report.summary_lines()[0], "sequential pipeline: 3 workers finished in 90.0s");
    assert_eq!(
        report.routed,
        vec![
            (HIGH_VALUE_SALES_TABLE.to_string(), 1),
            (STANDARD_SALES_TABLE.to_string(), 3),
        ]
    );

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(
        seen.iter().filter(|t| t.as_str() == "pipeline.completed").count(),
        2
    );
    assert!(seen.iter().any(|t| t == "alert.fired"));
}
