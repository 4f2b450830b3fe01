use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warehouse_core::channels::{CHANNEL_EMAIL, CHANNEL_LOG, CHANNEL_WEBHOOK};
use warehouse_db::{PgStore, Warehouse};
use warehouse_events::{
    AlertRegistry, AlertScheduler, EmailConfig, EmailDelivery, EventBus, EventJournal,
    NotificationRouter, RecordingSink, WebhookDelivery,
};
use warehouse_pipeline::DemoOrchestrator;

mod config;

use config::DemoConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = DemoConfig::from_env().context("Invalid demo configuration")?;

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "warehouse_demo=debug,warehouse_pipeline=debug,warehouse_events=info".into()
    });
    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        store = if config.database_url.is_some() { "postgres" } else { "memory" },
        worker_latency_ms = config.worker_latency.as_millis() as u64,
        join_policy = ?config.join_policy,
        alert_channel = %config.alert_channel,
        "Loaded demo configuration"
    );

    // --- Store ---
    let warehouse = match &config.database_url {
        Some(url) => {
            let pool = warehouse_db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            warehouse_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Database health check passed");
            Warehouse::new(Arc::new(PgStore::new(pool)))
        }
        None => Warehouse::in_memory(),
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let journal_handle = tokio::spawn(EventJournal::run(event_bus.subscribe()));

    // --- Notification channels ---
    let router = Arc::new(NotificationRouter::new());
    let log_sink = Arc::new(RecordingSink::new());
    router.provision(CHANNEL_LOG, log_sink.clone());
    if let Some(email) = EmailConfig::from_env() {
        let email = EmailDelivery::new(email).context("Invalid SMTP configuration")?;
        router.provision(CHANNEL_EMAIL, Arc::new(email));
    }
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookDelivery::new(url.clone()).context("Invalid webhook client")?;
        router.provision(CHANNEL_WEBHOOK, Arc::new(webhook));
    }

    // --- Alerts ---
    let registry = Arc::new(AlertRegistry::new(router, Arc::clone(&event_bus)));
    let orchestrator = DemoOrchestrator::new(
        config.orchestrator_settings(),
        Arc::clone(&registry),
        Arc::clone(&event_bus),
    );
    orchestrator.attach_alert_hooks(&warehouse);

    let scheduler_cancel = CancellationToken::new();
    let scheduler = AlertScheduler::new(Arc::clone(&registry), warehouse.clone())
        .with_tick(config.scheduler_tick);
    let scheduler_handle = {
        let cancel = scheduler_cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    // --- Demo ---
    let result = orchestrator.run_demo(&warehouse).await;

    scheduler_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;

    // Dropping every bus holder closes the channel and stops the journal.
    drop(orchestrator);
    drop(registry);
    drop(warehouse);
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), journal_handle).await;

    let report = result.context("Demo run failed")?;
    for line in report.summary_lines() {
        println!("{line}");
    }
    tracing::info!(notifications = log_sink.len(), "Demo finished");

    anyhow::ensure!(report.all_checks_passed(), "Alert checks did not match expectations");
    Ok(())
}
