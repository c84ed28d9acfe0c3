use flowledger::api;
use flowledger::config::{AccountConfig, Config};
use flowledger::datasource::{HttpEventFeed, HttpValuationSource, StaticPriceOracle};
use flowledger::notify::{LogNotifier, Notifier, WebhookNotifier};
use flowledger::orchestration::{Monitor, MonitorSettings, MonitoredAccount, PeriodSchedule};
use flowledger::{EventFeed, FinalityRules, SnapshotStore};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

fn monitored_account(account: &AccountConfig) -> MonitoredAccount {
    let feeds = account
        .feed_urls
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let name = if i == 0 { "helper".to_string() } else { format!("raw{}", i) };
            Arc::new(HttpEventFeed::new(name, url.clone())) as Arc<dyn EventFeed>
        })
        .collect();
    MonitoredAccount {
        label: account.label.clone(),
        venue: account.venue,
        feeds,
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let rules = FinalityRules::new(&config.extra_final_statuses, config.trust_nonfinal);
    if let Err(e) = rules.validate(&config.venues()) {
        eprintln!("Finality configuration error: {}", e);
        std::process::exit(1);
    }
    if config.trust_nonfinal {
        tracing::warn!("FLOW_TRUST_NONFINAL is set: every status is treated as settled");
    }

    for account in config.accounts.iter().filter(|a| a.feed_urls.is_empty()) {
        tracing::warn!(account = %account.label, "no funding feeds configured");
    }

    let store = SnapshotStore::new(&config.state_path);
    let snapshot = match store.load().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to load ledger snapshot: {}", e);
            std::process::exit(1);
        }
    };

    let value_urls: HashMap<_, _> = config
        .accounts
        .iter()
        .map(|a| (a.label.clone(), a.value_url.clone()))
        .collect();
    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };

    let monitor = Monitor::new(
        config.accounts.iter().map(monitored_account).collect(),
        Arc::new(HttpValuationSource::new(value_urls)),
        Arc::new(StaticPriceOracle::new(
            config.quote_ccy.clone(),
            config.prices.clone(),
        )),
        store,
        snapshot,
        MonitorSettings {
            rules,
            schedule: PeriodSchedule::new(config.period_close_tz, config.period_close_hour),
            lookback_ms: config.lookback_ms,
            poll_interval: Duration::from_secs(config.poll_seconds),
        },
    )
    .with_notifier(notifier)
    .with_startup_notice(config.send_startup_ok);

    // Create router
    let app = api::create_router(api::AppState::new(monitor.reports()));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        accounts = config.accounts.len(),
        state_path = %config.state_path,
        "Server listening on {}",
        addr
    );

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;
}
