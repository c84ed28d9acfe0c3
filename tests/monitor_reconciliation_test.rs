use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use flowledger::datasource::MockDataSource;
use flowledger::domain::{AccountLabel, Currency, Decimal, Direction, FundingRecord, TimeMs, Venue};
use flowledger::engine::{FinalityRules, ReturnsReport};
use flowledger::notify::{FundingNotice, Notifier, NotifyError, StartupNotice};
use flowledger::orchestration::{
    Monitor, MonitorSettings, MonitoredAccount, PeriodSchedule, TickError,
};
use flowledger::store::{LedgerSnapshot, SnapshotStore};
use flowledger::EventFeed;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const EVENT_TS: i64 = 1_705_300_000_000;

#[derive(Debug, Default)]
struct RecordingNotifier {
    funding: Mutex<Vec<FundingNotice>>,
    periods: Mutex<Vec<Vec<ReturnsReport>>>,
    startups: Mutex<Vec<StartupNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn started(&self, notice: &StartupNotice) -> Result<(), NotifyError> {
        self.startups.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn funding_applied(&self, notice: &FundingNotice) -> Result<(), NotifyError> {
        self.funding.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn period_closed(&self, reports: &[ReturnsReport]) -> Result<(), NotifyError> {
        self.periods.lock().unwrap().push(reports.to_vec());
        Ok(())
    }
}

struct Harness {
    account: AccountLabel,
    helper: MockDataSource,
    raw: MockDataSource,
    values: MockDataSource,
    notifier: Arc<RecordingNotifier>,
    store: SnapshotStore,
    _temp: TempDir,
}

impl Harness {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let account = AccountLabel::new("binance_01");
        Self {
            values: MockDataSource::new("values")
                .with_total(&account, 1000.0)
                .with_price("USDT", 1.0),
            helper: MockDataSource::new("helper"),
            raw: MockDataSource::new("raw"),
            notifier: Arc::new(RecordingNotifier::default()),
            store: SnapshotStore::new(temp.path().join("state.json")),
            account,
            _temp: temp,
        }
    }

    fn monitor(&self, snapshot: LedgerSnapshot) -> Monitor {
        let helper: Arc<dyn EventFeed> = Arc::new(self.helper.clone());
        let raw: Arc<dyn EventFeed> = Arc::new(self.raw.clone());
        Monitor::new(
            vec![MonitoredAccount {
                label: self.account.clone(),
                venue: Venue::Binance,
                feeds: vec![helper, raw],
            }],
            Arc::new(self.values.clone()),
            Arc::new(self.values.clone()),
            self.store.clone(),
            snapshot,
            MonitorSettings {
                rules: FinalityRules::default(),
                schedule: PeriodSchedule::default(),
                lookback_ms: 14 * 86_400_000,
                poll_interval: Duration::from_secs(60),
            },
        )
        .with_notifier(self.notifier.clone())
    }
}

fn deposit(id: Option<&str>, ts: i64, amount: &str, status: &str) -> FundingRecord {
    FundingRecord::new(
        id.map(|s| s.to_string()),
        Some(Direction::Deposit),
        TimeMs::new(ts),
        Currency::new("USDT"),
        Decimal::from_str_canonical(amount).unwrap(),
        Some(status.to_string()),
    )
}

/// 10:00 in New York.
fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap()
}

/// 16:30 in New York, after the daily close.
fn evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 21, 30, 0).unwrap()
}

#[tokio::test]
async fn redelivered_events_apply_once_across_ticks() {
    let h = Harness::new();
    let records = vec![
        deposit(Some("a"), EVENT_TS, "10", "1"),
        deposit(Some("b"), EVENT_TS + 1, "20", "1"),
        deposit(Some("c"), EVENT_TS + 2, "30", "1"),
    ];
    h.helper.set_records(&h.account, records.clone());
    h.raw.set_records(&h.account, records);
    let mut m = h.monitor(LedgerSnapshot::default());

    let mut applied = 0;
    for _ in 0..5 {
        applied += m.tick(morning()).await.unwrap().applied;
    }

    assert_eq!(applied, 3);
    let st = &m.snapshot().accounts[&h.account];
    assert_eq!(st.seen_ids.len(), 3);
    assert_relative_eq!(st.net_flows, 60.0);
    assert_eq!(h.notifier.funding.lock().unwrap().len(), 3);
    assert_eq!(h.helper.fetch_count(), 5);
    assert_eq!(h.raw.fetch_count(), 5);
}

#[tokio::test]
async fn final_raw_record_supersedes_pending_helper_record() {
    let h = Harness::new();
    h.helper
        .set_records(&h.account, vec![deposit(Some("X"), EVENT_TS, "100", "0")]);
    h.raw
        .set_records(&h.account, vec![deposit(Some("X"), EVENT_TS, "100", "1")]);
    let mut m = h.monitor(LedgerSnapshot::default());

    let outcome = m.tick(morning()).await.unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.skipped_nonfinal, 0);
    assert!(m.snapshot().accounts[&h.account].has_seen("X"));
}

#[tokio::test]
async fn pending_everywhere_waits_for_settlement() {
    let h = Harness::new();
    h.helper
        .set_records(&h.account, vec![deposit(Some("X"), EVENT_TS, "100", "0")]);
    let mut m = h.monitor(LedgerSnapshot::default());

    let outcome = m.tick(morning()).await.unwrap();
    assert_eq!(outcome.applied, 0);
    assert_eq!(outcome.skipped_nonfinal, 1);
    assert!(!m.snapshot().accounts[&h.account].has_seen("X"));

    h.helper
        .set_records(&h.account, vec![deposit(Some("X"), EVENT_TS, "100", "1")]);
    h.values.set_total(&h.account, 1100.0);
    let outcome = m.tick(morning()).await.unwrap();
    assert_eq!(outcome.applied, 1);
    assert_relative_eq!(m.snapshot().accounts[&h.account].net_flows, 100.0);
}

#[tokio::test]
async fn failing_feed_degrades_without_aborting() {
    let h = Harness::new();
    let record = deposit(Some("d1"), EVENT_TS, "50", "1");
    h.helper.set_failing(true);
    h.raw.set_records(&h.account, vec![record.clone()]);
    let mut m = h.monitor(LedgerSnapshot::default());

    assert_eq!(m.tick(morning()).await.unwrap().applied, 1);

    // Helper recovers and re-delivers the same transfer.
    h.helper.set_failing(false);
    h.helper.set_records(&h.account, vec![record]);
    assert_eq!(m.tick(morning()).await.unwrap().applied, 0);
    assert_relative_eq!(m.snapshot().accounts[&h.account].net_flows, 50.0);
}

#[tokio::test]
async fn idless_records_merge_on_currency_and_time() {
    let h = Harness::new();
    h.helper
        .set_records(&h.account, vec![deposit(None, EVENT_TS, "25", "1")]);
    h.raw
        .set_records(&h.account, vec![deposit(Some("  "), EVENT_TS, "25", "success")]);
    let mut m = h.monitor(LedgerSnapshot::default());

    assert_eq!(m.tick(morning()).await.unwrap().applied, 1);
    let st = &m.snapshot().accounts[&h.account];
    assert!(st.has_seen(&format!("USDT:{}", EVENT_TS)));
}

#[tokio::test]
async fn valuation_failure_keeps_committed_state() {
    let h = Harness::new();
    h.helper
        .set_records(&h.account, vec![deposit(Some("d1"), EVENT_TS, "10", "1")]);
    let mut m = h.monitor(LedgerSnapshot::default());
    m.tick(morning()).await.unwrap();
    let committed = m.snapshot().clone();
    let on_disk = std::fs::read(h.store.path()).unwrap();

    h.helper.set_records(
        &h.account,
        vec![
            deposit(Some("d1"), EVENT_TS, "10", "1"),
            deposit(Some("d2"), EVENT_TS + 5, "10", "1"),
        ],
    );
    h.values.set_failing(true);
    let err = m.tick(morning()).await.unwrap_err();

    assert!(matches!(err, TickError::Valuation { .. }));
    assert_eq!(m.snapshot(), &committed);
    assert_eq!(std::fs::read(h.store.path()).unwrap(), on_disk);
    assert_eq!(h.notifier.funding.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn persistence_failure_discards_tick() {
    let h = Harness::new();
    let blocked = h._temp.path().join("blocked");
    std::fs::create_dir(&blocked).unwrap();
    let helper: Arc<dyn EventFeed> = Arc::new(h.helper.clone());
    h.helper
        .set_records(&h.account, vec![deposit(Some("d1"), EVENT_TS, "10", "1")]);
    let mut m = Monitor::new(
        vec![MonitoredAccount {
            label: h.account.clone(),
            venue: Venue::Binance,
            feeds: vec![helper],
        }],
        Arc::new(h.values.clone()),
        Arc::new(h.values.clone()),
        SnapshotStore::new(&blocked),
        LedgerSnapshot::default(),
        MonitorSettings {
            rules: FinalityRules::default(),
            schedule: PeriodSchedule::default(),
            lookback_ms: 86_400_000,
            poll_interval: Duration::from_secs(60),
        },
    )
    .with_notifier(h.notifier.clone());

    assert!(matches!(m.tick(morning()).await, Err(TickError::Store(_))));
    assert_eq!(m.snapshot(), &LedgerSnapshot::default());
    assert!(m.reports().read().await.is_empty());
    assert!(h.notifier.funding.lock().unwrap().is_empty());
}

#[tokio::test]
async fn restart_from_snapshot_does_not_double_apply() {
    let h = Harness::new();
    h.helper
        .set_records(&h.account, vec![deposit(Some("d1"), EVENT_TS, "10", "1")]);
    let mut first = h.monitor(LedgerSnapshot::default());
    first.tick(morning()).await.unwrap();
    drop(first);

    let restored = h.store.load().await.unwrap();
    let mut second = h.monitor(restored);
    let outcome = second.tick(morning()).await.unwrap();
    assert_eq!(outcome.applied, 0);
    assert_relative_eq!(second.snapshot().accounts[&h.account].net_flows, 10.0);
}

#[tokio::test]
async fn end_to_end_period_close() {
    let h = Harness::new();
    let mut m = h.monitor(LedgerSnapshot::default());

    // Baseline at 1000.
    m.tick(morning()).await.unwrap();

    // Deposit of 100 lands; account marks at 1100 post-flow.
    h.helper
        .set_records(&h.account, vec![deposit(Some("d1"), EVENT_TS, "100", "1")]);
    h.values.set_total(&h.account, 1100.0);
    m.tick(morning()).await.unwrap();

    // Market moves to 1200 and the 16:00 boundary passes.
    h.values.set_total(&h.account, 1200.0);
    let outcome = m.tick(evening()).await.unwrap();
    assert!(outcome.period_closed);

    let periods = h.notifier.periods.lock().unwrap().clone();
    assert_eq!(periods.len(), 1);
    let report = &periods[0][0];
    assert_relative_eq!(report.twr_factor, 1200.0 / 1100.0, epsilon = 1e-12);
    assert_relative_eq!(report.money_weighted_return.unwrap(), 0.1, epsilon = 1e-12);
    assert_relative_eq!(report.pnl, 100.0, epsilon = 1e-9);

    let published = m.reports().read().await.get(&h.account).cloned().unwrap();
    assert_eq!(&published, report);

    let saved = h.store.load().await.unwrap();
    assert_eq!(
        saved.last_period_close,
        NaiveDate::from_ymd_opt(2024, 1, 15)
    );
    let st = &saved.accounts[&h.account];
    assert_eq!(st.start_value, Some(1200.0));
    assert_eq!(st.twr_factor, 1.0);
    assert_eq!(st.net_flows, 0.0);
    assert!(st.has_seen("d1"));

    // Same local day: no second close.
    let again = m.tick(evening() + chrono::Duration::hours(1)).await.unwrap();
    assert!(!again.period_closed);
    assert_eq!(h.notifier.periods.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unpriced_currency_books_raw_amount() {
    let h = Harness::new();
    let mut btc = deposit(Some("b1"), EVENT_TS, "0.5", "1");
    btc.currency = Currency::new("BTC");
    h.helper.set_records(&h.account, vec![btc]);
    let mut m = h.monitor(LedgerSnapshot::default());

    let outcome = m.tick(morning()).await.unwrap();
    assert_eq!(outcome.applied, 1);
    assert_eq!(outcome.approximated, 1);
    assert_relative_eq!(m.snapshot().accounts[&h.account].net_flows, 0.5);
}

#[tokio::test]
async fn startup_notice_sent_once_after_first_commit() {
    let h = Harness::new();
    h.values.set_failing(true);
    let mut m = h.monitor(LedgerSnapshot::default());

    assert!(m.tick(morning()).await.is_err());
    assert!(h.notifier.startups.lock().unwrap().is_empty());

    h.values.set_failing(false);
    m.tick(morning()).await.unwrap();
    m.tick(morning()).await.unwrap();

    let startups = h.notifier.startups.lock().unwrap().clone();
    assert_eq!(startups.len(), 1);
    assert_eq!(startups[0].values.get(&h.account), Some(&1000.0));
    assert_relative_eq!(startups[0].total_value, 1000.0);
}

#[tokio::test]
async fn startup_notice_can_be_disabled() {
    let h = Harness::new();
    let mut m = h.monitor(LedgerSnapshot::default()).with_startup_notice(false);
    m.tick(morning()).await.unwrap();
    assert!(h.notifier.startups.lock().unwrap().is_empty());
}
