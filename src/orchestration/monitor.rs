//! Polling loop: fetch, reconcile, fold, close periods, persist, publish.
//!
//! Each tick works on a clone of the committed snapshot. Nothing becomes
//! visible (in memory, to the API, or to notifiers) until the clone has been
//! written to disk, so a failed tick leaves no trace and the next tick simply
//! re-fetches the same windows.

use super::schedule::PeriodSchedule;
use crate::datasource::{DataSourceError, EventFeed, PriceOracle, ValuationSource};
use crate::domain::{
    sort_events_deterministic, AccountLabel, FundingEvent, FundingRecord, TimeMs, Venue,
};
use crate::engine::{deduplicate, AccountLedgerState, FinalityRules, ReturnsReport, Settlement};
use crate::notify::{FundingNotice, LogNotifier, Notifier, StartupNotice};
use crate::store::{LedgerSnapshot, SnapshotStore, StoreError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Latest published report per account, shared with the API.
pub type ReportBoard = Arc<RwLock<BTreeMap<AccountLabel, ReturnsReport>>>;

/// One account under watch and the feeds that describe its transfers.
#[derive(Debug, Clone)]
pub struct MonitoredAccount {
    pub label: AccountLabel,
    pub venue: Venue,
    /// Feeds in priority order; earlier feeds win ties during deduplication.
    pub feeds: Vec<Arc<dyn EventFeed>>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub rules: FinalityRules,
    pub schedule: PeriodSchedule,
    pub lookback_ms: i64,
    pub poll_interval: Duration,
}

#[derive(Debug, Error)]
pub enum TickError {
    #[error("valuation failed for {account}: {source}")]
    Valuation {
        account: AccountLabel,
        #[source]
        source: DataSourceError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of one committed tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    /// Settled events folded into a ledger.
    pub applied: usize,
    /// Applied events booked at raw amount for lack of a price.
    pub approximated: usize,
    /// Events held back because their status is not yet terminal.
    pub skipped_nonfinal: usize,
    /// Terminal events that moved no funds, newly marked seen.
    pub acknowledged: usize,
    /// Records dropped as incomplete or malformed.
    pub rejected: usize,
    pub period_closed: bool,
}

impl TickOutcome {
    fn absorb(&mut self, other: TickOutcome) {
        self.applied += other.applied;
        self.approximated += other.approximated;
        self.skipped_nonfinal += other.skipped_nonfinal;
        self.acknowledged += other.acknowledged;
        self.rejected += other.rejected;
    }
}

pub struct Monitor {
    accounts: Vec<MonitoredAccount>,
    valuations: Arc<dyn ValuationSource>,
    prices: Arc<dyn PriceOracle>,
    notifier: Arc<dyn Notifier>,
    store: SnapshotStore,
    settings: MonitorSettings,
    snapshot: LedgerSnapshot,
    reports: ReportBoard,
    announce_startup: bool,
    startup_sent: bool,
}

impl Monitor {
    pub fn new(
        accounts: Vec<MonitoredAccount>,
        valuations: Arc<dyn ValuationSource>,
        prices: Arc<dyn PriceOracle>,
        store: SnapshotStore,
        snapshot: LedgerSnapshot,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            accounts,
            valuations,
            prices,
            notifier: Arc::new(LogNotifier),
            store,
            settings,
            snapshot,
            reports: Arc::new(RwLock::new(BTreeMap::new())),
            announce_startup: true,
            startup_sent: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Send a one-time "monitor online" notice after the first committed tick.
    pub fn with_startup_notice(mut self, enabled: bool) -> Self {
        self.announce_startup = enabled;
        self
    }

    /// Handle to the published reports.
    pub fn reports(&self) -> ReportBoard {
        self.reports.clone()
    }

    /// Last committed ledger state.
    pub fn snapshot(&self) -> &LedgerSnapshot {
        &self.snapshot
    }

    /// Run one reconciliation pass at `now`.
    ///
    /// A valuation or persistence failure aborts the tick and leaves the
    /// committed state untouched. Feed and pricing failures only degrade it.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<TickOutcome, TickError> {
        let now_ms = TimeMs::new(now.timestamp_millis());
        let from_ms = now_ms.saturating_sub_ms(self.settings.lookback_ms);

        let mut working = self.snapshot.clone();
        let mut outcome = TickOutcome::default();
        let mut values: Vec<f64> = Vec::with_capacity(self.accounts.len());
        let mut notices: Vec<FundingNotice> = Vec::new();

        for account in &self.accounts {
            let span = info_span!("account", account = %account.label, venue = %account.venue);
            let state = working.account_mut(&account.label);
            let pass = self
                .reconcile_account(account, state, from_ms, now_ms)
                .instrument(span)
                .await?;
            outcome.absorb(pass.outcome);
            notices.extend(pass.notices);
            values.push(pass.value);
        }

        let mut closed: Vec<ReturnsReport> = Vec::new();
        if self
            .settings
            .schedule
            .is_due(now, working.last_period_close)
        {
            for (account, value) in self.accounts.iter().zip(&values) {
                let span = info_span!("account", account = %account.label, venue = %account.venue);
                let state = working.account_mut(&account.label);
                closed.push(span.in_scope(|| state.close_period(account.label.clone(), *value)));
            }
            let date = self.settings.schedule.local_date(now);
            working.last_period_close = Some(date);
            outcome.period_closed = true;
            info!(%date, accounts = closed.len(), "period closed");
        }

        self.store.save(&working).await?;

        let published: Vec<ReturnsReport> = if outcome.period_closed {
            closed.clone()
        } else {
            self.accounts
                .iter()
                .zip(&values)
                .map(|(account, value)| {
                    let label = account.label.clone();
                    working
                        .accounts
                        .get(&label)
                        .map(|st| st.report(label.clone(), *value))
                        .unwrap_or_else(|| AccountLedgerState::default().report(label, *value))
                })
                .collect()
        };
        self.snapshot = working;
        {
            let mut board = self.reports.write().await;
            for report in published {
                board.insert(report.account.clone(), report);
            }
        }

        for notice in &notices {
            if let Err(e) = self.notifier.funding_applied(notice).await {
                warn!(event_id = %notice.event_id, "funding notification failed: {}", e);
            }
        }
        if !closed.is_empty() {
            if let Err(e) = self.notifier.period_closed(&closed).await {
                warn!("period notification failed: {}", e);
            }
        }
        if self.announce_startup && !self.startup_sent {
            let notice = StartupNotice::new(
                self.accounts
                    .iter()
                    .map(|a| a.label.clone())
                    .zip(values.iter().copied()),
            );
            // Retried on the next tick until delivered.
            match self.notifier.started(&notice).await {
                Ok(()) => self.startup_sent = true,
                Err(e) => warn!("startup notification failed: {}", e),
            }
        }

        info!(
            applied = outcome.applied,
            skipped_nonfinal = outcome.skipped_nonfinal,
            acknowledged = outcome.acknowledged,
            period_closed = outcome.period_closed,
            "tick committed"
        );
        Ok(outcome)
    }

    async fn reconcile_account(
        &self,
        account: &MonitoredAccount,
        state: &mut AccountLedgerState,
        from_ms: TimeMs,
        to_ms: TimeMs,
    ) -> Result<AccountPass, TickError> {
        let value = self
            .valuations
            .total_value(&account.label)
            .await
            .map_err(|source| TickError::Valuation {
                account: account.label.clone(),
                source,
            })?;
        state.observe_valuation(value);

        let fetches = account.feeds.iter().map(|feed| {
            fetch_feed(
                feed.as_ref(),
                &account.label,
                from_ms.as_ms(),
                to_ms.as_ms(),
            )
        });
        let sources = join_all(fetches).await;
        let merged = deduplicate(sources, account.venue, &self.settings.rules);

        let mut outcome = TickOutcome::default();
        let mut settled: Vec<FundingEvent> = Vec::new();
        for record in merged {
            let event = match FundingEvent::try_from(record) {
                Ok(event) => event,
                Err(e) => {
                    warn!("dropping record: {}", e);
                    outcome.rejected += 1;
                    continue;
                }
            };
            if state.has_seen(&event.id) {
                continue;
            }
            match self
                .settings
                .rules
                .classify(account.venue, event.direction, &event.status)
            {
                Settlement::Pending => {
                    debug!(event_id = %event.id, status = %event.status, "not final yet");
                    outcome.skipped_nonfinal += 1;
                }
                Settlement::Failed => {
                    debug!(event_id = %event.id, status = %event.status, "terminal without funds moved");
                    state.acknowledge(&event.id);
                    outcome.acknowledged += 1;
                }
                Settlement::Settled => settled.push(event),
            }
        }

        sort_events_deterministic(&mut settled);

        let mut notices = Vec::new();
        for mut event in settled {
            let valuation = match self.prices.valuation(&event.currency, event.amount).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(event_id = %event.id, currency = %event.currency, "pricing failed: {}", e);
                    None
                }
            };
            event.valuation = valuation;
            let application = state.apply_event(&event, valuation, value);
            if application.applied {
                outcome.applied += 1;
                if application.approximated {
                    outcome.approximated += 1;
                }
                notices.push(FundingNotice::from_event(&account.label, &event));
            }
        }

        Ok(AccountPass {
            value,
            outcome,
            notices,
        })
    }

    /// Tick every `poll_interval` until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            if let Err(e) = self.tick(Utc::now()).await {
                error!("tick failed, state unchanged: {}", e);
            }
            tokio::select! {
                _ = &mut shutdown => {
                    info!("monitor stopping");
                    break;
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }
}

struct AccountPass {
    value: f64,
    outcome: TickOutcome,
    notices: Vec<FundingNotice>,
}

/// A failing feed contributes no records for this tick.
async fn fetch_feed(
    feed: &dyn EventFeed,
    account: &AccountLabel,
    from_ms: i64,
    to_ms: i64,
) -> Vec<FundingRecord> {
    match feed.fetch_events(account, from_ms, to_ms).await {
        Ok(records) => records,
        Err(e) => {
            warn!(source = feed.name(), "feed fetch failed: {}", e);
            Vec::new()
        }
    }
}
