//! Per-job monitoring cycle
//!
//! A [`Reporter`] owns everything one rule-set needs between cycles: the
//! rolling buffer of retained records, the previous group snapshot, the
//! event-time watermark and the heartbeat clock. Each cycle fetches the new
//! part of the sliding window, re-evaluates the rules over everything
//! retained and decides whether to stay quiet, send a heartbeat, announce a
//! recovery or raise an alert.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::alerts::{
    group_events, render_report, ChangeDetector, Dispatcher, Notification, NotifierError,
};
use crate::config::{format_duration, AppConfig};
use crate::data::{RollingBuffer, TimeWindow};
use crate::rules::{EngineError, Event, Rule, RuleEngine};
use crate::search::{RangeFetcher, RetrievalConfig, SearchBackend, SearchError};

/// What a single cycle decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No events and nothing to announce
    Quiet,
    /// No events for a whole heartbeat period
    Heartbeat,
    /// Events went away after an alert
    Recovered,
    /// Events exist but none is newer than the watermark
    Stale,
    /// New events, but every group matches the previous cycle
    Suppressed,
    /// An alert was delivered
    Alerted,
}

/// State carried from one cycle to the next
#[derive(Debug)]
pub struct CycleState {
    pub buffer: RollingBuffer,
    pub detector: ChangeDetector,
    /// Latest event time seen so far
    pub watermark: i64,
    /// When the last heartbeat or recovery went out
    pub last_heartbeat: i64,
    /// Size of the last alert; zero when nothing is outstanding
    pub active_alerts: usize,
}

/// Drives one rule-set
pub struct Reporter<B, E, D> {
    config: Arc<AppConfig>,
    retrieval: RetrievalConfig,
    rules: Vec<Rule>,
    backend: B,
    engine: E,
    dispatcher: D,
    state: CycleState,
}

impl<B, E, D> Reporter<B, E, D>
where
    B: SearchBackend,
    E: RuleEngine,
    D: Dispatcher,
{
    pub fn new(config: Arc<AppConfig>, backend: B, engine: E, dispatcher: D) -> Self {
        let state = CycleState {
            buffer: RollingBuffer::new(config.es.range_time_name.clone()),
            detector: ChangeDetector::new(),
            watermark: 0,
            last_heartbeat: chrono::Utc::now().timestamp_millis(),
            active_alerts: 0,
        };

        Self {
            retrieval: config.retrieval(),
            rules: config.rules(),
            config,
            backend,
            engine,
            dispatcher,
            state,
        }
    }

    /// Start the heartbeat clock at `now_ms` instead of the wall clock.
    pub fn started_at(mut self, now_ms: i64) -> Self {
        self.state.last_heartbeat = now_ms;
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Run one cycle as of `now_ms`.
    ///
    /// A fetch error leaves every piece of state untouched. A dispatch error
    /// is returned after the state has been updated, so the next cycle does
    /// not repeat a heartbeat or recovery that was already attempted.
    pub async fn run_cycle(&mut self, now_ms: i64) -> Result<CycleOutcome, CycleError> {
        let window = TimeWindow::ending_at(now_ms, self.config.duration_ms());
        let begin = window.begin.max(self.state.buffer.next_fetch_start());

        let fetched = if begin <= window.end {
            RangeFetcher::new(&self.backend, &self.retrieval)
                .fetch(TimeWindow::new(begin, window.end))
                .await?
        } else {
            // Retained records are newer than the clock; nothing to ask for.
            tracing::warn!(
                job = %self.config.name,
                begin,
                now = now_ms,
                "Fetch start is ahead of the clock, skipping fetch"
            );
            Vec::new()
        };

        let fetched_count = fetched.len();
        self.state.buffer.advance(window.begin, fetched);
        let total = self.state.buffer.len();

        let events = self.engine.draw(self.state.buffer.records(), &self.rules)?;

        tracing::info!(
            job = %self.config.name,
            fetched = fetched_count,
            records = total,
            events = events.len(),
            "Cycle evaluated"
        );

        if events.is_empty() {
            self.on_quiet(now_ms).await
        } else {
            self.on_events(&events, total).await
        }
    }

    async fn on_quiet(&mut self, now_ms: i64) -> Result<CycleOutcome, CycleError> {
        let messages = &self.config.custom;

        if self.state.active_alerts > 0 {
            self.state.active_alerts = 0;
            self.state.last_heartbeat = now_ms;

            tracing::info!(job = %self.config.name, "Errors cleared");
            let notification = Notification::new(
                messages.recover_title.clone(),
                messages.recover_color.clone(),
                format!("tips: {}", self.config.query_time_info()),
            );
            self.dispatcher.send(&notification).await?;
            return Ok(CycleOutcome::Recovered);
        }

        if now_ms - self.state.last_heartbeat > self.config.heartbeat_period_ms() {
            self.state.last_heartbeat = now_ms;

            let notification = Notification::new(
                messages.heartbeat_title.clone(),
                messages.heartbeat_color.clone(),
                messages.heartbeat_content.clone(),
            );
            self.dispatcher.send(&notification).await?;
            return Ok(CycleOutcome::Heartbeat);
        }

        Ok(CycleOutcome::Quiet)
    }

    async fn on_events(&mut self, events: &[Event], total: usize) -> Result<CycleOutcome, CycleError> {
        let mut fresh = false;
        for event in events {
            if event.time > self.state.watermark {
                self.state.watermark = event.time;
                fresh = true;
            }
        }
        if !fresh {
            tracing::debug!(
                job = %self.config.name,
                watermark = self.state.watermark,
                "No event newer than watermark"
            );
            return Ok(CycleOutcome::Stale);
        }

        let grouping = group_events(events, &self.config.group_keys);
        if !self.state.detector.check_and_replace(grouping.snapshot.clone()) {
            tracing::debug!(job = %self.config.name, groups = grouping.len(), "Groups unchanged");
            self.state.active_alerts = grouping.len();
            return Ok(CycleOutcome::Suppressed);
        }

        let title = format!(
            "Errors: {}/{} (qualifying/total) in {}. interval {}",
            events.len(),
            total,
            format_duration(self.config.duration()),
            format_duration(self.config.check_interval())
        );
        let body = render_report(&grouping, &self.config.show_keys);
        let notification =
            Notification::new(title, self.config.custom.alert_color.clone(), body).with_mention(true);

        self.dispatcher.send(&notification).await?;
        self.state.active_alerts = events.len();

        tracing::info!(
            job = %self.config.name,
            events = events.len(),
            groups = grouping.len(),
            "Alert sent"
        );
        Ok(CycleOutcome::Alerted)
    }

    /// Announce the job if `hi` is configured. Failures are logged only.
    pub async fn greet(&self) {
        if !self.config.hi {
            return;
        }

        let messages = &self.config.custom;
        let notification = Notification::new(
            messages.hi_title.clone(),
            messages.hi_color.clone(),
            messages.hi_content.clone(),
        );
        if let Err(e) = self.dispatcher.send(&notification).await {
            tracing::warn!(job = %self.config.name, error = %e, "Greeting failed");
        }
    }

    /// Cycle until `shutdown` flips to true or its sender goes away.
    ///
    /// The first cycle runs immediately, then one per check interval.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            job = %self.config.name,
            interval = %format_duration(self.config.check_interval()),
            window = %format_duration(self.config.duration()),
            "Reporter started"
        );
        self.greet().await;

        let mut delay = Duration::ZERO;
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    let now = chrono::Utc::now().timestamp_millis();
                    match self.run_cycle(now).await {
                        Ok(outcome) => {
                            tracing::debug!(job = %self.config.name, ?outcome, "Cycle finished");
                        }
                        Err(e) => {
                            tracing::error!(job = %self.config.name, error = %e, "Cycle failed");
                        }
                    }
                    delay = self.config.check_interval();
                }
            }
        }

        tracing::info!(job = %self.config.name, "Reporter shutting down");
    }
}

/// Errors that abort a cycle
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Search(#[from] SearchError),

    #[error("Rule evaluation failed: {0}")]
    Engine(#[from] EngineError),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] NotifierError),
}
