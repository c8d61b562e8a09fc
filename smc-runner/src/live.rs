//! Live driver: feeds a pipeline from an asynchronous message stream.
//!
//! The driver suspends only while waiting for the next feed message. Once a
//! closed candle is available it is pushed through the pipeline
//! synchronously, and the resulting plan events are handed to the executor
//! before the next message is read.
//!
//! Partial candles never reach the pipeline: ticks are folded into a
//! `CandleAssembler`, which releases a candle only once a later tick or a
//! heartbeat shows that its window has fully elapsed.
//!
//! Candles reach the pipeline strictly in index order. One that arrives
//! ahead of its predecessor waits in a reorder buffer until the hole is
//! filled. When more than `reorder_window` candles are waiting, the hole is
//! abandoned and the buffered candles are released in order.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use smc_core::domain::Instrument;
use smc_core::engine::PlanExecutor;
use smc_core::plan::TradePlanEvent;
use smc_core::{Candle, Pipeline};

/// One message from a market-data feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A single trade print.
    Tick {
        time: DateTime<Utc>,
        price: f64,
        volume: f64,
    },
    /// A candle the feed already closed. Indices may arrive out of order
    /// within the reorder window.
    Candle(Candle),
    /// Feed clock; closes the current window once its end has passed.
    Heartbeat(DateTime<Utc>),
}

// ─── Tick → candle assembly ─────────────────────────────────────────

#[derive(Debug, Clone)]
struct CandleBuilder {
    start: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl CandleBuilder {
    fn new(start: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    fn add(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    fn build(&self, index: u64) -> Candle {
        Candle::new(
            index,
            self.start,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Builds fixed-interval candles from ticks.
///
/// Windows are aligned to multiples of `interval` since the Unix epoch.
/// Windows without ticks produce no candle. Ticks for a window that has
/// already been released are stale and dropped.
#[derive(Debug, Clone)]
pub struct CandleAssembler {
    interval: Duration,
    current: Option<CandleBuilder>,
    next_index: u64,
    /// Start of the newest window released so far.
    last_released: Option<DateTime<Utc>>,
    dropped: u64,
}

impl CandleAssembler {
    /// `interval` must be positive; non-positive intervals fall back to one minute.
    pub fn new(interval: Duration) -> Self {
        let interval = if interval > Duration::zero() {
            interval
        } else {
            Duration::minutes(1)
        };
        Self {
            interval,
            current: None,
            next_index: 0,
            last_released: None,
            dropped: 0,
        }
    }

    /// Index the next released candle will carry.
    pub fn starting_at(mut self, index: u64) -> Self {
        self.next_index = index;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks rejected as stale or malformed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether a window is being built.
    pub fn has_partial(&self) -> bool {
        self.current.is_some()
    }

    fn window_start(&self, time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        time.duration_trunc(self.interval).ok()
    }

    /// Fold a tick in. Returns the previous window's candle when this tick
    /// opens a later window.
    pub fn push_tick(&mut self, time: DateTime<Utc>, price: f64, volume: f64) -> Option<Candle> {
        if !price.is_finite() || price <= 0.0 || !volume.is_finite() || volume < 0.0 {
            self.dropped += 1;
            return None;
        }
        let Some(start) = self.window_start(time) else {
            self.dropped += 1;
            return None;
        };
        if self.last_released.is_some_and(|released| start <= released) {
            self.dropped += 1;
            return None;
        }

        match self.current.as_ref().map(|b| b.start) {
            Some(open) if start == open => {
                if let Some(builder) = self.current.as_mut() {
                    builder.add(price, volume);
                }
                None
            }
            Some(open) if start < open => {
                // Late tick for a window we already moved past.
                self.dropped += 1;
                None
            }
            Some(_) => {
                let released = self.release();
                self.current = Some(CandleBuilder::new(start, price, volume));
                released
            }
            None => {
                self.current = Some(CandleBuilder::new(start, price, volume));
                None
            }
        }
    }

    /// Release the current window if `now` is at or past its end.
    pub fn on_heartbeat(&mut self, now: DateTime<Utc>) -> Option<Candle> {
        let end = self.current.as_ref()?.start + self.interval;
        if now >= end {
            self.release()
        } else {
            None
        }
    }

    /// Account for a closed candle that came straight from the feed, so
    /// assembled candles continue after it instead of reusing its index or
    /// its window.
    pub fn observe_candle(&mut self, candle: &Candle) {
        self.next_index = self.next_index.max(candle.index.saturating_add(1));
        let Some(start) = self.window_start(candle.time) else {
            return;
        };
        if self.last_released.map_or(true, |released| start > released) {
            self.last_released = Some(start);
        }
        // The feed's closed candle supersedes ticks for the same window.
        if self.current.as_ref().is_some_and(|b| b.start <= start) {
            self.current = None;
        }
    }

    fn release(&mut self) -> Option<Candle> {
        let builder = self.current.take()?;
        let candle = builder.build(self.next_index);
        self.next_index += 1;
        self.last_released = Some(builder.start);
        Some(candle)
    }
}

// ─── Stop handle ────────────────────────────────────────────────────

/// Stops a running `LiveDriver`. Cloneable; `stop` is idempotent.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request an immediate stop. Calling it again has no effect.
    pub fn stop(&self) {
        let changed = self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        });
        if changed {
            info!("live driver stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

// ─── Executor sink ──────────────────────────────────────────────────

/// Forwards plan events to an unbounded channel, so the synchronous
/// pipeline step never waits on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelExecutor {
    tx: mpsc::UnboundedSender<(Instrument, TradePlanEvent)>,
}

impl ChannelExecutor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Instrument, TradePlanEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PlanExecutor for ChannelExecutor {
    fn on_event(&mut self, instrument: &str, event: &TradePlanEvent) {
        if self.tx.send((instrument.to_string(), event.clone())).is_err() {
            warn!(instrument, plan = %event.plan().id, "executor channel closed, event dropped");
        }
    }
}

// ─── Driver ─────────────────────────────────────────────────────────

/// Why the driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    Stopped,
    FeedClosed,
}

/// Counters kept while the driver runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStats {
    pub messages: u64,
    pub candles_processed: u64,
    /// Candles the pipeline rejected.
    pub rejected: u64,
    /// Duplicate or stale candle messages dropped before the pipeline.
    pub dropped_candles: u64,
    /// Candles that arrived ahead of a missing predecessor and waited.
    pub reordered: u64,
    /// Indices given up on after the reorder window overflowed.
    pub skipped_indices: u64,
    /// Ticks the assembler dropped.
    pub dropped_ticks: u64,
    pub plan_events: u64,
}

/// Returned when the driver loop ends. The pipeline is handed back with
/// its trade plans exactly as last computed.
#[derive(Debug)]
pub struct LiveReport {
    pub cause: StopCause,
    pub stats: LiveStats,
    pub pipeline: Pipeline,
    /// A window was still open when the loop ended; it was not released.
    pub partial_discarded: bool,
    /// Candles still waiting for a predecessor when a stop ended the loop.
    pub pending_discarded: usize,
}

/// Candles held back waiting for a missing predecessor before the hole is
/// abandoned.
pub const DEFAULT_REORDER_WINDOW: usize = 8;

pub struct LiveDriver<E: PlanExecutor> {
    pipeline: Pipeline,
    assembler: CandleAssembler,
    executor: E,
    stop: StopHandle,
    stats: LiveStats,
    pending: BTreeMap<u64, Candle>,
    reorder_window: usize,
}

impl<E: PlanExecutor> LiveDriver<E> {
    pub fn new(pipeline: Pipeline, interval: Duration, executor: E) -> (Self, StopHandle) {
        let stop = StopHandle::new();
        let next = pipeline.last_index().map_or(0, |i| i + 1);
        let driver = Self {
            pipeline,
            assembler: CandleAssembler::new(interval).starting_at(next),
            executor,
            stop: stop.clone(),
            stats: LiveStats::default(),
            pending: BTreeMap::new(),
            reorder_window: DEFAULT_REORDER_WINDOW,
        };
        (driver, stop)
    }

    /// Maximum candles held waiting for a missing predecessor. Zero
    /// releases every candle on arrival.
    pub fn with_reorder_window(mut self, window: usize) -> Self {
        self.reorder_window = window;
        self
    }

    pub fn stats(&self) -> &LiveStats {
        &self.stats
    }

    /// Run until the stop handle fires or the feed closes.
    pub async fn run(mut self, mut feed: mpsc::Receiver<FeedMessage>) -> LiveReport {
        let mut stop_rx = self.stop.subscribe();
        info!(instrument = %self.pipeline.instrument(), "live driver started");

        let cause = loop {
            if *stop_rx.borrow_and_update() {
                break StopCause::Stopped;
            }
            tokio::select! {
                biased;
                // The handle owns a sender for the driver's lifetime, so
                // `changed` only resolves on a real update.
                _ = stop_rx.changed() => continue,
                msg = feed.recv() => match msg {
                    Some(msg) => self.handle(msg),
                    None => break StopCause::FeedClosed,
                },
            }
        };

        // A closed feed can no longer fill a hole. After a stop, waiting
        // candles are discarded and plans stay as last computed.
        let pending_discarded = match cause {
            StopCause::FeedClosed => {
                while !self.pending.is_empty() {
                    self.skip_hole();
                }
                0
            }
            StopCause::Stopped => self.pending.len(),
        };

        self.stats.dropped_ticks = self.assembler.dropped();
        info!(
            instrument = %self.pipeline.instrument(),
            cause = ?cause,
            candles = self.stats.candles_processed,
            rejected = self.stats.rejected,
            "live driver finished"
        );
        LiveReport {
            cause,
            partial_discarded: self.assembler.has_partial(),
            pending_discarded,
            stats: self.stats,
            pipeline: self.pipeline,
        }
    }

    fn handle(&mut self, msg: FeedMessage) {
        self.stats.messages += 1;
        let candle = match msg {
            FeedMessage::Tick {
                time,
                price,
                volume,
            } => self.assembler.push_tick(time, price, volume),
            FeedMessage::Heartbeat(now) => self.assembler.on_heartbeat(now),
            FeedMessage::Candle(candle) => Some(candle),
        };
        if let Some(candle) = candle {
            self.accept(candle);
        }
    }

    fn accept(&mut self, candle: Candle) {
        let index = candle.index;
        if self.pipeline.last_index().is_some_and(|last| index <= last)
            || self.pending.contains_key(&index)
        {
            debug!(
                instrument = %self.pipeline.instrument(),
                index,
                "duplicate or stale candle dropped"
            );
            self.stats.dropped_candles += 1;
            return;
        }

        self.assembler.observe_candle(&candle);
        self.pending.insert(index, candle);
        self.release_ready();

        if self.pending.contains_key(&index) {
            self.stats.reordered += 1;
            debug!(
                instrument = %self.pipeline.instrument(),
                index,
                waiting = self.pending.len(),
                "candle buffered behind a missing predecessor"
            );
        }
        while self.pending.len() > self.reorder_window {
            self.skip_hole();
        }
    }

    /// Push buffered candles while they continue the processed sequence.
    /// With nothing processed yet, the lowest buffered index starts it.
    fn release_ready(&mut self) {
        while let Some((&index, _)) = self.pending.first_key_value() {
            if self
                .pipeline
                .last_index()
                .is_some_and(|last| index != last.saturating_add(1))
            {
                break;
            }
            if let Some(candle) = self.pending.remove(&index) {
                self.step(&candle);
            }
        }
    }

    /// Give up on the hole before the lowest buffered candle.
    fn skip_hole(&mut self) {
        let Some((&index, _)) = self.pending.first_key_value() else {
            return;
        };
        let from = self.pipeline.last_index().map_or(index, |last| last + 1);
        warn!(
            instrument = %self.pipeline.instrument(),
            from,
            to = index,
            "missing candles abandoned"
        );
        self.stats.skipped_indices += index.saturating_sub(from);
        if let Some(candle) = self.pending.remove(&index) {
            self.step(&candle);
        }
        self.release_ready();
    }

    fn step(&mut self, candle: &Candle) {
        match self.pipeline.push_candle(candle) {
            Ok(out) => {
                self.stats.candles_processed += 1;
                for event in &out.plan_events {
                    self.stats.plan_events += 1;
                    self.executor.on_event(self.pipeline.instrument(), event);
                }
            }
            // Already logged by the pipeline.
            Err(_) => self.stats.rejected += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(min: i64, sec: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
            + Duration::minutes(min)
            + Duration::seconds(sec)
    }

    #[test]
    fn ticks_in_one_window_build_one_candle() {
        let mut a = CandleAssembler::new(Duration::minutes(1));
        assert!(a.push_tick(t(0, 1), 100.0, 1.0).is_none());
        assert!(a.push_tick(t(0, 20), 102.0, 2.0).is_none());
        assert!(a.push_tick(t(0, 40), 99.0, 1.0).is_none());
        assert!(a.push_tick(t(0, 59), 101.0, 1.0).is_none());

        let c = a.push_tick(t(1, 5), 101.5, 1.0).unwrap();
        assert_eq!(c.index, 0);
        assert_eq!(c.time, t(0, 0));
        assert_eq!((c.open, c.high, c.low, c.close), (100.0, 102.0, 99.0, 101.0));
        assert_eq!(c.volume, 5.0);
        assert!(a.has_partial());
    }

    #[test]
    fn heartbeat_releases_only_after_window_end() {
        let mut a = CandleAssembler::new(Duration::minutes(1));
        a.push_tick(t(0, 10), 100.0, 1.0);
        assert!(a.on_heartbeat(t(0, 59)).is_none());
        let c = a.on_heartbeat(t(1, 0)).unwrap();
        assert_eq!(c.close, 100.0);
        assert!(!a.has_partial());
        assert!(a.on_heartbeat(t(5, 0)).is_none());
    }

    #[test]
    fn stale_ticks_are_dropped_and_counted() {
        let mut a = CandleAssembler::new(Duration::minutes(1));
        a.push_tick(t(0, 10), 100.0, 1.0);
        a.push_tick(t(1, 10), 101.0, 1.0);
        // Window 0 already released.
        assert!(a.push_tick(t(0, 30), 50.0, 1.0).is_none());
        assert!(a.push_tick(t(2, 0), f64::NAN, 1.0).is_none());
        assert_eq!(a.dropped(), 2);

        let c = a.on_heartbeat(t(2, 0)).unwrap();
        assert_eq!(c.index, 1);
        assert_eq!(c.low, 101.0);
    }

    #[test]
    fn empty_windows_are_skipped() {
        let mut a = CandleAssembler::new(Duration::minutes(1)).starting_at(10);
        a.push_tick(t(0, 0), 100.0, 1.0);
        let c = a.push_tick(t(7, 0), 105.0, 1.0).unwrap();
        assert_eq!(c.index, 10);
        let next = a.on_heartbeat(t(8, 0)).unwrap();
        assert_eq!(next.index, 11);
        assert_eq!(next.time, t(7, 0));
    }

    #[test]
    fn feed_candles_advance_the_assembler() {
        let mut a = CandleAssembler::new(Duration::minutes(1));
        a.push_tick(t(3, 10), 90.0, 1.0);
        let feed = Candle::new(3, t(3, 0), 100.0, 101.0, 99.0, 100.5, 10.0);
        a.observe_candle(&feed);
        // Partial for the same window is superseded.
        assert!(!a.has_partial());
        // Window 3 already covered by the feed candle.
        assert!(a.push_tick(t(3, 30), 100.0, 1.0).is_none());
        assert_eq!(a.dropped(), 1);

        a.push_tick(t(4, 5), 102.0, 1.0);
        let c = a.on_heartbeat(t(5, 0)).unwrap();
        assert_eq!(c.index, 4);
        assert_eq!(c.time, t(4, 0));
    }

    #[test]
    fn stop_is_idempotent() {
        let handle = StopHandle::new();
        assert!(!handle.is_stopped());
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(handle.clone().is_stopped());
    }
}
