use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use common::{Bar, Error, FeedConfig, Result};

use crate::walk::PriceWalk;

/// Deterministically paced generator of synthetic bars.
///
/// Lifecycle of a feed after activation (the first call to `next_bar`):
/// 1. nothing is emitted until `start_delay` has elapsed;
/// 2. `num_gen_bars` backfill bars are emitted at once, stamped in the past;
/// 3. one bar per `tick_interval` until `run_duration` has elapsed.
///
/// With `live = false` step 3 runs on a logical clock without sleeping.
pub struct SyntheticFeed {
    cfg: FeedConfig,
    tick_interval: Duration,
    start_delay: Duration,
    run_duration: Option<Duration>,
    walk: PriceWalk,
    clock: Option<FeedClock>,
    delay_served: bool,
    backfill_left: u32,
    paced: u64,
    /// Offset of the next paced slot from `live_from`. `None` once it no
    /// longer fits in a `Duration`.
    next_offset: Option<Duration>,
    done: bool,
    span: Span,
}

/// Maps tokio instants onto wall-clock timestamps.
#[derive(Debug, Clone, Copy)]
struct FeedClock {
    activated: Instant,
    origin: DateTime<Utc>,
}

impl FeedClock {
    fn start() -> Self {
        Self {
            activated: Instant::now(),
            origin: Utc::now(),
        }
    }

    fn timestamp(&self, at: Instant) -> Option<DateTime<Utc>> {
        let elapsed = to_chrono(at.saturating_duration_since(self.activated))?;
        self.origin.checked_add_signed(elapsed)
    }
}

impl SyntheticFeed {
    /// Validate `cfg` and build the feed. Nothing runs until the first poll.
    pub fn new(cfg: FeedConfig) -> Result<Self> {
        if cfg.name.trim().is_empty() {
            return Err(Error::config("feed name must not be empty"));
        }
        let name = cfg.name.clone();

        if cfg.compression == 0 {
            return Err(Error::config(format!("feed '{name}': compression must be >= 1")));
        }

        let tick_interval = positive_secs(&name, "tick_interval_secs", cfg.tick_interval_secs)?;
        let start_delay = non_negative_secs(&name, "start_delay_secs", cfg.start_delay_secs)?;
        let run_duration = cfg
            .run_duration_secs
            .map(|secs| positive_secs(&name, "run_duration_secs", secs))
            .transpose()?;

        let backfill_span = tick_interval.checked_mul(cfg.num_gen_bars);
        if !backfill_span.is_some_and(|span| span <= MAX_SPAN) {
            return Err(Error::config(format!(
                "feed '{name}': {} backfill bars of {}s reach too far into the past",
                cfg.num_gen_bars, cfg.tick_interval_secs
            )));
        }

        if !cfg.live && run_duration.is_none() {
            return Err(Error::config(format!(
                "feed '{name}': a non-live feed needs run_duration_secs"
            )));
        }
        if !(cfg.starting_value.is_finite() && cfg.starting_value > 0.0) {
            return Err(Error::config(format!(
                "feed '{name}': starting_value must be positive, got {}",
                cfg.starting_value
            )));
        }
        if !(cfg.volatility.is_finite() && cfg.volatility >= 0.0) {
            return Err(Error::config(format!(
                "feed '{name}': volatility must be >= 0, got {}",
                cfg.volatility
            )));
        }

        let walk = PriceWalk::new(&name, cfg.starting_value, cfg.volatility, cfg.seed)?;
        let span = info_span!(
            "feed",
            name = %name,
            domain = cfg.trading_domain.as_deref().unwrap_or("-")
        );

        Ok(Self {
            cfg,
            tick_interval,
            start_delay,
            run_duration,
            walk,
            clock: None,
            delay_served: false,
            backfill_left: 0,
            paced: 0,
            next_offset: Some(tick_interval),
            done: false,
            span,
        })
    }

    /// Replace the feed's logging span, e.g. to nest it under a run span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn name(&self) -> &str {
        &self.cfg.name
    }

    pub fn config(&self) -> &FeedConfig {
        &self.cfg
    }

    /// Produce the next bar, waiting for its slot when the feed is live.
    ///
    /// Returns `None` once the run duration has elapsed. Cancel-safe: state
    /// only advances after any wait has completed.
    pub async fn next_bar(&mut self) -> Option<Bar> {
        if self.done {
            return None;
        }

        let clock = match self.clock {
            Some(clock) => clock,
            None => {
                let clock = FeedClock::start();
                debug!(parent: &self.span, delay = ?self.start_delay, "Feed activated");
                self.clock = Some(clock);
                clock
            }
        };
        let Some(live_from) = clock.activated.checked_add(self.start_delay) else {
            return self.overflowed();
        };

        if !self.delay_served {
            if self.past_deadline(&clock, live_from) {
                return self.finish();
            }
            if self.cfg.live {
                tokio::time::sleep_until(live_from).await;
            }
            self.delay_served = true;
            self.backfill_left = self.cfg.num_gen_bars;
        }

        if self.backfill_left > 0 {
            let back = self.backfill_left;
            self.backfill_left -= 1;
            let timestamp = self
                .tick_interval
                .checked_mul(back)
                .and_then(to_chrono)
                .and_then(|offset| clock.timestamp(live_from)?.checked_sub_signed(offset));
            return match timestamp {
                Some(timestamp) => Some(self.walk.next_bar(timestamp)),
                None => self.overflowed(),
            };
        }

        let Some(due) = self.next_offset.and_then(|offset| live_from.checked_add(offset)) else {
            return self.overflowed();
        };
        if self.past_deadline(&clock, due) {
            return self.finish();
        }
        let Some(timestamp) = clock.timestamp(due) else {
            return self.overflowed();
        };
        if self.cfg.live {
            tokio::time::sleep_until(due).await;
        }
        self.paced += 1;
        self.next_offset = self
            .next_offset
            .and_then(|offset| offset.checked_add(self.tick_interval));
        Some(self.walk.next_bar(timestamp))
    }

    /// Push bars into `bar_tx` until the feed is exhausted, the receiver is
    /// dropped, or `shutdown` flips to `true`. A pending wait for the next
    /// slot is abandoned on shutdown.
    pub async fn run(mut self, bar_tx: mpsc::Sender<Bar>, mut shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async move {
            info!(
                timeframe = %self.cfg.timeframe,
                compression = self.cfg.compression,
                interval = ?self.tick_interval,
                backfill = self.cfg.num_gen_bars,
                "Feed started"
            );
            let mut listening = true;
            let mut emitted = 0u64;

            loop {
                if *shutdown.borrow() {
                    info!(emitted, "Feed cancelled");
                    return;
                }

                let next = tokio::select! {
                    biased;
                    changed = shutdown.changed(), if listening => {
                        if changed.is_err() {
                            // sender gone: nobody can cancel this feed any more
                            listening = false;
                        }
                        continue;
                    }
                    bar = self.next_bar() => bar,
                };

                match next {
                    Some(bar) => {
                        emitted += 1;
                        if bar_tx.send(bar).await.is_err() {
                            warn!("Bar channel closed, stopping feed");
                            return;
                        }
                    }
                    None => {
                        info!(emitted, "Feed exhausted");
                        return;
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn past_deadline(&self, clock: &FeedClock, at: Instant) -> bool {
        match self.run_duration {
            Some(limit) => clock.activated.checked_add(limit).is_some_and(|end| at >= end),
            None => false,
        }
    }

    fn finish(&mut self) -> Option<Bar> {
        debug!(parent: &self.span, paced = self.paced, "Run duration elapsed");
        self.done = true;
        None
    }

    /// The next slot lies beyond what the clocks can represent.
    fn overflowed(&mut self) -> Option<Bar> {
        warn!(parent: &self.span, paced = self.paced, "Feed clock overflowed, stopping feed");
        self.done = true;
        None
    }
}

/// Longest accepted interval, delay, run duration or backfill span.
const MAX_SPAN: Duration = Duration::from_secs(100 * 366 * 24 * 3600);

fn checked_secs(feed: &str, field: &str, secs: f64) -> Result<Duration> {
    let duration = Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::config(format!("feed '{feed}': {field}: {e}")))?;
    if duration > MAX_SPAN {
        return Err(Error::config(format!(
            "feed '{feed}': {field} must be at most {}s, got {secs}",
            MAX_SPAN.as_secs()
        )));
    }
    Ok(duration)
}

fn positive_secs(feed: &str, field: &str, secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(Error::config(format!("feed '{feed}': {field} must be > 0, got {secs}")));
    }
    checked_secs(feed, field, secs)
}

fn non_negative_secs(feed: &str, field: &str, secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs >= 0.0) {
        return Err(Error::config(format!("feed '{feed}': {field} must be >= 0, got {secs}")));
    }
    checked_secs(feed, field, secs)
}

fn to_chrono(d: Duration) -> Option<chrono::Duration> {
    chrono::Duration::from_std(d).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(name: &str) -> FeedConfig {
        FeedConfig {
            tick_interval_secs: 1.0,
            run_duration_secs: Some(10.0),
            seed: Some(3),
            ..FeedConfig::new(name)
        }
    }

    #[test]
    fn non_positive_tick_interval_is_config_error() {
        for bad in [0.0, -1.0, f64::NAN] {
            let result = SyntheticFeed::new(FeedConfig {
                tick_interval_secs: bad,
                ..cfg("data0")
            });
            assert!(matches!(result, Err(Error::Config(_))), "accepted {bad}");
        }
    }

    #[test]
    fn zero_compression_is_config_error() {
        let result = SyntheticFeed::new(FeedConfig {
            compression: 0,
            ..cfg("data0")
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn negative_start_delay_is_config_error() {
        let result = SyntheticFeed::new(FeedConfig {
            start_delay_secs: -3.0,
            ..cfg("data0")
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn offline_feed_needs_run_duration() {
        let result = SyntheticFeed::new(FeedConfig {
            live: false,
            run_duration_secs: None,
            ..cfg("data0")
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn oversized_durations_are_config_errors() {
        let cases = [
            FeedConfig {
                start_delay_secs: 1e19,
                ..cfg("data0")
            },
            FeedConfig {
                tick_interval_secs: 1e10,
                num_gen_bars: 1000,
                ..cfg("data0")
            },
            FeedConfig {
                run_duration_secs: Some(1e12),
                ..cfg("data0")
            },
            // each interval fits, the backfill span does not
            FeedConfig {
                tick_interval_secs: 86_400.0 * 365.0,
                num_gen_bars: 1000,
                ..cfg("data0")
            },
        ];
        for case in cases {
            let result = SyntheticFeed::new(case.clone());
            assert!(matches!(result, Err(Error::Config(_))), "accepted {case:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn long_backfill_within_limits_is_emitted() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            tick_interval_secs: 86_400.0,
            num_gen_bars: 1000,
            run_duration_secs: None,
            ..cfg("data0")
        })
        .unwrap();
        let first = feed.next_bar().await.unwrap();
        for _ in 1..1000 {
            feed.next_bar().await.unwrap();
        }
        let paced = feed.next_bar().await.unwrap();
        assert_eq!(paced.timestamp - first.timestamp, chrono::Duration::days(1001));
    }

    #[tokio::test(start_paused = true)]
    async fn paced_count_beyond_u32_keeps_time_moving_forward() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            tick_interval_secs: 1e-6,
            run_duration_secs: None,
            ..cfg("data0")
        })
        .unwrap();
        let before = feed.next_bar().await.unwrap();
        feed.paced = u64::from(u32::MAX);
        let after = feed.next_bar().await.unwrap();
        assert_eq!(feed.paced, u64::from(u32::MAX) + 1);
        assert!(after.timestamp > before.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_overflow_ends_feed_instead_of_panicking() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            run_duration_secs: None,
            ..cfg("data0")
        })
        .unwrap();
        feed.next_bar().await.unwrap();
        feed.next_offset = Some(Duration::MAX);
        assert!(feed.next_bar().await.is_none());
        assert!(feed.next_bar().await.is_none());

        let mut feed = SyntheticFeed::new(FeedConfig {
            run_duration_secs: None,
            ..cfg("data0")
        })
        .unwrap();
        feed.next_offset = None;
        assert!(feed.next_bar().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn paced_bars_arrive_one_interval_apart() {
        let mut feed = SyntheticFeed::new(cfg("data0")).unwrap();
        let start = Instant::now();

        let first = feed.next_bar().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        let second = feed.next_bar().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(second.timestamp - first.timestamp, chrono::Duration::seconds(1));
        assert_eq!(second.open, first.close);
    }

    #[tokio::test(start_paused = true)]
    async fn run_duration_bounds_emission() {
        // Slots at 1..=9 s fall before the 10 s deadline; the 10 s slot does not.
        let mut feed = SyntheticFeed::new(cfg("data0")).unwrap();
        let start = Instant::now();
        let mut count = 0;
        while feed.next_bar().await.is_some() {
            assert!(start.elapsed() < Duration::from_secs(10));
            count += 1;
        }
        assert_eq!(count, 9);
        assert!(feed.next_bar().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn backfill_precedes_paced_bars_after_delay() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            num_gen_bars: 5,
            start_delay_secs: 3.0,
            ..cfg("data1")
        })
        .unwrap();
        let start = Instant::now();

        let mut backfill = Vec::new();
        for _ in 0..5 {
            backfill.push(feed.next_bar().await.unwrap());
            assert_eq!(start.elapsed(), Duration::from_secs(3));
        }
        let paced = feed.next_bar().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(4));

        for pair in backfill.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        assert!(backfill[4].timestamp < paced.timestamp);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_beyond_run_duration_emits_nothing() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            start_delay_secs: 20.0,
            num_gen_bars: 4,
            ..cfg("data0")
        })
        .unwrap();
        assert!(feed.next_bar().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_feed_does_not_sleep() {
        let mut feed = SyntheticFeed::new(FeedConfig {
            live: false,
            num_gen_bars: 2,
            ..cfg("data0")
        })
        .unwrap();
        let start = Instant::now();
        let mut count = 0;
        while feed.next_bar().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2 + 9);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_pending_wait() {
        let feed = SyntheticFeed::new(FeedConfig {
            tick_interval_secs: 3600.0,
            run_duration_secs: None,
            ..cfg("data0")
        })
        .unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(feed.run(tx, stop_rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        stop_tx.send(true).unwrap();

        handle.await.unwrap();
        assert!(rx.recv().await.is_none(), "no bar expected before the first slot");
    }
}
