use std::time::Duration;

use common::FeedConfig;
use feed::SyntheticFeed;
use proptest::prelude::*;
use tokio::time::Instant;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Backfill bars come first, all bars are time-ordered, nothing paced
    /// appears before the start delay and nothing at all after the deadline.
    #[test]
    fn feed_respects_backfill_delay_and_deadline(
        num_gen_bars in 0u32..20,
        start_delay in 0u32..5,
        tick_interval in 1u32..4,
        run_duration in 1u32..40,
        seed in any::<u64>(),
    ) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cfg = FeedConfig {
                num_gen_bars,
                start_delay_secs: f64::from(start_delay),
                tick_interval_secs: f64::from(tick_interval),
                run_duration_secs: Some(f64::from(run_duration)),
                seed: Some(seed),
                ..FeedConfig::new("data0")
            };
            let mut feed = SyntheticFeed::new(cfg).unwrap();
            let start = Instant::now();
            let delay = Duration::from_secs(u64::from(start_delay));
            let deadline = Duration::from_secs(u64::from(run_duration));

            let mut bars = Vec::new();
            let mut arrivals = Vec::new();
            while let Some(bar) = feed.next_bar().await {
                arrivals.push(start.elapsed());
                bars.push(bar);
            }

            for pair in bars.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
            for at in &arrivals {
                assert!(*at < deadline, "bar at {at:?} past deadline {deadline:?}");
                assert!(*at >= delay, "bar at {at:?} before start delay {delay:?}");
            }

            if start_delay < run_duration {
                let k = num_gen_bars as usize;
                assert!(bars.len() >= k);
                // backfill arrives as one burst at the end of the delay
                assert!(arrivals[..k].iter().all(|at| *at == delay));
                assert!(arrivals[k..].iter().all(|at| *at > delay));
            } else {
                assert!(bars.is_empty());
            }
        });
    }
}
