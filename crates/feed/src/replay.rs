use chrono::DateTime;

use common::{Bar, Error, ReplayConfig, Result};

/// The developing replayed bar after folding one finer bar into it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayUpdate {
    pub bar: Bar,
    /// 1-based count of replayed bars so far.
    pub index: u64,
    /// True when this update opened a new bar.
    pub is_new: bool,
}

/// Folds a feed's bars into coarser bars, delivering the partially built
/// bar on every incoming tick.
///
/// Buckets are aligned to the Unix epoch: a bar covers
/// `[k * period, (k + 1) * period)` where `period = timeframe * compression`.
/// A bar stamped before the current bucket is folded into the current one.
#[derive(Debug)]
pub struct Replayer {
    period_micros: i64,
    current: Option<(i64, Bar)>,
    index: u64,
}

impl Replayer {
    pub fn new(cfg: ReplayConfig) -> Result<Self> {
        if cfg.compression == 0 {
            return Err(Error::config("replay compression must be >= 1"));
        }
        let unit = cfg.timeframe.period().ok_or_else(|| {
            Error::config(format!("cannot replay into '{}': no fixed period", cfg.timeframe))
        })?;
        let period_micros = unit
            .num_microseconds()
            .and_then(|us| us.checked_mul(i64::from(cfg.compression)))
            .ok_or_else(|| Error::config("replay period overflows"))?;

        Ok(Self {
            period_micros,
            current: None,
            index: 0,
        })
    }

    pub fn push(&mut self, bar: &Bar) -> ReplayUpdate {
        let bucket = bar.timestamp.timestamp_micros().div_euclid(self.period_micros);

        if let Some((current_bucket, developing)) = self.current.as_mut() {
            if bucket <= *current_bucket {
                developing.high = developing.high.max(bar.high);
                developing.low = developing.low.min(bar.low);
                developing.close = bar.close;
                developing.volume += bar.volume;
                developing.open_interest = bar.open_interest;
                developing.timestamp = developing.timestamp.max(bar.timestamp);

                return ReplayUpdate {
                    bar: developing.clone(),
                    index: self.index,
                    is_new: false,
                };
            }
        }

        self.index += 1;
        self.current = Some((bucket, bar.clone()));
        ReplayUpdate {
            bar: bar.clone(),
            index: self.index,
            is_new: true,
        }
    }

    /// Start of the bucket currently being built.
    pub fn bucket_start(&self) -> Option<DateTime<chrono::Utc>> {
        self.current
            .as_ref()
            .and_then(|(bucket, _)| DateTime::from_timestamp_micros(bucket * self.period_micros))
    }

    /// Number of replayed bars opened so far.
    pub fn len(&self) -> u64 {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::TimeFrame;

    fn tick(secs: i64, price: f64) -> Bar {
        Bar {
            instrument: "data0".into(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1.0,
            open_interest: 0.0,
        }
    }

    fn minute_replayer() -> Replayer {
        Replayer::new(ReplayConfig {
            timeframe: TimeFrame::Seconds,
            compression: 60,
        })
        .unwrap()
    }

    #[test]
    fn ticks_cannot_be_a_replay_target() {
        let result = Replayer::new(ReplayConfig {
            timeframe: TimeFrame::Ticks,
            compression: 1,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn zero_compression_is_rejected() {
        let result = Replayer::new(ReplayConfig {
            timeframe: TimeFrame::Seconds,
            compression: 0,
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn developing_bar_accumulates_within_bucket() {
        let mut replayer = minute_replayer();

        let first = replayer.push(&tick(120, 10.0));
        assert!(first.is_new);
        assert_eq!(first.index, 1);

        replayer.push(&tick(121, 12.0));
        let update = replayer.push(&tick(179, 9.0));
        assert!(!update.is_new);
        assert_eq!(update.index, 1);
        assert_eq!(update.bar.open, 10.0);
        assert_eq!(update.bar.high, 12.0);
        assert_eq!(update.bar.low, 9.0);
        assert_eq!(update.bar.close, 9.0);
        assert_eq!(update.bar.volume, 3.0);
        assert_eq!(update.bar.timestamp, Utc.timestamp_opt(179, 0).unwrap());
        assert_eq!(replayer.bucket_start(), Some(Utc.timestamp_opt(120, 0).unwrap()));
    }

    #[test]
    fn crossing_a_boundary_opens_a_new_bar() {
        let mut replayer = minute_replayer();
        replayer.push(&tick(150, 10.0));
        let update = replayer.push(&tick(180, 11.0));
        assert!(update.is_new);
        assert_eq!(update.index, 2);
        assert_eq!(update.bar.open, 11.0);
        assert_eq!(replayer.len(), 2);
    }

    #[test]
    fn late_bar_folds_into_current_bucket() {
        let mut replayer = minute_replayer();
        replayer.push(&tick(200, 10.0));
        let update = replayer.push(&tick(100, 4.0));
        assert!(!update.is_new);
        assert_eq!(update.bar.low, 4.0);
        assert_eq!(update.bar.timestamp, Utc.timestamp_opt(200, 0).unwrap());
    }
}
