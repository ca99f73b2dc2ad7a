use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};

use common::{Bar, Error, Result};

/// Additive random walk producing OHLCV bars.
///
/// Each bar opens at the previous close. Prices never drop below 1% of the
/// starting value.
pub(crate) struct PriceWalk {
    instrument: String,
    rng: StdRng,
    step: Normal<f64>,
    volume: Uniform<f64>,
    floor: f64,
    last_close: f64,
}

impl PriceWalk {
    pub(crate) fn new(
        instrument: &str,
        starting_value: f64,
        volatility: f64,
        seed: Option<u64>,
    ) -> Result<Self> {
        let std_dev = volatility * starting_value / 100.0;
        let step = Normal::new(0.0, std_dev)
            .map_err(|e| Error::config(format!("feed '{instrument}': invalid volatility: {e}")))?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            instrument: instrument.to_string(),
            rng,
            step,
            volume: Uniform::new(1.0, 1000.0),
            floor: starting_value * 0.01,
            last_close: starting_value,
        })
    }

    pub(crate) fn next_bar(&mut self, timestamp: DateTime<Utc>) -> Bar {
        let open = self.last_close;
        let close = (open + self.step.sample(&mut self.rng)).max(self.floor);
        let excursion = self.step.sample(&mut self.rng).abs() / 2.0;

        let upper = open.max(close);
        let lower = open.min(close);
        let high = upper + excursion;
        let low = (lower - excursion).max(lower * 0.5);

        self.last_close = close;

        Bar {
            instrument: self.instrument.clone(),
            timestamp,
            open,
            high,
            low,
            close,
            volume: self.volume.sample(&mut self.rng).floor(),
            open_interest: 0.0,
        }
    }
}
