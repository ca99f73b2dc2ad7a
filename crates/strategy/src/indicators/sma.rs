use std::collections::VecDeque;

/// Simple moving average over the last `period` values.
///
/// Returns `None` until `period` values have been pushed.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Add the latest value and return the current average.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.value()
    }

    /// Overwrite the most recent value, for a bar that is still forming.
    pub fn replace_last(&mut self, value: f64) -> Option<f64> {
        match self.window.back_mut() {
            Some(last) => {
                self.sum += value - *last;
                *last = value;
                self.value()
            }
            None => self.push(value),
        }
    }

    pub fn value(&self) -> Option<f64> {
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}
