//! Running mean accumulator.

use airprox_env::Wind;
use nalgebra::Vector2;

/// Sum/count accumulator; `mean()` is `None` until something was added.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Averager {
    sum: f64,
    count: usize,
}

impl Averager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, x: f64) {
        self.sum += x;
        self.count += 1;
    }

    /// Folds another accumulator into this one.
    pub fn merge(&mut self, other: &Averager) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    pub fn mean_or(&self, default: f64) -> f64 {
        self.mean().unwrap_or(default)
    }
}

/// Vector flavour for wind averages.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindAverager {
    sum: Vector2<f64>,
    count: usize,
}

impl WindAverager {
    pub fn add(&mut self, wind: &Wind) {
        self.sum += Vector2::new(wind.east, wind.north);
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> Option<Wind> {
        (self.count > 0).then(|| {
            let m = self.sum / self.count as f64;
            Wind::new(m.x, m.y)
        })
    }
}
