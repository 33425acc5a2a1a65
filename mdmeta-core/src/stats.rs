use serde::Serialize;

///
/// Streaming mean/variance accumulator (Welford's online algorithm).
///
/// Keeps `(count, mean, m2)` only, so aggregating a multi-gigabyte log uses
/// the same memory as aggregating ten frames.
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StreamingStats {
    pub count: u64,
    pub mean: f64,
    pub m2: f64,
}

impl StreamingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / self.count as f64
    }

    /// Sample variance (Bessel's correction).
    pub fn sample_variance(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        self.m2 / (self.count - 1) as f64
    }

    /// Sample standard deviation.
    pub fn stdev(&self) -> f64 {
        self.sample_variance().sqrt()
    }

    /// `(mean, stdev)` when at least one sample was seen.
    ///
    /// A single sample reports a stdev of exactly zero.
    pub fn summary(&self) -> Option<(f64, f64)> {
        match self.count {
            0 => None,
            1 => Some((self.mean, 0.0)),
            _ => Some((self.mean, self.stdev())),
        }
    }
}
