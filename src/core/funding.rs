//! Funding rate evaluation
//!
//! The strategy is worth holding while funding pays the short side with
//! enough margin over its own noise: `mean − stddev > 0` over the lookback
//! window, using the sample standard deviation (n − 1 denominator).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::types::FundingSample;
use crate::error::AppError;

/// Minimum number of samples for a verdict
pub const MIN_SAMPLES: usize = 2;

/// Outcome of one funding evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FundingVerdict {
    Profitable,
    Unprofitable,
    /// Fewer than `MIN_SAMPLES` samples; the caller holds current state
    InsufficientData,
}

/// Summary statistics of the funding window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingStats {
    pub mean: f64,
    pub stddev: f64,
    pub count: usize,
}

impl FundingStats {
    /// `None` for fewer than two samples
    pub fn compute(rates: &[f64]) -> Option<Self> {
        let n = rates.len();
        if n < MIN_SAMPLES {
            return None;
        }
        let mean = rates.iter().sum::<f64>() / n as f64;
        let var = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(Self {
            mean,
            stddev: var.sqrt(),
            count: n,
        })
    }

    pub fn is_profitable(&self) -> bool {
        self.mean - self.stddev > 0.0
    }
}

/// `true` iff `mean − stddev > 0`; `InsufficientData` below two samples
pub fn is_profitable(rates: &[f64]) -> Result<bool, AppError> {
    FundingStats::compute(rates)
        .map(|s| s.is_profitable())
        .ok_or(AppError::InsufficientData {
            samples: rates.len(),
            required: MIN_SAMPLES,
        })
}

/// Owns the rolling funding window
#[derive(Debug, Clone)]
pub struct FundingRateEvaluator {
    lookback: Duration,
    sampling_interval: Duration,
    samples: Vec<FundingSample>,
}

impl FundingRateEvaluator {
    pub fn new(lookback: Duration, sampling_interval: Duration) -> Self {
        Self {
            lookback,
            sampling_interval,
            samples: Vec::new(),
        }
    }

    pub fn lookback(&self) -> Duration {
        self.lookback
    }

    /// Window size: lookback / sampling interval
    pub fn capacity(&self) -> usize {
        let interval = self.sampling_interval.num_seconds().max(1);
        (self.lookback.num_seconds() / interval).max(MIN_SAMPLES as i64) as usize
    }

    pub fn samples(&self) -> &[FundingSample] {
        &self.samples
    }

    /// Merge fresh samples, drop those outside the lookback, dedupe by
    /// timestamp (newest value wins) and keep at most `capacity()` newest.
    pub fn refresh(&mut self, now: DateTime<Utc>, fresh: Vec<FundingSample>) {
        let cutoff = now - self.lookback;
        self.samples.extend(fresh);
        self.samples.retain(|s| s.timestamp >= cutoff && s.timestamp <= now);
        // Stable sort keeps insertion order among equal timestamps, so the
        // last one in each run is the freshest
        self.samples.sort_by_key(|s| s.timestamp);
        let mut deduped: Vec<FundingSample> = Vec::with_capacity(self.samples.len());
        for sample in self.samples.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.timestamp == sample.timestamp => *last = sample,
                _ => deduped.push(sample),
            }
        }
        let cap = self.capacity();
        if deduped.len() > cap {
            deduped.drain(..deduped.len() - cap);
        }
        self.samples = deduped;
    }

    pub fn stats(&self) -> Option<FundingStats> {
        let rates: Vec<f64> = self.samples.iter().map(|s| s.rate).collect();
        FundingStats::compute(&rates)
    }

    pub fn verdict(&self) -> FundingVerdict {
        match self.stats() {
            Some(stats) if stats.is_profitable() => FundingVerdict::Profitable,
            Some(_) => FundingVerdict::Unprofitable,
            None => FundingVerdict::InsufficientData,
        }
    }
}
