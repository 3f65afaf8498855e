//! Per-entity folding of tick samples into instantaneous, windowed and cumulative averages.

use serde::Serialize;
use crate::errors::ConfigError;
use crate::ring_average::RingAverage;

pub const DEFAULT_WINDOWS: [usize; 3] = [60, 300, 1500];

/// Every window must hold at least one tick.
pub fn validate_windows(windows: &[usize; 3]) -> Result<(), ConfigError> {
    if windows.contains(&0) {
        return Err(ConfigError::Invalid {
            field: "metrics_windows",
            message: "windows must hold at least one tick".to_string(),
        });
    }
    Ok(())
}

/// Sample produced by one node tick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TickMetrics {
    /// Fraction of the node's cores used during the tick.
    pub cpu_usage: f64,
    /// Fraction of the node's memory used during the tick.
    pub mem_usage: f64,
    /// Sum of the loads reported by the ticked pods.
    pub load: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct WindowedMetric {
    pub last_tick: f64,
    pub average: f64,
    pub short_window: f64,
    pub medium_window: f64,
    pub long_window: f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct PeriodMetrics {
    pub cpu: WindowedMetric,
    pub mem: WindowedMetric,
    pub load: WindowedMetric,
}

#[derive(Clone, Debug)]
struct QuantityAggregator {
    sum: f64,
    short: RingAverage,
    medium: RingAverage,
    long: RingAverage,
}

impl QuantityAggregator {
    fn new(windows: [usize; 3]) -> Self {
        Self {
            sum: 0.0,
            short: RingAverage::new(windows[0]),
            medium: RingAverage::new(windows[1]),
            long: RingAverage::new(windows[2]),
        }
    }

    fn fold(&mut self, value: f64, count: u64) -> WindowedMetric {
        self.sum += value;
        WindowedMetric {
            last_tick: value,
            average: self.sum / count as f64,
            short_window: self.short.add(value),
            medium_window: self.medium.add(value),
            long_window: self.long.add(value),
        }
    }
}

/// Owned by exactly one node (or service) and touched only from its tick.
#[derive(Clone, Debug)]
pub struct MetricsAggregator {
    count: u64,
    cpu: QuantityAggregator,
    mem: QuantityAggregator,
    load: QuantityAggregator,
    latest: Option<PeriodMetrics>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOWS)
    }
}

impl MetricsAggregator {
    /// `windows` are the short, medium and long window capacities in ticks.
    pub fn new(windows: [usize; 3]) -> Self {
        Self {
            count: 0,
            cpu: QuantityAggregator::new(windows),
            mem: QuantityAggregator::new(windows),
            load: QuantityAggregator::new(windows),
            latest: None,
        }
    }

    pub fn aggregate(&mut self, sample: TickMetrics) -> PeriodMetrics {
        self.count += 1;
        let metrics = PeriodMetrics {
            cpu: self.cpu.fold(sample.cpu_usage, self.count),
            mem: self.mem.fold(sample.mem_usage, self.count),
            load: self.load.fold(sample.load, self.count),
        };
        self.latest = Some(metrics);
        metrics
    }

    pub fn get(&self) -> Option<PeriodMetrics> {
        self.latest
    }

    pub fn sample_count(&self) -> u64 {
        self.count
    }
}
