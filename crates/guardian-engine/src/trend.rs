//! Risk trend tracking across repeated assessments.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::stats::clamp01;
use crate::types::RiskMetrics;

/// Snapshots kept by default.
pub const DEFAULT_HISTORY: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub timestamp: DateTime<Utc>,
    pub metrics: RiskMetrics,
}

/// Least-squares slope of each aggregate per snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskTrends {
    pub overall: f64,
    pub cascade: f64,
    pub vulnerability: f64,
    pub resilience: f64,
}

/// Aggregates projected forward along their trends, clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskForecast {
    pub steps_ahead: u32,
    pub overall_score: f64,
    pub cascade_potential: f64,
    pub vulnerability_density: f64,
    pub resilience_score: f64,
}

/// Bounded history of risk snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct RiskTrendAnalyzer {
    history: VecDeque<RiskSnapshot>,
    capacity: usize,
}

impl Default for RiskTrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskTrendAnalyzer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a snapshot, evicting the oldest past capacity.
    pub fn record(&mut self, timestamp: DateTime<Utc>, metrics: RiskMetrics) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(RiskSnapshot { timestamp, metrics });
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &RiskSnapshot> {
        self.history.iter()
    }

    /// All zero with fewer than two snapshots.
    pub fn trends(&self) -> RiskTrends {
        if self.history.len() < 2 {
            return RiskTrends::default();
        }
        let series = |f: fn(&RiskMetrics) -> f64| -> f64 {
            let values: Vec<f64> = self.history.iter().map(|s| f(&s.metrics)).collect();
            linear_slope(&values)
        };
        RiskTrends {
            overall: series(|m| m.overall_score),
            cascade: series(|m| m.cascade_potential),
            vulnerability: series(|m| m.vulnerability_density),
            resilience: series(|m| m.resilience_score),
        }
    }

    /// Project the latest snapshot `steps_ahead` snapshot intervals forward.
    /// `None` without history.
    pub fn forecast(&self, steps_ahead: u32) -> Option<RiskForecast> {
        let latest = &self.history.back()?.metrics;
        let trends = self.trends();
        let step = f64::from(steps_ahead);
        Some(RiskForecast {
            steps_ahead,
            overall_score: clamp01(latest.overall_score + trends.overall * step),
            cascade_potential: clamp01(latest.cascade_potential + trends.cascade * step),
            vulnerability_density: clamp01(
                latest.vulnerability_density + trends.vulnerability * step,
            ),
            resilience_score: clamp01(latest.resilience_score + trends.resilience * step),
        })
    }
}

/// Ordinary least-squares slope against the sample index.
fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResilienceBreakdown;
    use chrono::Duration;

    fn metrics(overall: f64, resilience: f64) -> RiskMetrics {
        RiskMetrics {
            overall_score: overall,
            tier_1_exposure: 0.0,
            cascade_potential: 0.2,
            single_point_failures: 0,
            critical_path_count: 0,
            vulnerability_density: 0.0,
            resilience_score: resilience,
            resilience: ResilienceBreakdown {
                redundancy: resilience,
                evenness: resilience,
                connectivity: resilience,
                tier_diversity: resilience,
            },
            degraded_metrics: Vec::new(),
            predictor_degraded: false,
        }
    }

    #[test]
    fn test_slope() {
        assert!((linear_slope(&[0.1, 0.2, 0.3, 0.4]) - 0.1).abs() < 1e-12);
        assert_eq!(linear_slope(&[0.5, 0.5, 0.5]), 0.0);
        assert_eq!(linear_slope(&[0.5]), 0.0);
    }

    #[test]
    fn test_trends_and_forecast() {
        let mut analyzer = RiskTrendAnalyzer::new();
        assert!(analyzer.forecast(5).is_none());

        let start = Utc::now();
        for day in 0..4 {
            analyzer.record(
                start + Duration::days(day),
                metrics(0.2 + 0.1 * day as f64, 0.8),
            );
        }
        let trends = analyzer.trends();
        assert!((trends.overall - 0.1).abs() < 1e-9);
        assert_eq!(trends.resilience, 0.0);
        assert_eq!(trends.cascade, 0.0);

        let forecast = analyzer.forecast(2).unwrap();
        assert!((forecast.overall_score - 0.7).abs() < 1e-9);
        assert_eq!(forecast.resilience_score, 0.8);

        // Clamped at 1.
        assert_eq!(analyzer.forecast(30).unwrap().overall_score, 1.0);
    }

    #[test]
    fn test_single_snapshot_has_flat_trend() {
        let mut analyzer = RiskTrendAnalyzer::new();
        analyzer.record(Utc::now(), metrics(0.4, 0.6));
        assert_eq!(analyzer.trends(), RiskTrends::default());
        assert_eq!(analyzer.forecast(10).unwrap().overall_score, 0.4);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut analyzer = RiskTrendAnalyzer::with_capacity(3);
        for i in 0..5 {
            analyzer.record(Utc::now(), metrics(i as f64 / 10.0, 0.5));
        }
        assert_eq!(analyzer.len(), 3);
        let first = analyzer.snapshots().next().unwrap();
        assert!((first.metrics.overall_score - 0.2).abs() < 1e-12);
    }
}
