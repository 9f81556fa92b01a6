// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Noderr Protocol Foundation
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed-capacity ring buffer for rolling metric samples.
///
/// Grows up to `capacity`, then overwrites the oldest slot. Iteration is
/// always oldest-to-newest. Memory never exceeds capacity regardless of
/// how many samples are pushed.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    slots: Vec<T>,
    head: usize,
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    /// Create an empty window holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity.max(1)),
            head: 0,
            capacity: capacity.max(1),
        }
    }

    /// Number of samples currently held
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Push a sample, evicting the oldest if the window is full
    pub fn push(&mut self, sample: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(sample);
        } else {
            self.slots[self.head] = sample;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (older, newer) = self.slots.split_at(self.head.min(self.slots.len()));
        newer.iter().chain(older.iter())
    }

    /// The most recent `n` samples, oldest first
    pub fn last_n(&self, n: usize) -> Vec<T> {
        let all: Vec<&T> = self.iter().collect();
        let start = all.len().saturating_sub(n);
        all[start..].iter().map(|s| (*s).clone()).collect()
    }

    /// The most recent sample, if any
    pub fn latest(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else if self.slots.len() < self.capacity {
            self.slots.last()
        } else {
            let idx = (self.head + self.capacity - 1) % self.capacity;
            self.slots.get(idx)
        }
    }
}

/// One observation of ATR values on a timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtrSample {
    pub timestamp: DateTime<Utc>,
    pub atr_14: f64,
    pub atr_50: f64,
}

/// One observation of a candle's wick-to-body ratio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WickSample {
    pub timestamp: DateTime<Utc>,
    pub ratio: f64,
}

/// One observation of normalized Bollinger band width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidthSample {
    pub timestamp: DateTime<Utc>,
    pub width: f64,
}

/// Direction of the short-horizon ATR trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtrTrendDirection {
    Rising,
    Declining,
    Stable,
    /// Fewer than five samples observed so far
    InsufficientData,
}

/// ATR trend metrics for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtrTrend {
    pub direction: AtrTrendDirection,
    /// Regression slope in ATR units per minute
    pub slope: f64,
    /// Slope as a percent of the window's first ATR-14 value
    pub slope_pct: f64,
    /// Latest ATR-14 / ATR-50
    pub atr_ratio: f64,
    /// True when atr_ratio exceeds the configured baseline multiple
    pub is_above_baseline: bool,
    /// Samples available when computed
    pub samples: usize,
}

impl AtrTrend {
    fn insufficient(samples: usize, atr_ratio: f64, is_above_baseline: bool) -> Self {
        Self {
            direction: AtrTrendDirection::InsufficientData,
            slope: 0.0,
            slope_pct: 0.0,
            atr_ratio,
            is_above_baseline,
            samples,
        }
    }
}

/// Compute the ATR trend over the most recent five samples.
///
/// Slope comes from a least-squares fit of ATR-14 against elapsed minutes
/// since the first sample in the fit window. Direction thresholds are on
/// the slope expressed as a percent of the window's first ATR-14 value.
pub fn compute_atr_trend(
    window: &RollingWindow<AtrSample>,
    slope_threshold_pct: f64,
    baseline_ratio: f64,
) -> AtrTrend {
    let latest_ratio = window
        .latest()
        .map(|s| {
            if s.atr_50 > 0.0 && s.atr_50.is_finite() && s.atr_14.is_finite() {
                s.atr_14 / s.atr_50
            } else {
                1.0
            }
        })
        .unwrap_or(1.0);
    let above = latest_ratio > baseline_ratio;

    if window.len() < 5 {
        return AtrTrend::insufficient(window.len(), latest_ratio, above);
    }

    let recent = window.last_n(5);
    let first_ts = recent[0].timestamp;
    let first_atr = recent[0].atr_14;

    let points: Vec<(f64, f64)> = recent
        .iter()
        .map(|s| {
            let x = s.timestamp.signed_duration_since(first_ts).num_seconds() as f64 / 60.0;
            (x, s.atr_14)
        })
        .collect();

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|(x, _)| x).sum();
    let sum_y: f64 = points.iter().map(|(_, y)| y).sum();
    let sum_xy: f64 = points.iter().map(|(x, y)| x * y).sum();
    let sum_x2: f64 = points.iter().map(|(x, _)| x * x).sum();

    let denom = n * sum_x2 - sum_x * sum_x;
    let slope = if denom.abs() > f64::EPSILON {
        (n * sum_xy - sum_x * sum_y) / denom
    } else {
        0.0
    };

    let slope_pct = if first_atr.abs() > f64::EPSILON && first_atr.is_finite() {
        slope / first_atr * 100.0
    } else {
        0.0
    };

    let direction = if !slope_pct.is_finite() {
        AtrTrendDirection::Stable
    } else if slope_pct > slope_threshold_pct {
        AtrTrendDirection::Rising
    } else if slope_pct < -slope_threshold_pct {
        AtrTrendDirection::Declining
    } else {
        AtrTrendDirection::Stable
    };

    AtrTrend {
        direction,
        slope,
        slope_pct,
        atr_ratio: latest_ratio,
        is_above_baseline: above,
        samples: window.len(),
    }
}

/// Wick-to-body variance metrics for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WickVariance {
    /// Most recent wick-to-body ratio
    pub latest_ratio: f64,
    /// Variance of the last ten ratios (0 until ten samples exist)
    pub recent_variance: f64,
    /// Percent change of recent variance against the prior ten-sample
    /// window (0 until twenty samples exist)
    pub change_pct: f64,
    /// True when the recent variance is above the prior window's
    pub is_increasing: bool,
    pub samples: usize,
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Compare wick-ratio variance over the last ten samples against the
/// prior ten
pub fn compute_wick_variance(window: &RollingWindow<WickSample>) -> WickVariance {
    let latest_ratio = window.latest().map(|s| s.ratio).unwrap_or(0.0);
    let samples = window.len();

    if samples < 10 {
        return WickVariance {
            latest_ratio,
            recent_variance: 0.0,
            change_pct: 0.0,
            is_increasing: false,
            samples,
        };
    }

    let last20 = window.last_n(20);
    let split = last20.len().saturating_sub(10);
    let recent: Vec<f64> = last20[split..].iter().map(|s| s.ratio).collect();
    let recent_variance = variance(&recent);

    if samples < 20 {
        return WickVariance {
            latest_ratio,
            recent_variance,
            change_pct: 0.0,
            is_increasing: false,
            samples,
        };
    }

    let prior: Vec<f64> = last20[..split].iter().map(|s| s.ratio).collect();
    let prior_variance = variance(&prior);

    let change_pct = if prior_variance.abs() > f64::EPSILON {
        (recent_variance - prior_variance) / prior_variance * 100.0
    } else {
        0.0
    };

    WickVariance {
        latest_ratio,
        recent_variance,
        change_pct,
        is_increasing: recent_variance > prior_variance,
        samples,
    }
}

/// Bollinger band width metrics for one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidthMetrics {
    /// Most recent normalized width
    pub width: f64,
    /// Width change per sample over the last five samples
    pub slope: f64,
    /// Percentile rank of the current width within the window [0, 100]
    pub percentile: f64,
    /// True when the percentile is below the narrow threshold and at
    /// least ten samples exist
    pub is_narrow: bool,
    pub samples: usize,
}

/// Rank the current width within the retained history and measure its
/// short-horizon slope
pub fn compute_width_metrics(
    window: &RollingWindow<WidthSample>,
    narrow_percentile: f64,
) -> WidthMetrics {
    let samples = window.len();
    let width = window.latest().map(|s| s.width).unwrap_or(0.0);

    if samples == 0 {
        return WidthMetrics {
            width: 0.0,
            slope: 0.0,
            percentile: 50.0,
            is_narrow: false,
            samples: 0,
        };
    }

    let slope = if samples >= 2 {
        let recent = window.last_n(5);
        (recent[recent.len() - 1].width - recent[0].width) / (recent.len() - 1) as f64
    } else {
        0.0
    };

    let percentile = if samples >= 2 {
        let below = window.iter().filter(|s| s.width < width).count();
        below as f64 / (samples - 1) as f64 * 100.0
    } else {
        50.0
    };

    WidthMetrics {
        width,
        slope,
        percentile: percentile.min(100.0),
        is_narrow: samples >= 10 && percentile < narrow_percentile,
        samples,
    }
}

/// Bar-over-bar intrabar volatility comparison
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrabarMetrics {
    pub current_ratio: f64,
    pub previous_ratio: f64,
    /// Percent change current vs previous (0 when previous is ~0)
    pub change_pct: f64,
    pub is_rising: bool,
}

/// Compare the latest bar's range-to-body ratio against the prior bar's
pub fn compute_intrabar_metrics(current_ratio: f64, previous_ratio: f64) -> IntrabarMetrics {
    let current = if current_ratio.is_finite() { current_ratio } else { 0.0 };
    let previous = if previous_ratio.is_finite() { previous_ratio } else { 0.0 };

    let change_pct = if previous.abs() > f64::EPSILON {
        (current - previous) / previous * 100.0
    } else {
        0.0
    };

    IntrabarMetrics {
        current_ratio: current,
        previous_ratio: previous,
        change_pct,
        is_rising: current > previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap() + chrono::Duration::minutes(minute as i64)
    }

    fn atr_window(values: &[f64]) -> RollingWindow<AtrSample> {
        let mut w = RollingWindow::new(20);
        for (i, v) in values.iter().enumerate() {
            w.push(AtrSample {
                timestamp: ts(i as u32 * 15),
                atr_14: *v,
                atr_50: 1.0,
            });
        }
        w
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut w = RollingWindow::new(3);
        for i in 0..5 {
            w.push(i);
        }
        assert_eq!(w.len(), 3);
        let items: Vec<i32> = w.iter().copied().collect();
        assert_eq!(items, vec![2, 3, 4]);
        assert_eq!(w.latest(), Some(&4));
        assert_eq!(w.last_n(2), vec![3, 4]);
    }

    #[test]
    fn test_atr_trend_insufficient_below_five_samples() {
        let w = atr_window(&[1.0, 1.1, 1.2]);
        let trend = compute_atr_trend(&w, 5.0, 1.2);
        assert_eq!(trend.direction, AtrTrendDirection::InsufficientData);
        assert_eq!(trend.samples, 3);
    }

    #[test]
    fn test_atr_trend_rising() {
        // +0.1 per 15 minutes on a base of 1.0: slope% well above 5
        let w = atr_window(&[1.0, 1.1, 1.2, 1.3, 1.4]);
        let trend = compute_atr_trend(&w, 5.0, 1.2);
        assert_eq!(trend.direction, AtrTrendDirection::Rising);
        assert!(trend.slope > 0.0);
        assert!(trend.is_above_baseline);
    }

    #[test]
    fn test_atr_trend_declining() {
        let w = atr_window(&[1.4, 1.3, 1.2, 1.1, 1.0]);
        let trend = compute_atr_trend(&w, 5.0, 1.2);
        assert_eq!(trend.direction, AtrTrendDirection::Declining);
    }

    #[test]
    fn test_atr_trend_stable_on_flat_series() {
        let w = atr_window(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        let trend = compute_atr_trend(&w, 5.0, 1.2);
        assert_eq!(trend.direction, AtrTrendDirection::Stable);
        assert!(!trend.is_above_baseline);
    }

    #[test]
    fn test_atr_ratio_neutral_when_atr50_zero() {
        let mut w = RollingWindow::new(20);
        w.push(AtrSample {
            timestamp: ts(0),
            atr_14: 2.0,
            atr_50: 0.0,
        });
        let trend = compute_atr_trend(&w, 5.0, 1.2);
        assert_eq!(trend.atr_ratio, 1.0);
        assert!(!trend.is_above_baseline);
    }

    #[test]
    fn test_wick_variance_gates() {
        let mut w = RollingWindow::new(40);
        for i in 0..9 {
            w.push(WickSample {
                timestamp: ts(i),
                ratio: 0.5,
            });
        }
        let below_ten = compute_wick_variance(&w);
        assert_eq!(below_ten.recent_variance, 0.0);
        assert!(!below_ten.is_increasing);

        // Flat prior ten, oscillating recent ten: variance increases
        for i in 9..10 {
            w.push(WickSample {
                timestamp: ts(i),
                ratio: 0.5,
            });
        }
        for i in 10..20 {
            w.push(WickSample {
                timestamp: ts(i),
                ratio: if i % 2 == 0 { 0.1 } else { 1.5 },
            });
        }
        let full = compute_wick_variance(&w);
        assert!(full.recent_variance > 0.0);
        assert!(full.is_increasing);
        assert_eq!(full.samples, 20);
    }

    #[test]
    fn test_width_percentile_and_narrow() {
        let mut w = RollingWindow::new(20);
        for i in 0..12 {
            w.push(WidthSample {
                timestamp: ts(i),
                width: 1.0 + i as f64 * 0.1,
            });
        }
        // Latest width is the largest in the window
        let wide = compute_width_metrics(&w, 20.0);
        assert!(wide.percentile > 90.0);
        assert!(!wide.is_narrow);

        w.push(WidthSample {
            timestamp: ts(13),
            width: 0.1,
        });
        let narrow = compute_width_metrics(&w, 20.0);
        assert_eq!(narrow.percentile, 0.0);
        assert!(narrow.is_narrow);
        assert!(narrow.slope < 0.0);
    }

    #[test]
    fn test_intrabar_rising_and_zero_guard() {
        let rising = compute_intrabar_metrics(1.5, 1.0);
        assert!(rising.is_rising);
        assert!((rising.change_pct - 50.0).abs() < 1e-9);

        let guarded = compute_intrabar_metrics(1.5, 0.0);
        assert_eq!(guarded.change_pct, 0.0);
        assert!(guarded.is_rising);
    }
}
