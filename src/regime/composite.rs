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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market::{Timeframe, TimeframeSnapshot};
use crate::regime::RegimeConfig;

/// Composite indicator values blended across timeframes.
///
/// Each metric is weighted independently over the timeframes that can
/// contribute it, with the weights renormalized so missing data never
/// silently drags a metric toward zero. Availability flags record which
/// metrics had any contributor at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeIndicators {
    /// Weighted ATR-14 / ATR-50 ratio (1.0 when unavailable)
    pub atr_ratio: f64,
    /// Weighted current-width / trailing-median-width ratio (1.0 when unavailable)
    pub bb_width_ratio: f64,
    /// Weighted ADX (0.0 when unavailable)
    pub adx: f64,
    /// True when any contributing timeframe shows confirming volume
    pub volume_confirmed: bool,
    pub atr_available: bool,
    pub bb_available: bool,
    pub adx_available: bool,
    /// True when at least two timeframes agree on which side of the
    /// ATR baseline they sit
    pub multi_timeframe_agreement: bool,
    /// Timeframes that contributed at least one metric
    pub timeframes_used: Vec<String>,
}

impl Default for CompositeIndicators {
    fn default() -> Self {
        Self {
            atr_ratio: 1.0,
            bb_width_ratio: 1.0,
            adx: 0.0,
            volume_confirmed: false,
            atr_available: false,
            bb_available: false,
            adx_available: false,
            multi_timeframe_agreement: false,
            timeframes_used: Vec::new(),
        }
    }
}

fn weighted(values: &[(f64, f64)]) -> Option<f64> {
    let total: f64 = values.iter().map(|(w, _)| w).sum();
    if total <= f64::EPSILON {
        return None;
    }
    Some(values.iter().map(|(w, v)| w * v).sum::<f64>() / total)
}

/// Blend per-timeframe indicator readings into one composite view.
///
/// `width_medians` supplies the trailing median normalized band width per
/// timeframe, from the tracker history; the width ratio for a timeframe
/// is its current width divided by that median.
pub fn compute_composite(
    timeframe_data: &HashMap<Timeframe, TimeframeSnapshot>,
    width_medians: &HashMap<Timeframe, f64>,
    config: &RegimeConfig,
) -> CompositeIndicators {
    let mut atr_parts: Vec<(f64, f64)> = Vec::new();
    let mut bb_parts: Vec<(f64, f64)> = Vec::new();
    let mut adx_parts: Vec<(f64, f64)> = Vec::new();
    let mut volume_confirmed = false;
    let mut used: Vec<String> = Vec::new();
    let mut atr_sides: Vec<bool> = Vec::new();

    for (timeframe, weight) in &config.timeframe_weights {
        let snapshot = match timeframe_data.get(timeframe) {
            Some(s) => s,
            None => continue,
        };
        let mut contributed = false;

        if let (Some(atr_14), Some(atr_50)) = (snapshot.atr_14, snapshot.atr_50) {
            if atr_50 > 0.0 && atr_14.is_finite() && atr_50.is_finite() {
                let ratio = atr_14 / atr_50;
                atr_parts.push((*weight, ratio));
                atr_sides.push(ratio > config.atr_baseline_ratio);
                contributed = true;
            }
        }

        if let Some(width) = snapshot.normalized_width() {
            if let Some(median) = width_medians.get(timeframe) {
                if *median > f64::EPSILON && width.is_finite() {
                    bb_parts.push((*weight, width / median));
                    contributed = true;
                }
            }
        }

        if let Some(adx) = snapshot.adx {
            if adx.is_finite() && adx >= 0.0 {
                adx_parts.push((*weight, adx));
                contributed = true;
            }
        }

        if snapshot.volume_confirmed(config.volume_confirm_ratio) {
            volume_confirmed = true;
            contributed = true;
        }

        if contributed {
            used.push(timeframe.as_str().to_string());
        }
    }

    let atr_ratio = weighted(&atr_parts);
    let bb_width_ratio = weighted(&bb_parts);
    let adx = weighted(&adx_parts);

    // Agreement needs at least two ATR readings on the same side of baseline
    let multi_timeframe_agreement = atr_sides.len() >= 2
        && (atr_sides.iter().all(|s| *s) || atr_sides.iter().all(|s| !*s));

    debug!(
        atr = ?atr_ratio,
        bb = ?bb_width_ratio,
        adx = ?adx,
        timeframes = used.len(),
        "Composite indicators computed"
    );

    CompositeIndicators {
        atr_ratio: atr_ratio.unwrap_or(1.0),
        bb_width_ratio: bb_width_ratio.unwrap_or(1.0),
        adx: adx.unwrap_or(0.0),
        volume_confirmed,
        atr_available: atr_ratio.is_some(),
        bb_available: bb_width_ratio.is_some(),
        adx_available: adx.is_some(),
        multi_timeframe_agreement,
        timeframes_used: used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Candle, IndicatorSet};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn snapshot(atr_14: f64, atr_50: f64, adx: Option<f64>) -> TimeframeSnapshot {
        let candle = Candle::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100.5),
            dec!(1000),
        );
        TimeframeSnapshot::new(
            vec![candle],
            IndicatorSet {
                atr_14: Some(atr_14),
                atr_50: Some(atr_50),
                bollinger: None,
                adx,
            },
        )
    }

    #[test]
    fn test_missing_timeframes_renormalize_weights() {
        let config = RegimeConfig::default();
        let mut data = HashMap::new();
        // Only H1 present: composite ATR ratio equals its own, not
        // 0.5x of it
        data.insert(Timeframe::Hour1, snapshot(1.5, 1.0, Some(30.0)));

        let composite = compute_composite(&data, &HashMap::new(), &config);
        assert!((composite.atr_ratio - 1.5).abs() < 1e-9);
        assert!((composite.adx - 30.0).abs() < 1e-9);
        assert!(composite.atr_available);
        assert!(!composite.bb_available);
        assert!(!composite.multi_timeframe_agreement);
        assert_eq!(composite.timeframes_used, vec!["1h".to_string()]);
    }

    #[test]
    fn test_weighted_blend_two_timeframes() {
        let config = RegimeConfig::default();
        let mut data = HashMap::new();
        data.insert(Timeframe::Minute15, snapshot(1.0, 1.0, None));
        data.insert(Timeframe::Hour1, snapshot(2.0, 1.0, None));

        // Weights 0.3 and 0.5 renormalize to 0.375 / 0.625
        let composite = compute_composite(&data, &HashMap::new(), &config);
        assert!((composite.atr_ratio - (0.375 * 1.0 + 0.625 * 2.0)).abs() < 1e-9);
        assert!(!composite.adx_available);
        assert_eq!(composite.adx, 0.0);
    }

    #[test]
    fn test_agreement_requires_same_side() {
        let config = RegimeConfig::default();
        let mut data = HashMap::new();
        data.insert(Timeframe::Minute15, snapshot(1.5, 1.0, None));
        data.insert(Timeframe::Hour1, snapshot(1.4, 1.0, None));
        let agreeing = compute_composite(&data, &HashMap::new(), &config);
        assert!(agreeing.multi_timeframe_agreement);

        let mut split = HashMap::new();
        split.insert(Timeframe::Minute15, snapshot(1.5, 1.0, None));
        split.insert(Timeframe::Hour1, snapshot(1.0, 1.0, None));
        let disagreeing = compute_composite(&split, &HashMap::new(), &config);
        assert!(!disagreeing.multi_timeframe_agreement);
    }

    #[test]
    fn test_empty_input_yields_neutral_defaults() {
        let config = RegimeConfig::default();
        let composite = compute_composite(&HashMap::new(), &HashMap::new(), &config);
        assert_eq!(composite.atr_ratio, 1.0);
        assert_eq!(composite.bb_width_ratio, 1.0);
        assert_eq!(composite.adx, 0.0);
        assert!(!composite.atr_available);
        assert!(composite.timeframes_used.is_empty());
    }

    #[test]
    fn test_zero_atr50_excluded() {
        let config = RegimeConfig::default();
        let mut data = HashMap::new();
        data.insert(Timeframe::Hour1, snapshot(1.5, 0.0, None));
        let composite = compute_composite(&data, &HashMap::new(), &config);
        assert!(!composite.atr_available);
        assert_eq!(composite.atr_ratio, 1.0);
    }
}
