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
use tracing::debug;

use crate::market::Candle;
use crate::regime::composite::CompositeIndicators;
use crate::regime::ledger::BreakoutRecency;
use crate::regime::trackers::{
    AtrTrend, AtrTrendDirection, IntrabarMetrics, WickVariance, WidthMetrics,
};
use crate::regime::RegimeConfig;

/// Count direction reversals over the last `lookback` closes. A reversal
/// is a sign flip between consecutive non-zero close-to-close deltas.
pub fn detect_whipsaw(candles: &[Candle], lookback: usize, min_reversals: usize) -> bool {
    if candles.len() < lookback || lookback < 3 {
        return false;
    }
    let closes: Vec<f64> = candles[candles.len() - lookback..]
        .iter()
        .map(|c| c.close_f64())
        .collect();

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut reversals = 0usize;
    let mut last_sign: Option<bool> = None;
    for delta in deltas {
        if delta == 0.0 {
            continue;
        }
        let sign = delta > 0.0;
        if let Some(prev) = last_sign {
            if prev != sign {
                reversals += 1;
            }
        }
        last_sign = Some(sign);
    }
    reversals >= min_reversals
}

/// Anchor used by the mean-reversion oscillation test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorKind {
    /// Volume-weighted average price over the window
    Vwap,
    /// Simple close average fallback when volume is degenerate
    LongAverage,
}

/// Detected oscillation around a central anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanReversionPattern {
    pub anchor: f64,
    pub anchor_kind: AnchorKind,
    /// Half-width of the touch band (multiple of ATR)
    pub band: f64,
    /// Closes within the band over the window
    pub touches: usize,
}

/// Test whether price keeps returning to a central anchor: at least
/// `min_touches` of the last 20 closes within `band_mult` x ATR of the
/// VWAP (or close average when volume is degenerate).
pub fn detect_mean_reversion(
    candles: &[Candle],
    atr: f64,
    band_mult: f64,
    min_touches: usize,
) -> Option<MeanReversionPattern> {
    if candles.len() < 20 || atr <= 0.0 || !atr.is_finite() {
        return None;
    }
    let window = &candles[candles.len() - 20..];

    let volume_sum: f64 = window.iter().map(|c| c.volume_f64()).sum();
    let (anchor, anchor_kind) = if volume_sum > 0.0 && volume_sum.is_finite() {
        let weighted: f64 = window
            .iter()
            .map(|c| {
                let typical =
                    (c.high_f64() + c.low_f64() + c.close_f64()) / 3.0;
                typical * c.volume_f64()
            })
            .sum();
        (weighted / volume_sum, AnchorKind::Vwap)
    } else {
        let mean = window.iter().map(|c| c.close_f64()).sum::<f64>() / window.len() as f64;
        (mean, AnchorKind::LongAverage)
    };

    if !anchor.is_finite() {
        return None;
    }

    let band = band_mult * atr;
    let touches = window
        .iter()
        .filter(|c| (c.close_f64() - anchor).abs() <= band)
        .count();

    if touches >= min_touches {
        Some(MeanReversionPattern {
            anchor,
            anchor_kind,
            band,
            touches,
        })
    } else {
        None
    }
}

/// First-seen time and running peak of a volatility spike on one
/// timeframe, carried across calls to separate short flares from
/// sustained expansions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySpikeMark {
    pub started_at: DateTime<Utc>,
    pub peak_atr: f64,
}

/// Arbitrate a session-window volatility spike between "flare" and
/// "sustained expansion".
///
/// A spike inside the boundary window counts as a flare while young, and
/// keeps counting during its decaying tail. A spike that outlives the
/// flare horizon without decaying is a genuine expansion: the mark is
/// cleared and the baseline classifier takes over. Returns the flare
/// verdict and the mark to carry forward.
pub fn evaluate_session_flare(
    in_session_window: bool,
    current_atr: f64,
    baseline_atr: f64,
    mark: Option<VolatilitySpikeMark>,
    now: DateTime<Utc>,
    config: &RegimeConfig,
) -> (bool, Option<VolatilitySpikeMark>) {
    let spiking = baseline_atr > 0.0
        && baseline_atr.is_finite()
        && current_atr.is_finite()
        && current_atr >= config.flare_atr_ratio * baseline_atr;

    if !in_session_window || !spiking {
        return (false, None);
    }

    let mark = match mark {
        Some(m) => VolatilitySpikeMark {
            started_at: m.started_at,
            peak_atr: m.peak_atr.max(current_atr),
        },
        None => VolatilitySpikeMark {
            started_at: now,
            peak_atr: current_atr,
        },
    };

    let elapsed = now.signed_duration_since(mark.started_at).num_minutes();
    if elapsed < config.flare_max_minutes {
        return (true, Some(mark));
    }

    let decayed = mark.peak_atr > 0.0
        && current_atr <= mark.peak_atr * (1.0 - config.flare_decay_pct / 100.0);
    if decayed {
        (true, Some(mark))
    } else {
        debug!(elapsed, "Session spike outlived flare horizon, treating as expansion");
        (false, None)
    }
}

/// Coiling-before-release: narrow bands, swelling wick variance, rising
/// intrabar churn, composite ATR still below breakout territory
pub fn pre_breakout_tension(
    width: &WidthMetrics,
    wick: &WickVariance,
    intrabar: &IntrabarMetrics,
    composite: &CompositeIndicators,
    config: &RegimeConfig,
) -> bool {
    width.is_narrow
        && wick.is_increasing
        && wick.change_pct >= config.wick_variance_threshold_pct
        && intrabar.is_rising
        && intrabar.change_pct >= config.intrabar_rise_threshold_pct
        && composite.atr_ratio < config.atr_baseline_ratio
}

/// Elevated-but-cooling aftermath of a recent breakout
pub fn post_breakout_decay(recency: &BreakoutRecency, atr_trend: &AtrTrend) -> bool {
    recency.is_recent()
        && atr_trend.direction == AtrTrendDirection::Declining
        && atr_trend.is_above_baseline
}

/// Directionless churn: whipsaw reversals plus mean-reversion
/// oscillation with no trend strength behind either
pub fn fragmented_chop(
    whipsaw: bool,
    reversion: Option<&MeanReversionPattern>,
    composite: &CompositeIndicators,
    config: &RegimeConfig,
) -> bool {
    whipsaw && reversion.is_some() && composite.adx < config.chop_max_adx
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap() + chrono::Duration::minutes(15 * i)
    }

    fn candle(i: i64, close: f64, volume: f64) -> Candle {
        let c = Decimal::from_f64(close).unwrap();
        Candle::new(
            ts(i),
            c,
            c + Decimal::ONE,
            c - Decimal::ONE,
            c,
            Decimal::from_f64(volume).unwrap(),
        )
    }

    #[test]
    fn test_whipsaw_alternating_closes() {
        let closes = [100.0, 101.0, 99.5, 101.5, 99.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| candle(i as i64, *c, 1000.0))
            .collect();
        assert!(detect_whipsaw(&candles, 5, 3));
    }

    #[test]
    fn test_whipsaw_trending_closes() {
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0 + i as f64, 1000.0)).collect();
        assert!(!detect_whipsaw(&candles, 5, 3));
    }

    #[test]
    fn test_whipsaw_flat_deltas_ignored() {
        let closes = [100.0, 100.0, 100.0, 100.0, 100.0];
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| candle(i as i64, *c, 1000.0))
            .collect();
        assert!(!detect_whipsaw(&candles, 5, 3));
    }

    #[test]
    fn test_mean_reversion_oscillation() {
        // Closes oscillating tightly around 100 with real volume: VWAP
        // anchor, every close inside a 0.5x ATR band when ATR is 2
        let candles: Vec<Candle> = (0..20)
            .map(|i| candle(i, if i % 2 == 0 { 99.7 } else { 100.3 }, 1000.0))
            .collect();
        let pattern = detect_mean_reversion(&candles, 2.0, 0.5, 3).unwrap();
        assert_eq!(pattern.anchor_kind, AnchorKind::Vwap);
        assert!(pattern.touches >= 3);
        assert!((pattern.anchor - 100.0).abs() < 0.5);
    }

    #[test]
    fn test_mean_reversion_trending_market() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(i, 100.0 + i as f64 * 2.0, 1000.0)).collect();
        assert!(detect_mean_reversion(&candles, 1.0, 0.5, 3).is_none());
    }

    #[test]
    fn test_mean_reversion_zero_atr() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(i, 100.0, 1000.0)).collect();
        assert!(detect_mean_reversion(&candles, 0.0, 0.5, 3).is_none());
    }

    #[test]
    fn test_mean_reversion_volume_fallback() {
        let candles: Vec<Candle> = (0..20).map(|i| candle(i, 100.0, 0.0)).collect();
        let pattern = detect_mean_reversion(&candles, 1.0, 0.5, 3).unwrap();
        assert_eq!(pattern.anchor_kind, AnchorKind::LongAverage);
    }

    #[test]
    fn test_flare_young_spike_in_window() {
        let config = RegimeConfig::default();
        let now = ts(0);
        let (flare, mark) = evaluate_session_flare(true, 3.0, 1.0, None, now, &config);
        assert!(flare);
        let mark = mark.unwrap();
        assert_eq!(mark.started_at, now);
        assert_eq!(mark.peak_atr, 3.0);
    }

    #[test]
    fn test_flare_expires_into_expansion() {
        let config = RegimeConfig::default();
        let started = ts(0);
        let mark = VolatilitySpikeMark {
            started_at: started,
            peak_atr: 3.0,
        };
        // 45 minutes in, ATR still at peak: sustained expansion
        let (flare, carried) = evaluate_session_flare(
            true,
            3.0,
            1.0,
            Some(mark),
            started + chrono::Duration::minutes(45),
            &config,
        );
        assert!(!flare);
        assert!(carried.is_none());
    }

    #[test]
    fn test_flare_decaying_tail_still_flare() {
        let config = RegimeConfig::default();
        let started = ts(0);
        let mark = VolatilitySpikeMark {
            started_at: started,
            peak_atr: 4.0,
        };
        // Past the horizon but ATR dropped 25% from peak while still
        // above the spike threshold
        let (flare, carried) = evaluate_session_flare(
            true,
            3.0,
            1.0,
            Some(mark),
            started + chrono::Duration::minutes(45),
            &config,
        );
        assert!(flare);
        assert!(carried.is_some());
    }

    #[test]
    fn test_flare_cleared_outside_window() {
        let config = RegimeConfig::default();
        let mark = VolatilitySpikeMark {
            started_at: ts(0),
            peak_atr: 3.0,
        };
        let (flare, carried) = evaluate_session_flare(false, 3.0, 1.0, Some(mark), ts(1), &config);
        assert!(!flare);
        assert!(carried.is_none());
    }

    #[test]
    fn test_post_breakout_decay_predicate() {
        let recent = BreakoutRecency::Since {
            minutes: 10,
            hours: 10.0 / 60.0,
            kind: crate::storage::BreakoutKind::PriceUp,
            price: 120.0,
            is_recent: true,
        };
        let declining = AtrTrend {
            direction: AtrTrendDirection::Declining,
            slope: -0.01,
            slope_pct: -6.0,
            atr_ratio: 1.4,
            is_above_baseline: true,
            samples: 5,
        };
        assert!(post_breakout_decay(&recent, &declining));

        assert!(!post_breakout_decay(&BreakoutRecency::None, &declining));
        assert!(!post_breakout_decay(&BreakoutRecency::Unknown, &declining));

        let rising = AtrTrend {
            direction: AtrTrendDirection::Rising,
            ..declining.clone()
        };
        assert!(!post_breakout_decay(&recent, &rising));
    }
}
