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

use crate::regime::composite::CompositeIndicators;
use crate::regime::{RegimeConfig, VolatilityRegime};

/// Distance of a reading from the midpoint of its stable/volatile band,
/// normalized to [0, 100]
fn strength(value: f64, stable_threshold: f64, volatile_threshold: f64) -> f64 {
    let mid = (stable_threshold + volatile_threshold) / 2.0;
    let half_band = volatile_threshold - mid;
    if half_band.abs() <= f64::EPSILON || !value.is_finite() {
        return 0.0;
    }
    ((value - mid).abs() / half_band * 100.0).clamp(0.0, 100.0)
}

/// Score how decisively the composite indicators sit away from their
/// classification midpoints.
///
/// Per-indicator strengths are weighted ATR 40 / BB 30 / ADX 30 over
/// the indicators that had data, with flat bonuses for volume
/// confirmation and multi-timeframe agreement, clipped to [0, 100].
pub fn score_confidence(composite: &CompositeIndicators, config: &RegimeConfig) -> f64 {
    let mut parts: Vec<(f64, f64)> = Vec::new();

    if composite.atr_available {
        parts.push((
            0.4,
            strength(
                composite.atr_ratio,
                config.atr_stable_ratio,
                config.atr_volatile_ratio,
            ),
        ));
    }
    if composite.bb_available {
        parts.push((
            0.3,
            strength(
                composite.bb_width_ratio,
                config.bb_stable_ratio,
                config.bb_volatile_ratio,
            ),
        ));
    }
    if composite.adx_available {
        parts.push((
            0.3,
            strength(composite.adx, config.adx_stable, config.adx_volatile),
        ));
    }

    let weight_sum: f64 = parts.iter().map(|(w, _)| w).sum();
    let mut score = if weight_sum > f64::EPSILON {
        parts.iter().map(|(w, s)| w * s).sum::<f64>() / weight_sum
    } else {
        0.0
    };

    if composite.volume_confirmed {
        score += 10.0;
    }
    if composite.multi_timeframe_agreement {
        score += 10.0;
    }

    score.clamp(0.0, 100.0)
}

/// Assemble the one-line rationale published alongside the label
pub fn build_reasoning(
    emitted: VolatilityRegime,
    raw: VolatilityRegime,
    composite: &CompositeIndicators,
) -> String {
    let basis = match raw {
        VolatilityRegime::SessionSwitchFlare => {
            "short-lived volatility spike inside a session boundary window".to_string()
        }
        VolatilityRegime::FragmentedChop => {
            format!(
                "whipsaw reversals oscillating around a central anchor with ADX {:.1}",
                composite.adx
            )
        }
        VolatilityRegime::PostBreakoutDecay => {
            "elevated ATR cooling off after a recent breakout".to_string()
        }
        VolatilityRegime::PreBreakoutTension => {
            "narrow bands with swelling wick variance and rising intrabar churn".to_string()
        }
        VolatilityRegime::Volatile => format!(
            "composite ATR ratio {:.2} and band width ratio {:.2} with volume confirmation",
            composite.atr_ratio, composite.bb_width_ratio
        ),
        VolatilityRegime::Stable => format!(
            "composite ATR ratio {:.2}, band width ratio {:.2}, ADX {:.1} all quiet",
            composite.atr_ratio, composite.bb_width_ratio, composite.adx
        ),
        VolatilityRegime::Transitional => format!(
            "mixed composite readings (ATR ratio {:.2}, band width ratio {:.2}, ADX {:.1})",
            composite.atr_ratio, composite.bb_width_ratio, composite.adx
        ),
    };

    if emitted == raw {
        format!("{}: {}", emitted, basis)
    } else {
        format!(
            "{}: holding prior label; this call read {} ({})",
            emitted, raw, basis
        )
    }
}
