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

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::regime::composite::CompositeIndicators;
use crate::regime::{RegimeConfig, VolatilityRegime};

/// Advanced-state verdicts feeding the priority resolver
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvancedSignals {
    pub session_flare: bool,
    pub fragmented_chop: bool,
    pub post_breakout_decay: bool,
    pub pre_breakout_tension: bool,
    /// Age of the last recorded breakout, when known
    pub breakout_age_minutes: Option<i64>,
}

/// Classify the baseline three-state regime from composite indicators.
///
/// Two of the three indicators must agree, counting only indicators that
/// had data; VOLATILE additionally requires volume confirmation. With no
/// indicator available at all the call degrades to TRANSITIONAL.
pub fn classify_baseline(
    composite: &CompositeIndicators,
    config: &RegimeConfig,
) -> VolatilityRegime {
    let mut available = 0usize;
    let mut volatile_hits = 0usize;
    let mut stable_hits = 0usize;

    if composite.atr_available {
        available += 1;
        if composite.atr_ratio > config.atr_volatile_ratio {
            volatile_hits += 1;
        }
        if composite.atr_ratio < config.atr_stable_ratio {
            stable_hits += 1;
        }
    }
    if composite.bb_available {
        available += 1;
        if composite.bb_width_ratio > config.bb_volatile_ratio {
            volatile_hits += 1;
        }
        if composite.bb_width_ratio < config.bb_stable_ratio {
            stable_hits += 1;
        }
    }
    if composite.adx_available {
        available += 1;
        if composite.adx > config.adx_volatile {
            volatile_hits += 1;
        }
        if composite.adx < config.adx_stable {
            stable_hits += 1;
        }
    }

    if available == 0 {
        return VolatilityRegime::Transitional;
    }

    let needed = 2.min(available);
    if volatile_hits >= needed && volatile_hits >= 2 && composite.volume_confirmed {
        VolatilityRegime::Volatile
    } else if stable_hits >= needed && stable_hits >= 2 {
        VolatilityRegime::Stable
    } else {
        VolatilityRegime::Transitional
    }
}

/// Resolve the raw regime for this call: advanced states in fixed
/// priority order, falling back to the baseline classifier.
///
/// When both post-breakout decay and pre-breakout tension fire, the
/// breakout's age decides: older than the renewal cutoff means the
/// market is coiling again (tension), younger means the aftermath is
/// still playing out (decay). Unknown age sides with decay, which only
/// fires on a known recent breakout in the first place.
pub fn resolve_raw(
    signals: &AdvancedSignals,
    composite: &CompositeIndicators,
    config: &RegimeConfig,
) -> VolatilityRegime {
    let mut decay = signals.post_breakout_decay;
    let mut tension = signals.pre_breakout_tension;

    if decay && tension {
        let renewing = signals
            .breakout_age_minutes
            .map(|age| age > config.breakout_renewal_minutes)
            .unwrap_or(false);
        if renewing {
            decay = false;
        } else {
            tension = false;
        }
    }

    if signals.session_flare {
        VolatilityRegime::SessionSwitchFlare
    } else if signals.fragmented_chop {
        VolatilityRegime::FragmentedChop
    } else if decay {
        VolatilityRegime::PostBreakoutDecay
    } else if tension {
        VolatilityRegime::PreBreakoutTension
    } else {
        classify_baseline(composite, config)
    }
}

/// Per-symbol label smoothing state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeFilterState {
    /// Currently emitted label
    pub current: VolatilityRegime,
    /// Label emitted before the last change
    pub previous: VolatilityRegime,
    /// Pending challenger label, if any
    pub candidate: Option<VolatilityRegime>,
    /// Consecutive calls the challenger has held
    pub candidate_streak: u32,
    /// Calls since the current label was adopted
    pub calls_in_current: u32,
    /// Calls since the last label change
    pub calls_since_change: u32,
    /// True until the first call adopts a label
    pub fresh: bool,
}

impl Default for RegimeFilterState {
    fn default() -> Self {
        Self {
            current: VolatilityRegime::Transitional,
            previous: VolatilityRegime::Transitional,
            candidate: None,
            candidate_streak: 0,
            calls_in_current: 0,
            calls_since_change: 0,
            fresh: true,
        }
    }
}

/// Apply persistence, inertia and cooldown to a raw label and return
/// the label to emit.
///
/// A change of label requires the challenger to persist for
/// `persistence_calls` consecutive calls, the incumbent to have held for
/// at least `inertia_calls`, and, within `cooldown_calls` of the last
/// change, the challenger not to be a bounce straight back to the label
/// just left. The very first call adopts the raw label immediately.
pub fn apply_filter(
    state: &mut RegimeFilterState,
    raw: VolatilityRegime,
    config: &RegimeConfig,
) -> VolatilityRegime {
    if state.fresh {
        state.current = raw;
        state.previous = raw;
        state.fresh = false;
        state.calls_in_current = 1;
        state.calls_since_change = 1;
        state.candidate = None;
        state.candidate_streak = 0;
        return state.current;
    }

    state.calls_in_current += 1;
    state.calls_since_change += 1;

    if raw == state.current {
        state.candidate = None;
        state.candidate_streak = 0;
        return state.current;
    }

    match state.candidate {
        Some(candidate) if candidate == raw => state.candidate_streak += 1,
        _ => {
            state.candidate = Some(raw);
            state.candidate_streak = 1;
        }
    }

    let persisted = state.candidate_streak >= config.persistence_calls;
    let incumbent_settled = state.calls_in_current > config.inertia_calls;
    let bouncing_back =
        state.calls_since_change <= config.cooldown_calls && raw == state.previous;

    if persisted && incumbent_settled && !bouncing_back {
        debug!(from = %state.current, to = %raw, "Regime label change accepted");
        state.previous = state.current;
        state.current = raw;
        state.calls_in_current = 1;
        state.calls_since_change = 1;
        state.candidate = None;
        state.candidate_streak = 0;
    }

    state.current
}
