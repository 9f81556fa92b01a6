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

//! Near-real-time volatility regime classification.
//!
//! Every call to [`RegimeDetector::detect_regime`] yields exactly one of
//! seven mutually exclusive labels plus a confidence score and a full
//! diagnostics bundle. Inputs degrade gracefully: missing indicators,
//! short candle windows and storage failures all produce a usable
//! (if lower-confidence) classification, never an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::market::{MarketDataProvider, Symbol, Timeframe, TimeframeSnapshot};
use crate::storage::BreakoutStore;

pub mod composite;
pub mod confidence;
pub mod detector;
pub mod detectors;
pub mod ledger;
pub mod resolver;
pub mod session;
pub mod trackers;

pub use composite::CompositeIndicators;
pub use detector::VolatilityRegimeDetector;
pub use detectors::{AnchorKind, MeanReversionPattern, VolatilitySpikeMark};
pub use ledger::{BreakoutLedger, BreakoutRecency};
pub use resolver::{AdvancedSignals, RegimeFilterState};
pub use session::{SessionBoundary, SessionTransition};
pub use trackers::{AtrTrend, AtrTrendDirection, IntrabarMetrics, WickVariance, WidthMetrics};

/// Errors surfaced by regime engine plumbing (construction, provider
/// fetches). Classification itself never errors.
#[derive(Debug, Error)]
pub enum RegimeError {
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Market data error: {0}")]
    MarketData(#[from] crate::market::MarketDataError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for regime operations
pub type RegimeResult<T> = Result<T, RegimeError>;

/// The seven mutually exclusive volatility regime labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityRegime {
    /// Quiet market, indicators below their stable thresholds
    Stable,
    /// Between states, or not enough evidence either way
    Transitional,
    /// Broad elevated volatility with volume behind it
    Volatile,
    /// Coiling: narrow bands with churn building underneath
    PreBreakoutTension,
    /// Elevated volatility cooling off after a recent breakout
    PostBreakoutDecay,
    /// Directionless whipsaw around a central anchor
    FragmentedChop,
    /// Short-lived spike tied to a session boundary
    SessionSwitchFlare,
}

impl VolatilityRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::Stable => "STABLE",
            VolatilityRegime::Transitional => "TRANSITIONAL",
            VolatilityRegime::Volatile => "VOLATILE",
            VolatilityRegime::PreBreakoutTension => "PRE_BREAKOUT_TENSION",
            VolatilityRegime::PostBreakoutDecay => "POST_BREAKOUT_DECAY",
            VolatilityRegime::FragmentedChop => "FRAGMENTED_CHOP",
            VolatilityRegime::SessionSwitchFlare => "SESSION_SWITCH_FLARE",
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for VolatilityRegime {
    fn default() -> Self {
        VolatilityRegime::Transitional
    }
}

/// Tunable thresholds for the regime engine. Defaults match the
/// documented classification rules; every knob is serializable so a
/// deployment can ship its own profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Composite blend weights per timeframe (renormalized over the
    /// timeframes actually present)
    pub timeframe_weights: Vec<(Timeframe, f64)>,
    /// Rolling tracker capacity per (symbol, timeframe)
    pub history_capacity: usize,

    /// ATR-14/ATR-50 ratio above which volatility is above baseline
    pub atr_baseline_ratio: f64,
    /// ATR regression slope (percent of first sample) for rising/declining
    pub atr_slope_threshold_pct: f64,
    /// Wick variance increase (percent) treated as swelling
    pub wick_variance_threshold_pct: f64,
    /// Intrabar ratio rise (percent) treated as building churn
    pub intrabar_rise_threshold_pct: f64,
    /// Width percentile below which bands count as narrow
    pub narrow_width_percentile: f64,

    /// Whipsaw: reversals required within the lookback
    pub whipsaw_min_reversals: usize,
    /// Whipsaw: closes examined
    pub whipsaw_lookback: usize,
    /// Mean reversion: touch band as a multiple of ATR
    pub reversion_band_mult: f64,
    /// Mean reversion: touches required
    pub reversion_min_touches: usize,
    /// Fragmented chop: composite ADX must be below this
    pub chop_max_adx: f64,

    /// Volume breakout multiple of the trailing average
    pub volume_breakout_ratio: f64,
    /// Volume confirmation multiple for composite/baseline
    pub volume_confirm_ratio: f64,
    /// Breakouts younger than this many minutes are "recent"
    pub breakout_recent_minutes: i64,
    /// Tie-break cutoff: older breakouts yield to renewed tension
    pub breakout_renewal_minutes: i64,

    /// Session boundary window half-width in minutes
    pub session_window_minutes: i64,
    /// ATR multiple of baseline that counts as a session spike
    pub flare_atr_ratio: f64,
    /// Spike age beyond which an undecayed spike becomes expansion
    pub flare_max_minutes: i64,
    /// ATR decline from peak (percent) that keeps an old spike a flare
    pub flare_decay_pct: f64,

    /// Baseline classifier thresholds
    pub atr_volatile_ratio: f64,
    pub atr_stable_ratio: f64,
    pub bb_volatile_ratio: f64,
    pub bb_stable_ratio: f64,
    pub adx_volatile: f64,
    pub adx_stable: f64,

    /// Consecutive calls a challenger label must persist
    pub persistence_calls: u32,
    /// Calls the incumbent label must have held before changing
    pub inertia_calls: u32,
    /// Calls after a change during which a bounce back is blocked
    pub cooldown_calls: u32,

    /// Published confidence floor for consumers gating on the label
    pub confidence_floor: f64,

    /// Bound on any single durable-store operation, in milliseconds
    pub store_timeout_ms: u64,
    /// Relative price tolerance for duplicate breakout suppression
    pub dedup_price_tolerance: f64,
    /// Duplicate suppression window in bars of the timeframe
    pub dedup_window_bars: i64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            timeframe_weights: vec![
                (Timeframe::Minute5, 0.2),
                (Timeframe::Minute15, 0.3),
                (Timeframe::Hour1, 0.5),
            ],
            history_capacity: 20,
            atr_baseline_ratio: 1.2,
            atr_slope_threshold_pct: 5.0,
            wick_variance_threshold_pct: 30.0,
            intrabar_rise_threshold_pct: 20.0,
            narrow_width_percentile: 20.0,
            whipsaw_min_reversals: 3,
            whipsaw_lookback: 5,
            reversion_band_mult: 0.5,
            reversion_min_touches: 3,
            chop_max_adx: 15.0,
            volume_breakout_ratio: 1.5,
            volume_confirm_ratio: 1.2,
            breakout_recent_minutes: 30,
            breakout_renewal_minutes: 60,
            session_window_minutes: 15,
            flare_atr_ratio: 1.5,
            flare_max_minutes: 30,
            flare_decay_pct: 20.0,
            atr_volatile_ratio: 1.5,
            atr_stable_ratio: 1.1,
            bb_volatile_ratio: 1.3,
            bb_stable_ratio: 0.9,
            adx_volatile: 25.0,
            adx_stable: 20.0,
            persistence_calls: 3,
            inertia_calls: 5,
            cooldown_calls: 2,
            confidence_floor: 70.0,
            store_timeout_ms: 500,
            dedup_price_tolerance: 0.001,
            dedup_window_bars: 5,
        }
    }
}

/// Full classification output for one call: the emitted label, its
/// confidence, a one-line rationale and the diagnostics that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeDetection {
    pub symbol: Symbol,
    /// Emitted (filtered) label
    pub regime: VolatilityRegime,
    /// Raw label before persistence/inertia/cooldown filtering
    pub raw_regime: VolatilityRegime,
    /// Confidence in [0, 100]
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,

    // Composite view
    pub atr_ratio: f64,
    pub bb_width_ratio: f64,
    pub adx_composite: f64,
    pub volume_confirmed: bool,
    pub multi_timeframe_agreement: bool,
    pub timeframes_used: Vec<String>,

    // Per-timeframe diagnostics, keyed by timeframe name
    pub atr_trends: HashMap<String, AtrTrend>,
    pub wick_variances: HashMap<String, WickVariance>,
    pub width_metrics: HashMap<String, WidthMetrics>,
    pub time_since_breakout: HashMap<String, BreakoutRecency>,

    // Advanced-state payloads
    pub whipsaw_detected: bool,
    pub mean_reversion_pattern: Option<MeanReversionPattern>,
    pub volatility_spike: Option<VolatilitySpikeMark>,
    pub session_transition: Option<SessionTransition>,
}

/// The regime classification surface
#[async_trait]
pub trait RegimeDetector: Send + Sync {
    /// Classify the current regime for a symbol from caller-supplied
    /// per-timeframe snapshots. Always returns a full detection;
    /// degraded inputs lower confidence instead of erroring.
    /// `current_time` overrides the wall clock for deterministic replay.
    async fn detect_regime(
        &self,
        symbol: &str,
        timeframe_data: &HashMap<Timeframe, TimeframeSnapshot>,
        current_time: Option<DateTime<Utc>>,
    ) -> RegimeDetection;

    /// Fetch fresh snapshots through the configured market data provider
    /// and classify. Returns `None` when no timeframe could be fetched
    /// or no provider is configured.
    async fn get_current_regime(&self, symbol: &str) -> Option<VolatilityRegime>;
}

/// Create a regime detector with the given store and default config
pub fn create_regime_detector(store: Arc<dyn BreakoutStore>) -> Arc<dyn RegimeDetector> {
    Arc::new(VolatilityRegimeDetector::new(RegimeConfig::default(), store, None))
}

/// Create a regime detector with a custom config and an optional
/// market data provider for `get_current_regime`
pub fn create_regime_detector_with_config(
    config: RegimeConfig,
    store: Arc<dyn BreakoutStore>,
    provider: Option<Arc<dyn MarketDataProvider>>,
) -> Arc<dyn RegimeDetector> {
    Arc::new(VolatilityRegimeDetector::new(config, store, provider))
}
