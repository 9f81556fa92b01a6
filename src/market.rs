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
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type alias for trading pair/symbol
pub type Symbol = String;

/// Error types for market data operations
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum MarketDataError {
    /// Requested data is not available
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Network errors
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Timeframe for candles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1 minute candles
    Minute1,
    /// 5 minute candles
    Minute5,
    /// 15 minute candles
    Minute15,
    /// 30 minute candles
    Minute30,
    /// 1 hour candles
    Hour1,
    /// 4 hour candles
    Hour4,
    /// 1 day candles
    Day1,
}

impl Timeframe {
    /// Convert timeframe to seconds
    pub fn to_seconds(&self) -> i64 {
        match self {
            Timeframe::Minute1 => 60,
            Timeframe::Minute5 => 300,
            Timeframe::Minute15 => 900,
            Timeframe::Minute30 => 1800,
            Timeframe::Hour1 => 3600,
            Timeframe::Hour4 => 14400,
            Timeframe::Day1 => 86400,
        }
    }

    /// Convert timeframe to minutes
    pub fn to_minutes(&self) -> i64 {
        self.to_seconds() / 60
    }

    /// Short string representation used for diagnostics maps and persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute1 => "1m",
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Minute30 => "30m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
        }
    }

    /// Parse a short timeframe string ("5m", "1h", ...)
    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "1m" => Some(Timeframe::Minute1),
            "5m" => Some(Timeframe::Minute5),
            "15m" => Some(Timeframe::Minute15),
            "30m" => Some(Timeframe::Minute30),
            "1h" => Some(Timeframe::Hour1),
            "4h" => Some(Timeframe::Hour4),
            "1d" => Some(Timeframe::Day1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a candle/OHLCV bar for a trading pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Opening timestamp of the candle
    pub timestamp: DateTime<Utc>,
    /// Opening price
    pub open: Decimal,
    /// Highest price during the period
    pub high: Decimal,
    /// Lowest price during the period
    pub low: Decimal,
    /// Closing price
    pub close: Decimal,
    /// Trading volume during the period
    pub volume: Decimal,
}

impl Candle {
    /// Create a new candle with basic OHLCV data
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Body size of the candle (abs of close - open)
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// Full range of the candle (high - low)
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Upper wick: distance from the body top to the high
    pub fn upper_wick(&self) -> Decimal {
        self.high - self.open.max(self.close)
    }

    /// Lower wick: distance from the body bottom to the low
    pub fn lower_wick(&self) -> Decimal {
        self.open.min(self.close) - self.low
    }

    /// Check if candle is bullish (close > open)
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Wick-to-body ratio: (upper wick + lower wick) / body.
    /// A zero-size body yields 0.0 rather than a division error.
    pub fn wick_to_body_ratio(&self) -> f64 {
        let body = self.body().to_f64().unwrap_or(0.0);
        if body <= 0.0 {
            return 0.0;
        }
        let wicks = (self.upper_wick() + self.lower_wick()).to_f64().unwrap_or(0.0);
        let ratio = wicks / body;
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }

    /// Intrabar volatility: (high - low) / |close - open|.
    /// A zero-size body yields 0.0 rather than a division error.
    pub fn intrabar_volatility(&self) -> f64 {
        let body = self.body().to_f64().unwrap_or(0.0);
        if body <= 0.0 {
            return 0.0;
        }
        let range = self.range().to_f64().unwrap_or(0.0);
        let ratio = range / body;
        if ratio.is_finite() {
            ratio
        } else {
            0.0
        }
    }

    /// Closing price as f64 for ratio math
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    /// High as f64 for ratio math
    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }

    /// Low as f64 for ratio math
    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }

    /// Volume as f64 for ratio math
    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }
}

/// Bollinger band levels for one timeframe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    /// Upper band
    pub upper: f64,
    /// Middle band (typically SMA-20)
    pub middle: f64,
    /// Lower band
    pub lower: f64,
}

impl BollingerBands {
    /// Normalized band width: (upper - lower) / middle.
    /// Returns `None` for a non-positive middle band or non-finite result.
    pub fn normalized_width(&self) -> Option<f64> {
        if self.middle <= 0.0 {
            return None;
        }
        let width = (self.upper - self.lower) / self.middle;
        if width.is_finite() && width >= 0.0 {
            Some(width)
        } else {
            None
        }
    }
}

/// Externally supplied indicator values for one (symbol, timeframe)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// Average True Range over 14 bars
    pub atr_14: Option<f64>,
    /// Average True Range over 50 bars
    pub atr_50: Option<f64>,
    /// Bollinger bands
    pub bollinger: Option<BollingerBands>,
    /// Average Directional Index
    pub adx: Option<f64>,
}

/// Candle window plus pre-computed indicators for one (symbol, timeframe).
///
/// Candles are ascending by time; indicator fields may be absent and the
/// consumer degrades gracefully (excluding the timeframe from composite
/// weighting or recomputing from candles where feasible).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeframeSnapshot {
    /// Recent candle window, ascending by time (>= 21 bars recommended)
    pub candles: Vec<Candle>,
    /// Average True Range over 14 bars
    pub atr_14: Option<f64>,
    /// Average True Range over 50 bars
    pub atr_50: Option<f64>,
    /// Bollinger bands (recomputed from closes when absent)
    pub bollinger: Option<BollingerBands>,
    /// Average Directional Index
    pub adx: Option<f64>,
}

impl TimeframeSnapshot {
    /// Create a snapshot from a candle window and an indicator set
    pub fn new(candles: Vec<Candle>, indicators: IndicatorSet) -> Self {
        Self {
            candles,
            atr_14: indicators.atr_14,
            atr_50: indicators.atr_50,
            bollinger: indicators.bollinger,
            adx: indicators.adx,
        }
    }

    /// The most recent candle, if any
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The candle before the most recent one, if any
    pub fn previous(&self) -> Option<&Candle> {
        if self.candles.len() < 2 {
            return None;
        }
        self.candles.get(self.candles.len() - 2)
    }

    /// Normalized Bollinger width for this snapshot. Uses supplied bands
    /// when present, otherwise recomputes SMA-20 +/- 2 sigma from closes.
    pub fn normalized_width(&self) -> Option<f64> {
        if let Some(bands) = &self.bollinger {
            if let Some(width) = bands.normalized_width() {
                return Some(width);
            }
        }
        self.recompute_width_from_closes(20)
    }

    fn recompute_width_from_closes(&self, period: usize) -> Option<f64> {
        if self.candles.len() < period {
            return None;
        }
        let closes: Vec<f64> = self.candles[self.candles.len() - period..]
            .iter()
            .map(|c| c.close_f64())
            .collect();
        let n = closes.len() as f64;
        let mean = closes.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return None;
        }
        let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        // Band width upper - lower = 4 sigma, normalized by the middle band
        let width = (4.0 * std_dev) / mean;
        if width.is_finite() {
            Some(width)
        } else {
            None
        }
    }

    /// Whether the latest bar's volume exceeds `ratio` times the trailing
    /// 20-bar average (excluding the current bar). Returns false when the
    /// window is too short or volumes are degenerate.
    pub fn volume_confirmed(&self, ratio: f64) -> bool {
        if self.candles.len() < 21 {
            return false;
        }
        let current = match self.latest() {
            Some(c) => c.volume_f64(),
            None => return false,
        };
        let window = &self.candles[self.candles.len() - 21..self.candles.len() - 1];
        let avg = window.iter().map(|c| c.volume_f64()).sum::<f64>() / window.len() as f64;
        if avg <= 0.0 || !avg.is_finite() {
            return false;
        }
        current > ratio * avg
    }
}

/// Market data provider trait: the host-platform seam used by
/// `get_current_regime` to assemble fresh snapshots.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Get the most recent candles for a symbol and timeframe
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError>;

    /// Get pre-computed technical indicators for a symbol and timeframe
    async fn get_indicators(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSet, MarketDataError>;
}

/// A mock implementation of MarketDataProvider for testing
pub struct MockMarketDataProvider {
    /// Predefined candles for testing
    test_candles: HashMap<(Symbol, Timeframe), Vec<Candle>>,
    /// Predefined indicators for testing
    test_indicators: HashMap<(Symbol, Timeframe), IndicatorSet>,
}

impl MockMarketDataProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            test_candles: HashMap::new(),
            test_indicators: HashMap::new(),
        }
    }

    /// Add test candles
    pub fn add_candles(&mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.test_candles.insert((symbol.to_string(), timeframe), candles);
    }

    /// Add test indicators
    pub fn add_indicators(&mut self, symbol: &str, timeframe: Timeframe, indicators: IndicatorSet) {
        self.test_indicators
            .insert((symbol.to_string(), timeframe), indicators);
    }
}

impl Default for MockMarketDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        _limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.test_candles
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .ok_or_else(|| {
                MarketDataError::DataNotAvailable(format!(
                    "No mock candles for {}:{}",
                    symbol, timeframe
                ))
            })
    }

    async fn get_indicators(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<IndicatorSet, MarketDataError> {
        self.test_indicators
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .ok_or_else(|| {
                MarketDataError::DataNotAvailable(format!(
                    "No mock indicators for {}:{}",
                    symbol, timeframe
                ))
            })
    }
}
