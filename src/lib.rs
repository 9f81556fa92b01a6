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

//! # regime_core
//!
//! Multi-timeframe volatility regime detection with a durable breakout
//! ledger. Feed it per-timeframe candle windows and indicators, get back
//! one of seven mutually exclusive regime labels with a confidence score
//! and full diagnostics.

pub mod market;
pub mod regime;
pub mod storage;

pub use market::{
    Candle, IndicatorSet, MarketDataError, MarketDataProvider, Symbol, Timeframe,
    TimeframeSnapshot,
};
pub use regime::{
    create_regime_detector, create_regime_detector_with_config, RegimeConfig, RegimeDetection,
    RegimeDetector, RegimeError, RegimeResult, VolatilityRegime,
};
pub use storage::{
    create_breakout_store, BreakoutEvent, BreakoutKind, BreakoutStore, StorageConfig,
    StorageError, StorageType,
};
