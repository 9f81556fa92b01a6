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
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::market::{Candle, Symbol, Timeframe};
use crate::storage::{BreakoutEvent, BreakoutKind, BreakoutStore};
use crate::regime::RegimeConfig;

/// How long ago the last breakout happened, as seen through the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BreakoutRecency {
    /// The store has not answered yet (fresh start or store failure)
    Unknown,
    /// The store answered: no active breakout on record
    None,
    /// An active breakout exists
    Since {
        minutes: i64,
        hours: f64,
        kind: BreakoutKind,
        price: f64,
        /// True when the breakout is younger than the recency cutoff
        is_recent: bool,
    },
}

impl BreakoutRecency {
    /// Age in minutes, when known
    pub fn age_minutes(&self) -> Option<i64> {
        match self {
            BreakoutRecency::Since { minutes, .. } => Some(*minutes),
            _ => None,
        }
    }

    pub fn is_recent(&self) -> bool {
        matches!(self, BreakoutRecency::Since { is_recent: true, .. })
    }
}

/// Detect a breakout transition on the latest bar of a candle window.
///
/// The comparison window is the 20 bars immediately before the current
/// one. A breakout requires a strict transition: the current close is
/// beyond the window extreme AND the previous close was not already
/// beyond its own trailing window. The same rule applies to volume
/// against `volume_ratio` times the window average. Price breakouts
/// take priority over volume breakouts.
pub fn detect_breakout(
    candles: &[Candle],
    volume_ratio: f64,
) -> Option<(BreakoutKind, f64)> {
    if candles.len() < 21 {
        return None;
    }
    let current = &candles[candles.len() - 1];
    let previous = &candles[candles.len() - 2];
    let window = &candles[candles.len() - 21..candles.len() - 1];

    let high20 = window.iter().map(|c| c.high).max()?;
    let low20 = window.iter().map(|c| c.low).min()?;

    // Previous bar judged against the window one bar back; with the bare
    // 21-bar minimum no prior window exists and the transition passes
    let (prev_above, prev_below) = if candles.len() >= 22 {
        let prev_window = &candles[candles.len() - 22..candles.len() - 2];
        let prev_high = prev_window.iter().map(|c| c.high).max()?;
        let prev_low = prev_window.iter().map(|c| c.low).min()?;
        (previous.close > prev_high, previous.close < prev_low)
    } else {
        (false, false)
    };

    if current.close > high20 && !prev_above {
        return Some((BreakoutKind::PriceUp, current.close_f64()));
    }
    if current.close < low20 && !prev_below {
        return Some((BreakoutKind::PriceDown, current.close_f64()));
    }

    let avg_volume = window.iter().map(|c| c.volume_f64()).sum::<f64>() / window.len() as f64;
    if avg_volume > 0.0 && avg_volume.is_finite() {
        let threshold = volume_ratio * avg_volume;
        if current.volume_f64() > threshold && previous.volume_f64() <= threshold {
            return Some((BreakoutKind::Volume, current.close_f64()));
        }
    }

    None
}

type LedgerKey = (Symbol, Timeframe);

/// Durable breakout ledger with a write-through in-memory cache.
///
/// The cache maps (symbol, timeframe) to the last known active event;
/// map presence means the store has answered at least once. All store
/// calls are serialized by a dedicated lock and bounded by a timeout so
/// a stalled store degrades the reading instead of stalling detection.
/// The cache lock is never held across a store await.
pub struct BreakoutLedger {
    store: Arc<dyn BreakoutStore>,
    cache: RwLock<HashMap<LedgerKey, Option<BreakoutEvent>>>,
    store_lock: Mutex<()>,
    store_timeout: Duration,
    recent_minutes: i64,
    dedup_price_tolerance: f64,
    dedup_window_bars: i64,
}

impl BreakoutLedger {
    pub fn new(store: Arc<dyn BreakoutStore>, config: &RegimeConfig) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            store_lock: Mutex::new(()),
            store_timeout: Duration::from_millis(config.store_timeout_ms),
            recent_minutes: config.breakout_recent_minutes,
            dedup_price_tolerance: config.dedup_price_tolerance,
            dedup_window_bars: config.dedup_window_bars,
        }
    }

    fn is_duplicate(
        &self,
        cached: &BreakoutEvent,
        kind: BreakoutKind,
        price: f64,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> bool {
        if cached.kind != kind {
            return false;
        }
        let rel_tolerance = cached.price.abs().max(1.0) * self.dedup_price_tolerance;
        if (cached.price - price).abs() > rel_tolerance {
            return false;
        }
        let window_minutes = self.dedup_window_bars * timeframe.to_minutes();
        cached.age_minutes(now) <= window_minutes
    }

    /// Observe the latest candle window for a (symbol, timeframe) and
    /// record any genuine new breakout. A store failure is logged and the
    /// write dropped; the in-memory cache still reflects the observation
    /// so the current call's diagnostics stay coherent.
    pub async fn observe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        volume_ratio: f64,
        now: DateTime<Utc>,
    ) {
        let (kind, price) = match detect_breakout(candles, volume_ratio) {
            Some(hit) => hit,
            None => return,
        };

        let key = (symbol.to_string(), timeframe);
        {
            let cache = self.cache.read().await;
            if let Some(Some(cached)) = cache.get(&key) {
                if self.is_duplicate(cached, kind, price, timeframe, now) {
                    debug!(symbol, tf = timeframe.as_str(), "Suppressed duplicate breakout");
                    return;
                }
            }
        }

        let event = BreakoutEvent::new(symbol, timeframe, kind, price, now);
        debug!(
            symbol,
            tf = timeframe.as_str(),
            kind = %kind,
            price,
            "Breakout transition detected"
        );

        {
            let _guard = self.store_lock.lock().await;
            match tokio::time::timeout(self.store_timeout, self.store.record_event(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(symbol, tf = timeframe.as_str(), error = %e, "Breakout write failed");
                }
                Err(_) => {
                    warn!(symbol, tf = timeframe.as_str(), "Breakout write timed out");
                }
            }
        }

        // Cache refreshed even on a dropped write so the current call's
        // diagnostics stay coherent
        let mut cache = self.cache.write().await;
        cache.insert(key, Some(event));
    }

    /// Time since the last breakout for a (symbol, timeframe). Served
    /// from the cache when the store has already answered; otherwise one
    /// bounded store read populates it. Failures yield `Unknown`.
    pub async fn recency(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> BreakoutRecency {
        let key = (symbol.to_string(), timeframe);
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&key) {
                return self.recency_of(entry.as_ref(), now);
            }
        }

        let fetched = {
            let _guard = self.store_lock.lock().await;
            tokio::time::timeout(self.store_timeout, self.store.latest_active(symbol, timeframe))
                .await
        };

        match fetched {
            Ok(Ok(entry)) => {
                let recency = self.recency_of(entry.as_ref(), now);
                let mut cache = self.cache.write().await;
                cache.insert(key, entry);
                recency
            }
            Ok(Err(e)) => {
                warn!(symbol, tf = timeframe.as_str(), error = %e, "Breakout read failed");
                BreakoutRecency::Unknown
            }
            Err(_) => {
                warn!(symbol, tf = timeframe.as_str(), "Breakout read timed out");
                BreakoutRecency::Unknown
            }
        }
    }

    fn recency_of(&self, event: Option<&BreakoutEvent>, now: DateTime<Utc>) -> BreakoutRecency {
        match event {
            None => BreakoutRecency::None,
            Some(e) => {
                let minutes = e.age_minutes(now).max(0);
                BreakoutRecency::Since {
                    minutes,
                    hours: minutes as f64 / 60.0,
                    kind: e.kind,
                    price: e.price,
                    is_recent: minutes < self.recent_minutes,
                }
            }
        }
    }
}
