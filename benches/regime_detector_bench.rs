use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use regime_core::market::{Candle, IndicatorSet, Timeframe, TimeframeSnapshot};
use regime_core::regime::detector::VolatilityRegimeDetector;
use regime_core::regime::{RegimeConfig, RegimeDetector};
use regime_core::storage::InMemoryBreakoutStore;

fn candle(ts: DateTime<Utc>, close: f64) -> Candle {
    let c = Decimal::from_f64(close).unwrap();
    Candle::new(
        ts,
        c,
        c + Decimal::ONE,
        c - Decimal::ONE,
        c,
        Decimal::from_f64(1000.0).unwrap(),
    )
}

fn synthetic_snapshot(start: DateTime<Utc>, bars: usize, step_minutes: i64) -> TimeframeSnapshot {
    let candles: Vec<Candle> = (0..bars)
        .map(|i| {
            // Gentle oscillation so every metric has work to do
            let close = 100.0 + (i as f64 * 0.7).sin() * 2.0;
            candle(start + Duration::minutes(step_minutes * i as i64), close)
        })
        .collect();
    TimeframeSnapshot::new(
        candles,
        IndicatorSet {
            atr_14: Some(1.2),
            atr_50: Some(1.0),
            bollinger: None,
            adx: Some(22.0),
        },
    )
}

fn bench_regime_detector(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("VolatilityRegimeDetector");

    let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
    let mut timeframe_data = HashMap::new();
    for tf in [Timeframe::Minute5, Timeframe::Minute15, Timeframe::Hour1] {
        let span = tf.to_minutes() * 50;
        timeframe_data.insert(
            tf,
            synthetic_snapshot(now - Duration::minutes(span), 50, tf.to_minutes()),
        );
    }

    group.bench_function(
        BenchmarkId::new("detect_regime", "three_timeframes_50_bars"),
        |b| {
            let detector = VolatilityRegimeDetector::new(
                RegimeConfig::default(),
                Arc::new(InMemoryBreakoutStore::new()),
                None,
            );
            b.iter(|| {
                rt.block_on(async {
                    let detection = detector
                        .detect_regime("BTC/USDT", black_box(&timeframe_data), Some(now))
                        .await;
                    black_box(detection.regime)
                })
            })
        },
    );

    group.finish();
}

criterion_group!(benches, bench_regime_detector);
criterion_main!(benches);
