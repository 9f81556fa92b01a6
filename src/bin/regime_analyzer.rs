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

//! Offline regime analysis over a captured candle file.
//!
//! The input is a JSON object keyed by timeframe ("5m", "15m", "1h", ...),
//! each entry holding a candle array and optional indicator values.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use regime_core::market::{Candle, IndicatorSet, Timeframe, TimeframeSnapshot};
use regime_core::regime::{create_regime_detector_with_config, RegimeConfig};
use regime_core::storage::{create_breakout_store, StorageConfig, StorageType};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database path for the breakout ledger (in-memory when absent)
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the current regime from a captured snapshot file
    Analyze {
        /// Symbol the snapshot belongs to
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Snapshot JSON file, keyed by timeframe
        #[arg(short, long)]
        file: PathBuf,

        /// Override the evaluation clock (RFC 3339) for replay
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Print the recorded breakout history for a (symbol, timeframe)
    History {
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        #[arg(short, long, default_value = "15m")]
        timeframe: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Deserialize)]
struct SnapshotInput {
    candles: Vec<Candle>,
    #[serde(default)]
    indicators: IndicatorSet,
}

fn load_snapshots(
    path: &PathBuf,
) -> Result<HashMap<Timeframe, TimeframeSnapshot>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let parsed: HashMap<String, SnapshotInput> = serde_json::from_str(&raw)?;

    let mut data = HashMap::new();
    for (key, input) in parsed {
        let timeframe = Timeframe::parse(&key)
            .ok_or_else(|| format!("Unknown timeframe key: {}", key))?;
        data.insert(
            timeframe,
            TimeframeSnapshot::new(input.candles, input.indicators),
        );
    }
    Ok(data)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let storage_config = match &cli.db {
        Some(path) => StorageConfig {
            storage_type: StorageType::Sqlite,
            db_path: Some(path.clone()),
            ..Default::default()
        },
        None => StorageConfig {
            storage_type: StorageType::Memory,
            db_path: None,
            ..Default::default()
        },
    };
    let store = create_breakout_store(&storage_config).await?;

    match cli.command {
        Commands::Analyze { symbol, file, time } => {
            let timeframe_data = load_snapshots(&file)?;
            let current_time = match time {
                Some(t) => Some(DateTime::parse_from_rfc3339(&t)?.with_timezone(&Utc)),
                None => None,
            };

            info!(
                symbol,
                timeframes = timeframe_data.len(),
                "Running regime detection"
            );
            let detector =
                create_regime_detector_with_config(RegimeConfig::default(), store, None);
            let detection = detector
                .detect_regime(&symbol, &timeframe_data, current_time)
                .await;

            println!("{}", serde_json::to_string_pretty(&detection)?);
        }
        Commands::History {
            symbol,
            timeframe,
            limit,
        } => {
            let timeframe = Timeframe::parse(&timeframe)
                .ok_or_else(|| format!("Unknown timeframe: {}", timeframe))?;
            let events = store.history(&symbol, timeframe, limit).await?;
            if events.is_empty() {
                info!(symbol, tf = timeframe.as_str(), "No breakout events recorded");
            }
            for event in events {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }

    Ok(())
}
