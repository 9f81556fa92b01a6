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

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::market::{Symbol, Timeframe};

/// Errors that can occur during breakout storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Kind of breakout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreakoutKind {
    /// Close broke above the trailing 20-bar high
    PriceUp,
    /// Close broke below the trailing 20-bar low
    PriceDown,
    /// Volume broke above 1.5x the trailing 20-bar average
    Volume,
}

impl BreakoutKind {
    /// Stable string form used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakoutKind::PriceUp => "price_up",
            BreakoutKind::PriceDown => "price_down",
            BreakoutKind::Volume => "volume",
        }
    }

    /// Parse the persisted string form
    pub fn parse(s: &str) -> Option<BreakoutKind> {
        match s {
            "price_up" => Some(BreakoutKind::PriceUp),
            "price_down" => Some(BreakoutKind::PriceDown),
            "volume" => Some(BreakoutKind::Volume),
            _ => None,
        }
    }
}

impl fmt::Display for BreakoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durably recorded breakout transition.
///
/// Events are created only on a genuine transition into a broken state and
/// are never physically deleted: a new event deactivates the prior one, so
/// the table doubles as an audit trail. At most one event is active per
/// (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutEvent {
    /// Unique event id
    pub id: Uuid,
    /// Symbol the breakout belongs to
    pub symbol: Symbol,
    /// Timeframe the breakout was detected on
    pub timeframe: Timeframe,
    /// Kind of transition
    pub kind: BreakoutKind,
    /// Closing price of the breakout bar
    pub price: f64,
    /// When the breakout was observed
    pub timestamp: DateTime<Utc>,
    /// Whether this is the current event for its (symbol, timeframe)
    pub active: bool,
}

impl BreakoutEvent {
    /// Create a new active breakout event
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        kind: BreakoutKind,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            timeframe,
            kind,
            price,
            timestamp,
            active: true,
        }
    }

    /// Age of this event in whole minutes relative to `now`
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.timestamp).num_minutes()
    }
}

/// Trait for durable breakout event storage. This engine is the sole writer
/// and owns the schema.
#[async_trait]
pub trait BreakoutStore: Send + Sync {
    /// Create the schema if needed
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Atomically deactivate any prior active event for the event's
    /// (symbol, timeframe) and insert the new one
    async fn record_event(&self, event: &BreakoutEvent) -> Result<(), StorageError>;

    /// The most recent active event for a (symbol, timeframe), if any
    async fn latest_active(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<BreakoutEvent>, StorageError>;

    /// Recent events for a (symbol, timeframe), newest first (audit trail)
    async fn history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<BreakoutEvent>, StorageError>;
}

/// Type of storage backend
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StorageType {
    /// In-memory storage (non-persistent, used in tests and degraded mode)
    Memory,
    /// SQLite database storage (WAL mode so readers are not blocked by writers)
    Sqlite,
}

/// Configuration for the breakout store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    pub storage_type: StorageType,
    /// Database file path (for SQLite storage)
    pub db_path: Option<String>,
    /// Busy timeout applied to SQLite connections, in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            db_path: Some("./regime_breakouts.db".to_string()),
            busy_timeout_ms: 500,
        }
    }
}

/// SQLite-backed breakout store
pub struct SqliteBreakoutStore {
    pool: SqlitePool,
}

impl SqliteBreakoutStore {
    /// Open (creating if missing) the database at `path` in WAL mode
    pub async fn open(path: &str, busy_timeout_ms: u64) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    fn row_to_event(row: &SqliteRow) -> Result<BreakoutEvent, StorageError> {
        let id: String = row.try_get("id")?;
        let symbol: String = row.try_get("symbol")?;
        let timeframe: String = row.try_get("timeframe")?;
        let kind: String = row.try_get("kind")?;
        let price: f64 = row.try_get("price")?;
        let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
        let active: bool = row.try_get("active")?;

        Ok(BreakoutEvent {
            id: Uuid::parse_str(&id)
                .map_err(|e| StorageError::Internal(format!("Bad event id {}: {}", id, e)))?,
            symbol,
            timeframe: Timeframe::parse(&timeframe)
                .ok_or_else(|| StorageError::Internal(format!("Bad timeframe: {}", timeframe)))?,
            kind: BreakoutKind::parse(&kind)
                .ok_or_else(|| StorageError::Internal(format!("Bad breakout kind: {}", kind)))?,
            price,
            timestamp,
            active,
        })
    }
}

#[async_trait]
impl BreakoutStore for SqliteBreakoutStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS breakout_events (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                kind TEXT NOT NULL,
                price REAL NOT NULL,
                timestamp TEXT NOT NULL,
                active INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_breakout_symbol_tf_active
             ON breakout_events (symbol, timeframe, active)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_breakout_timestamp
             ON breakout_events (timestamp)",
        )
        .execute(&self.pool)
        .await?;

        info!("Breakout event schema initialized");
        Ok(())
    }

    async fn record_event(&self, event: &BreakoutEvent) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE breakout_events SET active = 0
             WHERE symbol = ?1 AND timeframe = ?2 AND active = 1",
        )
        .bind(&event.symbol)
        .bind(event.timeframe.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO breakout_events (id, symbol, timeframe, kind, price, timestamp, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(event.id.to_string())
        .bind(&event.symbol)
        .bind(event.timeframe.as_str())
        .bind(event.kind.as_str())
        .bind(event.price)
        .bind(event.timestamp)
        .bind(event.active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_active(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<BreakoutEvent>, StorageError> {
        let row = sqlx::query(
            "SELECT id, symbol, timeframe, kind, price, timestamp, active
             FROM breakout_events
             WHERE symbol = ?1 AND timeframe = ?2 AND active = 1
             ORDER BY timestamp DESC
             LIMIT 1",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_event).transpose()
    }

    async fn history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<BreakoutEvent>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, symbol, timeframe, kind, price, timestamp, active
             FROM breakout_events
             WHERE symbol = ?1 AND timeframe = ?2
             ORDER BY timestamp DESC
             LIMIT ?3",
        )
        .bind(symbol)
        .bind(timeframe.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_event).collect()
    }
}

/// In-memory implementation of the breakout store
pub struct InMemoryBreakoutStore {
    events: RwLock<Vec<BreakoutEvent>>,
}

impl InMemoryBreakoutStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryBreakoutStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BreakoutStore for InMemoryBreakoutStore {
    async fn initialize(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn record_event(&self, event: &BreakoutEvent) -> Result<(), StorageError> {
        let mut events = self.events.write().await;
        for existing in events.iter_mut() {
            if existing.symbol == event.symbol
                && existing.timeframe == event.timeframe
                && existing.active
            {
                existing.active = false;
            }
        }
        events.push(event.clone());
        Ok(())
    }

    async fn latest_active(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<BreakoutEvent>, StorageError> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.symbol == symbol && e.timeframe == timeframe && e.active)
            .max_by_key(|e| e.timestamp)
            .cloned())
    }

    async fn history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<BreakoutEvent>, StorageError> {
        let events = self.events.read().await;
        let mut result: Vec<BreakoutEvent> = events
            .iter()
            .filter(|e| e.symbol == symbol && e.timeframe == timeframe)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        result.truncate(limit);
        Ok(result)
    }
}

/// Create a breakout store for the given configuration
pub async fn create_breakout_store(
    config: &StorageConfig,
) -> Result<Arc<dyn BreakoutStore>, StorageError> {
    let store: Arc<dyn BreakoutStore> = match config.storage_type {
        StorageType::Memory => Arc::new(InMemoryBreakoutStore::new()),
        StorageType::Sqlite => {
            let path = config
                .db_path
                .as_deref()
                .ok_or_else(|| StorageError::Internal("SQLite storage requires db_path".into()))?;
            Arc::new(SqliteBreakoutStore::open(path, config.busy_timeout_ms).await?)
        }
    };
    store.initialize().await?;
    Ok(store)
}
