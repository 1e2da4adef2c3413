use chrono::SecondsFormat;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::db::SCHEMA;
use crate::error::StorageError;
use crate::models::{NewTradeLog, RecordId, TradeLogRecord};

pub const TRADE_LOGS_TABLE: &str = "trade_logs";

pub const TRADE_LOGS_COLUMNS: [&str; 10] = [
    "id",
    "timestamp",
    "model_version",
    "symbol",
    "direction",
    "entry_price",
    "probability_score",
    "outcome",
    "points_gained_lost",
    "max_favorable_excursion",
];

pub struct TradeLogRepository;

impl TradeLogRepository {
    /// Idempotent. Fails if an existing `trade_logs` table lacks any of the
    /// expected columns, since other brains write to the same table.
    pub async fn create_table_if_absent(pool: &SqlitePool) -> Result<(), StorageError> {
        let present = Self::table_columns(pool).await?;
        if !present.is_empty() {
            let missing: Vec<&'static str> = TRADE_LOGS_COLUMNS
                .iter()
                .copied()
                .filter(|c| !present.iter().any(|p| p == c))
                .collect();

            if !missing.is_empty() {
                return Err(StorageError::SchemaMismatch {
                    table: TRADE_LOGS_TABLE,
                    missing,
                });
            }
        }

        sqlx::raw_sql(SCHEMA).execute(pool).await?;
        Ok(())
    }

    /// Inserts one record in its own transaction and returns its id.
    /// On failure the transaction is rolled back before the error is returned.
    pub async fn insert(pool: &SqlitePool, record: &NewTradeLog) -> Result<RecordId, StorageError> {
        let mut tx = pool.begin().await?;

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
                INSERT INTO trade_logs (
                    timestamp, model_version, symbol, direction, entry_price, probability_score
                ) VALUES (?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
        )
        // Same shape as the column default: 2025-03-03T14:30:00.000Z
        .bind(record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
        .bind(&record.model_version)
        .bind(&record.symbol)
        .bind(&record.direction)
        .bind(record.entry_price)
        .bind(record.probability_score)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(id) => {
                tx.commit().await?;
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback after failed insert also failed: {}", rollback_err);
                }
                Err(e.into())
            }
        }
    }

    pub async fn fetch_recent(
        pool: &SqlitePool,
        symbol: &str,
        limit: i64,
    ) -> Result<Vec<TradeLogRecord>, StorageError> {
        let records = sqlx::query_as::<_, TradeLogRecord>(
            r#"
                SELECT id, timestamp, model_version, symbol, direction, entry_price,
                       probability_score, outcome, points_gained_lost, max_favorable_excursion
                FROM trade_logs
                WHERE symbol = ?
                ORDER BY id DESC
                LIMIT ?
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, StorageError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trade_logs")
            .fetch_one(pool)
            .await?;
        Ok(n)
    }

    pub async fn table_columns(pool: &SqlitePool) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT name FROM pragma_table_info('trade_logs')")
            .fetch_all(pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            columns.push(row.try_get::<String, _>("name")?);
        }
        Ok(columns)
    }
}
