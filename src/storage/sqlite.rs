//! SQLite store implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboard reads don't block ingestion writes
//! - **Connection pooling**: Handler tasks share a small pool
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Current-state replacement is a single `INSERT ... ON CONFLICT DO UPDATE`
//! statement keyed by `node_id`, so there is no window in which a node has
//! zero or two current rows.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, HistoryQuery, Store};
use super::error::{StorageError, StorageResult};
use crate::{
    Authority, BreakdownEvent, GeoPoint, HistoryPoint, RecordedBreakdown, RelayState,
    TelemetrySample,
};

/// SQLite store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    ///
    /// ```no_run
    /// # use powerline_monitoring::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./powerline.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn relay_from_row(row: &SqliteRow) -> StorageResult<RelayState> {
        let text: String = row.try_get("relay_state")?;
        text.parse().map_err(StorageError::SerializationError)
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<TelemetrySample> {
        let lat: Option<f64> = row.try_get("lat")?;
        let lon: Option<f64> = row.try_get("lon")?;

        Ok(TelemetrySample {
            node_id: row.try_get("node_id")?,
            current: row.try_get("current")?,
            voltage: row.try_get("voltage")?,
            voltage_present: row.try_get("voltage_present")?,
            relay_state: Self::relay_from_row(row)?,
            location: lat.zip(lon).map(|(lat, lon)| GeoPoint { lat, lon }),
            observed_at: Self::millis_to_timestamp(row.try_get("observed_at")?),
        })
    }

    fn breakdown_from_row(row: &SqliteRow) -> StorageResult<RecordedBreakdown> {
        Ok(RecordedBreakdown {
            id: row.try_get("id")?,
            recorded_at: Self::millis_to_timestamp(row.try_get("recorded_at")?),
            event: BreakdownEvent {
                node_id: row.try_get("node_id")?,
                message: row.try_get("message")?,
                current: row.try_get("current")?,
                voltage_present: row.try_get("voltage_present")?,
                relay_state: Self::relay_from_row(row)?,
                location: GeoPoint {
                    lat: row.try_get("lat")?,
                    lon: row.try_get("lon")?,
                },
                occurred_at: Self::millis_to_timestamp(row.try_get("occurred_at")?),
            },
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    #[instrument(skip(self, sample), fields(node_id = %sample.node_id))]
    async fn reconcile_current(&self, sample: &TelemetrySample) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO current_telemetry (
                node_id, current, voltage, voltage_present, relay_state, lat, lon, observed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (node_id) DO UPDATE SET
                current = excluded.current,
                voltage = excluded.voltage,
                voltage_present = excluded.voltage_present,
                relay_state = excluded.relay_state,
                lat = excluded.lat,
                lon = excluded.lon,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(&sample.node_id)
        .bind(sample.current)
        .bind(sample.voltage)
        .bind(sample.voltage_present)
        .bind(sample.relay_state.to_string())
        .bind(sample.location.map(|l| l.lat))
        .bind(sample.location.map(|l| l.lon))
        .bind(Self::timestamp_to_millis(&sample.observed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn current_for(&self, node_id: &str) -> StorageResult<Option<TelemetrySample>> {
        let row = sqlx::query("SELECT * FROM current_telemetry WHERE node_id = ?")
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }

    async fn list_current(&self, limit: usize) -> StorageResult<Vec<TelemetrySample>> {
        let rows =
            sqlx::query("SELECT * FROM current_telemetry ORDER BY observed_at DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(Self::sample_from_row).collect()
    }

    #[instrument(skip(self, point))]
    async fn append_history(&self, node_id: &str, point: HistoryPoint) -> StorageResult<()> {
        sqlx::query("INSERT INTO telemetry_history (node_id, current, timestamp) VALUES (?, ?, ?)")
            .bind(node_id)
            .bind(point.current)
            .bind(Self::timestamp_to_millis(&point.timestamp))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(node_id = %query.node_id))]
    async fn query_history(&self, query: HistoryQuery) -> StorageResult<Vec<HistoryPoint>> {
        let start = query.start.as_ref().map(Self::timestamp_to_millis);
        let end = query.end.as_ref().map(Self::timestamp_to_millis);
        // LIMIT -1 means "no limit" in SQLite
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT id, current, timestamp FROM (
                SELECT id, current, timestamp
                FROM telemetry_history
                WHERE node_id = ?
                  AND (? IS NULL OR timestamp >= ?)
                  AND (? IS NULL OR timestamp <= ?)
                ORDER BY id DESC
                LIMIT ?
            )
            ORDER BY id ASC
            "#,
        )
        .bind(&query.node_id)
        .bind(start)
        .bind(start)
        .bind(end)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let points = rows
            .iter()
            .map(|row| {
                Ok(HistoryPoint {
                    current: row.try_get("current")?,
                    timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        debug!("history query returned {} points", points.len());
        Ok(points)
    }

    #[instrument(skip(self, event), fields(node_id = %event.node_id))]
    async fn append_breakdown(&self, event: &BreakdownEvent) -> StorageResult<RecordedBreakdown> {
        let recorded_at = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO breakdown_events (
                node_id, message, current, voltage_present, relay_state,
                lat, lon, occurred_at, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.node_id)
        .bind(&event.message)
        .bind(event.current)
        .bind(event.voltage_present)
        .bind(event.relay_state.to_string())
        .bind(event.location.lat)
        .bind(event.location.lon)
        .bind(Self::timestamp_to_millis(&event.occurred_at))
        .bind(Self::timestamp_to_millis(&recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(RecordedBreakdown {
            id: result.last_insert_rowid(),
            // round-trip through millis so the value matches what a later read returns
            recorded_at: Self::millis_to_timestamp(Self::timestamp_to_millis(&recorded_at)),
            event: event.clone(),
        })
    }

    async fn list_breakdowns(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<RecordedBreakdown>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM breakdown_events
            WHERE (? IS NULL OR node_id = ?)
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(node_id)
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::breakdown_from_row).collect()
    }

    async fn count_breakdowns(&self) -> StorageResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM breakdown_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    async fn query_authorities(&self, node_id: &str) -> StorageResult<Vec<Authority>> {
        let rows = sqlx::query(
            r#"
            SELECT entity_id, name, contact_number, contact_email, node_id
            FROM authorities
            WHERE node_id = ?
            ORDER BY entity_id
            "#,
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Authority {
                    entity_id: row.try_get("entity_id")?,
                    name: row.try_get("name")?,
                    contact_number: row.try_get("contact_number")?,
                    contact_email: row.try_get("contact_email")?,
                    node_id: row.try_get("node_id")?,
                })
            })
            .collect()
    }

    async fn upsert_authority(&self, authority: Authority) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO authorities (entity_id, name, contact_number, contact_email, node_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (entity_id) DO UPDATE SET
                name = excluded.name,
                contact_number = excluded.contact_number,
                contact_email = excluded.contact_email,
                node_id = excluded.node_id
            "#,
        )
        .bind(&authority.entity_id)
        .bind(&authority.name)
        .bind(&authority.contact_number)
        .bind(&authority.contact_email)
        .bind(&authority.node_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite store operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
