use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::{debug, info};

use super::ShipmentStore;
use crate::config::DatabaseConfig;
use crate::errors::StorageError;
use crate::shipment::{NewShipment, Shipment, ShipmentId, ShipmentStatus, TrackingId};

/// SQLite-backed shipment store
pub struct SqliteShipmentStore {
    pool: SqlitePool,
}

impl SqliteShipmentStore {
    /// Open (creating if needed) the database and optionally run migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let url = &config.url;
        if !sqlx::Sqlite::database_exists(url).await.map_err(map_sqlx)? {
            info!("Creating database at {}", url);
            sqlx::Sqlite::create_database(url).await.map_err(map_sqlx)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(map_sqlx)?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| StorageError::unavailable(format!("migration failed: {e}")))?;
            info!("Database migrations completed");
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        info!("Shutting down database connections...");
        self.pool.close().await;
        info!("Database connections closed");
    }
}

#[async_trait]
impl ShipmentStore for SqliteShipmentStore {
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT id, tracking_id, status, workflow_run_id, created_at, updated_at
            FROM shipments
            WHERE id = ?1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|row| decode_row(&row)).transpose()
    }

    async fn exists_by_tracking_id(&self, tracking_id: &str) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM shipments WHERE tracking_id = ?1) AS taken")
            .bind(tracking_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        let taken: i64 = row.try_get("taken").map_err(map_sqlx)?;
        Ok(taken != 0)
    }

    async fn insert(&self, shipment: NewShipment) -> Result<Shipment, StorageError> {
        let created_at = shipment.created_at.to_rfc3339();
        let row = sqlx::query(
            r#"
            INSERT INTO shipments (tracking_id, status, workflow_run_id, created_at, updated_at)
            VALUES (?1, ?2, NULL, ?3, ?3)
            RETURNING id
            "#,
        )
        .bind(shipment.tracking_id.as_str())
        .bind(ShipmentStatus::Pending.as_str())
        .bind(&created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let id: i64 = row.try_get("id").map_err(map_sqlx)?;
        let stored = shipment.into_shipment(ShipmentId(id));
        debug!(shipment_id = id, tracking_id = %stored.tracking_id, "Inserted shipment");
        Ok(stored)
    }

    async fn save(&self, shipment: Shipment) -> Result<Shipment, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO shipments (id, tracking_id, status, workflow_run_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                workflow_run_id = excluded.workflow_run_id,
                updated_at = excluded.updated_at
            WHERE shipments.tracking_id = excluded.tracking_id
            "#,
        )
        .bind(shipment.id.value())
        .bind(shipment.tracking_id.as_str())
        .bind(shipment.status.as_str())
        .bind(shipment.workflow_run_id.as_deref())
        .bind(shipment.created_at.to_rfc3339())
        .bind(shipment.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(self.tracking_id_changed(&shipment).await?.unwrap_or_else(|| {
                StorageError::Corrupt {
                    reason: format!("upsert of shipment {} wrote nothing", shipment.id),
                }
            }));
        }

        debug!(shipment_id = %shipment.id, status = %shipment.status, "Saved shipment");
        Ok(shipment)
    }

    async fn save_if_status(
        &self,
        shipment: Shipment,
        expected: ShipmentStatus,
    ) -> Result<Option<Shipment>, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE shipments
            SET status = ?1, workflow_run_id = ?2, updated_at = ?3
            WHERE id = ?4 AND status = ?5 AND tracking_id = ?6
            "#,
        )
        .bind(shipment.status.as_str())
        .bind(shipment.workflow_run_id.as_deref())
        .bind(shipment.updated_at.to_rfc3339())
        .bind(shipment.id.value())
        .bind(expected.as_str())
        .bind(shipment.tracking_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            if let Some(err) = self.tracking_id_changed(&shipment).await? {
                return Err(err);
            }
            debug!(
                shipment_id = %shipment.id,
                expected = %expected,
                "Conditional save skipped, status moved"
            );
            return Ok(None);
        }

        debug!(shipment_id = %shipment.id, status = %shipment.status, "Saved shipment");
        Ok(Some(shipment))
    }
}

impl SqliteShipmentStore {
    /// Explain a write that matched no row because the stored tracking id differs.
    async fn tracking_id_changed(
        &self,
        shipment: &Shipment,
    ) -> Result<Option<StorageError>, StorageError> {
        let stored = self.find_by_id(shipment.id).await?;
        Ok(stored
            .filter(|stored| stored.tracking_id != shipment.tracking_id)
            .map(|stored| StorageError::TrackingIdChanged {
                shipment_id: shipment.id,
                stored: stored.tracking_id.into_inner(),
                requested: shipment.tracking_id.to_string(),
            }))
    }
}

fn decode_row(row: &SqliteRow) -> Result<Shipment, StorageError> {
    let id: i64 = row.try_get("id").map_err(map_sqlx)?;
    let tracking_id: String = row.try_get("tracking_id").map_err(map_sqlx)?;
    let status: String = row.try_get("status").map_err(map_sqlx)?;
    let workflow_run_id: Option<String> = row.try_get("workflow_run_id").map_err(map_sqlx)?;
    let created_at: String = row.try_get("created_at").map_err(map_sqlx)?;
    let updated_at: String = row.try_get("updated_at").map_err(map_sqlx)?;

    let status = status.parse::<ShipmentStatus>().map_err(|e| StorageError::Corrupt {
        reason: format!("shipment {id}: {e}"),
    })?;

    Ok(Shipment {
        id: ShipmentId(id),
        tracking_id: TrackingId::new(tracking_id),
        status,
        workflow_run_id,
        created_at: parse_timestamp(id, &created_at)?,
        updated_at: parse_timestamp(id, &updated_at)?,
    })
}

fn parse_timestamp(id: i64, raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            reason: format!("shipment {id}: bad timestamp '{raw}': {e}"),
        })
}

fn map_sqlx(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::UniqueViolation {
            constraint: db.message().to_string(),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StorageError::Corrupt {
                reason: err.to_string(),
            }
        }
        other => StorageError::unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteShipmentStore {
        let path = dir.path().join("shipments.db");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            auto_migrate: true,
        };
        SqliteShipmentStore::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_find_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let inserted = store
            .insert(NewShipment::new(TrackingId::new("20240101123045712")))
            .await
            .unwrap();
        let loaded = store.find_by_id(inserted.id).await.unwrap().unwrap();

        assert_eq!(loaded.tracking_id.as_str(), "20240101123045712");
        assert_eq!(loaded.status, ShipmentStatus::Pending);
        assert_eq!(loaded.workflow_run_id, None);
        assert!(store.exists_by_tracking_id("20240101123045712").await.unwrap());
    }

    #[tokio::test]
    async fn test_unique_tracking_id_enforced_at_commit() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .insert(NewShipment::new(TrackingId::new("20240101123045712")))
            .await
            .unwrap();
        let err = store
            .insert(NewShipment::new(TrackingId::new("20240101123045712")))
            .await
            .unwrap_err();

        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_save_updates_status_and_run_together() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let mut shipment = store
            .insert(NewShipment::new(TrackingId::new("20240101123045001")))
            .await
            .unwrap();
        shipment.status = ShipmentStatus::Received;
        shipment.workflow_run_id = Some("run-B".to_string());
        shipment.updated_at = Utc::now();
        store.save(shipment.clone()).await.unwrap();

        let loaded = store.find_by_id(shipment.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ShipmentStatus::Received);
        assert_eq!(loaded.workflow_run_id.as_deref(), Some("run-B"));
        assert_eq!(loaded.created_at, shipment.created_at);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn test_conditional_save_loses_to_earlier_writer() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let pending = store
            .insert(NewShipment::new(TrackingId::new("20240101123045002")))
            .await
            .unwrap();

        let mut first = pending.clone();
        first.status = ShipmentStatus::Received;
        first.workflow_run_id = Some("run-A".to_string());
        let won = store
            .save_if_status(first, ShipmentStatus::Pending)
            .await
            .unwrap();
        assert!(won.is_some());

        let mut second = pending.clone();
        second.status = ShipmentStatus::Received;
        second.workflow_run_id = Some("run-B".to_string());
        let lost = store
            .save_if_status(second, ShipmentStatus::Pending)
            .await
            .unwrap();
        assert!(lost.is_none());

        let loaded = store.find_by_id(pending.id).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_run_id.as_deref(), Some("run-A"));
    }

    #[tokio::test]
    async fn test_tracking_id_change_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let original = store
            .insert(NewShipment::new(TrackingId::new("20240101123045003")))
            .await
            .unwrap();
        let mut renamed = original.clone();
        renamed.tracking_id = TrackingId::new("20240101123045999");

        let err = store.save(renamed.clone()).await.unwrap_err();
        assert!(matches!(err, StorageError::TrackingIdChanged { .. }));
        let err = store
            .save_if_status(renamed, ShipmentStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::TrackingIdChanged { .. }));

        let loaded = store.find_by_id(original.id).await.unwrap().unwrap();
        assert_eq!(loaded.tracking_id.as_str(), "20240101123045003");
    }
}
