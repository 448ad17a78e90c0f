use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::history::{HistoryStore, RawPoint, RawTimestamp, RawValue};
use crate::metrics::Metric;
use crate::models::SensorReading;
use crate::registry::{AddOutcome, DeviceSummary, NewDevice, RegistryStore};
use crate::services::collector::DeviceStore;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeviceRecord {
    pub device_id: String,
    pub name: String,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub recorded_at: DateTime<Utc>,
    pub reading: SensorReading,
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    recorded_at: DateTime<Utc>,
    aqi: Option<i16>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    co2: Option<f64>,
    hcho: Option<f64>,
    pm2_5: Option<f64>,
    pm1_0: Option<f64>,
    pm10: Option<f64>,
    tvoc: Option<f64>,
    co: Option<f64>,
    pm0_3: Option<f64>,
}

impl From<ReadingRow> for StoredReading {
    fn from(row: ReadingRow) -> Self {
        Self {
            recorded_at: row.recorded_at,
            reading: SensorReading {
                aqi: row.aqi,
                temperature: row.temperature,
                humidity: row.humidity,
                co2: row.co2,
                hcho: row.hcho,
                pm2_5: row.pm2_5,
                pm1_0: row.pm1_0,
                pm10: row.pm10,
                tvoc: row.tvoc,
                co: row.co,
                pm0_3: row.pm0_3,
            },
        }
    }
}

/// Postgres-backed device registry and reading time series.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    history_limit: i64,
}

impl PgStore {
    pub fn new(pool: PgPool, history_limit: i64) -> Self {
        Self {
            pool,
            history_limit: history_limit.max(1),
        }
    }

    pub async fn latest_reading(&self, device_id: &str) -> Result<Option<StoredReading>> {
        let row: Option<ReadingRow> = sqlx::query_as(
            r#"
            SELECT recorded_at, aqi, temperature, humidity, co2, hcho,
                   pm2_5, pm1_0, pm10, tvoc, co, pm0_3
            FROM readings
            WHERE device_id = $1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("failed to load latest reading for {device_id}"))?;
        Ok(row.map(StoredReading::from))
    }
}

impl HistoryStore for PgStore {
    async fn device_exists(&self, device_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM devices WHERE device_id = $1)")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await
                .context("failed to check device existence")?;
        Ok(exists)
    }

    async fn sensor_history(
        &self,
        device_id: &str,
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RawPoint>> {
        let sql = format!(
            r#"
            SELECT recorded_at, {column}::double precision AS value
            FROM readings
            WHERE device_id = $1
              AND recorded_at >= $2
              AND recorded_at <= $3
            ORDER BY recorded_at ASC
            LIMIT $4
            "#,
            column = metric.column()
        );
        let rows: Vec<(DateTime<Utc>, Option<f64>)> = sqlx::query_as(&sql)
            .bind(device_id)
            .bind(start)
            .bind(end)
            .bind(self.history_limit)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to query {metric} history for {device_id}"))?;

        Ok(rows
            .into_iter()
            .map(|(recorded_at, value)| RawPoint {
                timestamp: Some(RawTimestamp::Instant(recorded_at)),
                value: value.map(RawValue::Number),
            })
            .collect())
    }
}

impl DeviceStore for PgStore {
    async fn active_devices(&self) -> Result<Vec<DeviceRecord>> {
        sqlx::query_as(
            r#"
            SELECT device_id, name, ip_address
            FROM devices
            WHERE active = TRUE
            ORDER BY device_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list active devices")
    }

    async fn insert_reading(
        &self,
        device_id: &str,
        recorded_at: DateTime<Utc>,
        reading: &SensorReading,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (
                device_id, recorded_at, aqi, temperature, humidity, co2, hcho,
                pm2_5, pm1_0, pm10, tvoc, co, pm0_3
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(device_id)
        .bind(recorded_at)
        .bind(reading.aqi)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.co2)
        .bind(reading.hcho)
        .bind(reading.pm2_5)
        .bind(reading.pm1_0)
        .bind(reading.pm10)
        .bind(reading.tvoc)
        .bind(reading.co)
        .bind(reading.pm0_3)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert reading for {device_id}"))?;
        Ok(())
    }

    async fn threshold_recipients(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT email
            FROM users
            WHERE threshold_warning = TRUE
            ORDER BY email ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load threshold recipients")
    }
}

impl RegistryStore for PgStore {
    async fn list_devices(&self) -> Result<Vec<DeviceSummary>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT device_id, name, room, ip_address
            FROM devices
            WHERE active = TRUE
            ORDER BY device_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn add_device(&self, device: &NewDevice) -> Result<AddOutcome, sqlx::Error> {
        // xmax is zero only for freshly inserted rows.
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO devices (device_id, name, room, ip_address, active)
            VALUES ($1, $2, $3, $4, TRUE)
            ON CONFLICT (device_id) DO UPDATE
            SET name = EXCLUDED.name,
                room = EXCLUDED.room,
                ip_address = EXCLUDED.ip_address,
                active = TRUE
            WHERE devices.active = FALSE
            RETURNING (xmax = 0)
            "#,
        )
        .bind(&device.device_id)
        .bind(&device.name)
        .bind(&device.room)
        .bind(&device.ip_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(true) => AddOutcome::Created,
            Some(false) => AddOutcome::Reactivated,
            None => AddOutcome::AlreadyActive,
        })
    }

    async fn update_device(
        &self,
        device_id: &str,
        name: Option<&str>,
        room: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET name = COALESCE($2, name),
                room = COALESCE($3, room)
            WHERE device_id = $1
            "#,
        )
        .bind(device_id)
        .bind(name)
        .bind(room)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_device(&self, device_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE devices SET active = FALSE WHERE device_id = $1")
            .bind(device_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_threshold_warning(&self, email: &str, enabled: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET threshold_warning = $2 WHERE email = $1")
            .bind(email)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{build_history_response_at, Sample};
    use chrono::{Duration, TimeZone};
    use sqlx::postgres::PgPoolOptions;
    use std::env;

    async fn setup_test_pool(database_url: &str, schema: &str) -> Result<PgPool> {
        let admin_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        sqlx::query(&format!("DROP SCHEMA IF EXISTS {schema} CASCADE"))
            .execute(&admin_pool)
            .await?;
        sqlx::query(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin_pool)
            .await?;
        drop(admin_pool);

        let schema_name = schema.to_string();
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(move |conn, _meta| {
                let schema = schema_name.clone();
                Box::pin(async move {
                    sqlx::query(&format!("SET search_path TO {schema}"))
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        for ddl in [
            r#"
            CREATE TABLE devices (
                device_id text primary key,
                name text not null,
                ip_address text null,
                room text null,
                active boolean not null default true
            )
            "#,
            r#"
            CREATE TABLE readings (
                id bigserial primary key,
                device_id text not null references devices(device_id),
                recorded_at timestamptz not null,
                aqi smallint null,
                temperature double precision null,
                humidity double precision null,
                co2 double precision null,
                hcho double precision null,
                pm2_5 double precision null,
                pm1_0 double precision null,
                pm10 double precision null,
                tvoc double precision null,
                co double precision null,
                pm0_3 double precision null
            )
            "#,
            r#"
            CREATE TABLE users (
                email text primary key,
                threshold_warning boolean not null default false
            )
            "#,
        ] {
            sqlx::query(ddl).execute(&pool).await?;
        }
        Ok(pool)
    }

    #[tokio::test]
    async fn round_trips_readings_through_postgres() -> Result<()> {
        if env::var("AIRQ_INTEGRATION_TEST").ok().as_deref() != Some("1") {
            return Ok(());
        }
        let database_url = match env::var("AIRQ_TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return Ok(()),
        };
        let pool = setup_test_pool(&database_url, "airq_store_test").await?;
        sqlx::query("INSERT INTO devices (device_id, name, active) VALUES ('dev-1', 'Room 101', TRUE), ('dev-2', 'Spare', FALSE)")
            .execute(&pool)
            .await?;
        sqlx::query("INSERT INTO users (email, threshold_warning) VALUES ('a@example.com', TRUE), ('b@example.com', FALSE)")
            .execute(&pool)
            .await?;

        let store = PgStore::new(pool, 50_000);
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 9, 30, 0).unwrap();
        let reading = SensorReading {
            aqi: Some(2),
            hcho: Some(0.023),
            co2: Some(640.0),
            ..SensorReading::default()
        };
        store
            .insert_reading("dev-1", now - Duration::minutes(2), &reading)
            .await?;

        assert!(store.device_exists("dev-1").await?);
        assert!(!store.device_exists("ghost").await?);
        let active = store.active_devices().await?;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device_id, "dev-1");
        assert_eq!(store.threshold_recipients().await?, vec!["a@example.com"]);

        let latest = store.latest_reading("dev-1").await?.expect("latest");
        assert_eq!(latest.reading, reading);

        let points = store
            .sensor_history("dev-1", Metric::Hcho, now - Duration::hours(1), now)
            .await?;
        assert_eq!(
            points.iter().filter_map(RawPoint::normalize).collect::<Vec<Sample>>(),
            vec![Sample {
                timestamp: now - Duration::minutes(2),
                value: 0.023
            }]
        );

        let response = build_history_response_at(&store, "dev-1", "aqi", "hour", now)
            .await
            .map_err(|err| anyhow::anyhow!(err.message))?;
        // Both window edges sit on minute boundaries.
        assert_eq!(response.count, 61);
        assert_eq!(
            response.data.iter().filter_map(|p| p.avg).collect::<Vec<f64>>(),
            vec![2.0]
        );
        Ok(())
    }

    #[tokio::test]
    async fn manages_devices_and_alert_opt_in() -> Result<()> {
        if env::var("AIRQ_INTEGRATION_TEST").ok().as_deref() != Some("1") {
            return Ok(());
        }
        let database_url = match env::var("AIRQ_TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => return Ok(()),
        };
        let pool = setup_test_pool(&database_url, "airq_registry_test").await?;
        sqlx::query("INSERT INTO users (email) VALUES ('ops@example.com')")
            .execute(&pool)
            .await?;
        let store = PgStore::new(pool, 50_000);

        let device = NewDevice {
            device_id: "dev-9".to_string(),
            name: "Lab".to_string(),
            room: Some("B-12".to_string()),
            ip_address: None,
        };
        assert_eq!(store.add_device(&device).await?, AddOutcome::Created);
        assert_eq!(store.add_device(&device).await?, AddOutcome::AlreadyActive);

        assert!(store.update_device("dev-9", None, Some("B-14")).await?);
        assert!(!store.update_device("ghost", Some("x"), None).await?);
        let listed = store.list_devices().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Lab");
        assert_eq!(listed[0].room.as_deref(), Some("B-14"));

        assert!(store.deactivate_device("dev-9").await?);
        assert!(store.list_devices().await?.is_empty());
        assert!(store.active_devices().await?.is_empty());
        assert_eq!(store.add_device(&device).await?, AddOutcome::Reactivated);

        assert!(store.set_threshold_warning("ops@example.com", true).await?);
        assert!(!store.set_threshold_warning("nobody@example.com", true).await?);
        assert_eq!(store.threshold_recipients().await?, vec!["ops@example.com"]);
        Ok(())
    }
}
