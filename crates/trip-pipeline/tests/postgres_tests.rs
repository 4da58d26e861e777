//! PostgreSQL-backed ledger and trip sink tests
//!
//! These tests require Docker to be running. Run with:
//!
//! ```bash
//! cargo test -p trip-pipeline --test postgres_tests -- --ignored --nocapture
//! ```

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;

use trip_common::{ProcessingStatus, TripIdentity};
use trip_pipeline::ledger::{PgLedger, ProcessingLedger};
use trip_pipeline::mapper::TripCompletion;
use trip_pipeline::sink::{PgTripSink, TripSink};

/// PostgreSQL container with migrations applied. Dropping it stops the
/// container.
struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(5432.tcp()).await?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }
}

fn completion(trip_id: &str, distance_km: f64) -> TripCompletion {
    TripCompletion {
        trip_id: trip_id.to_string(),
        vehicle_id: Some("BUS-042".to_string()),
        route_id: Some("R12".to_string()),
        route_short_name: None,
        route_long_name: None,
        driver_id: None,
        license_plate: Some("KXPT-21".to_string()),
        service_date: chrono::NaiveDate::from_ymd_opt(2025, 9, 1),
        start_time: Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).single(),
        end_time: Utc.with_ymd_and_hms(2025, 9, 1, 8, 35, 0).single(),
        scheduled_start_time: Some("08:00:00".to_string()),
        scheduled_end_time: Some("24:35:00".to_string()),
        completed_at: None,
        distance_km: Some(distance_km),
        duration_minutes: Some(35.0),
        duration_seconds: Some(2100),
        status: "completed".to_string(),
        passenger_count: 18,
        fare_amount: None,
        stops_served: 22,
        total_positions: 3,
        payload: json!({"weather": "rain"}),
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_upsert_twice_keeps_one_row_with_latest_values() {
    let pg = TestPostgres::start().await.expect("postgres");
    let sink = PgTripSink::new(pg.pool.clone());

    sink.upsert(&completion("21520", 12.4)).await.unwrap();
    let first = sink.fetch("21520").await.unwrap().unwrap();

    sink.upsert(&completion("21520", 13.1)).await.unwrap();
    let second = sink.fetch("21520").await.unwrap().unwrap();

    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trips WHERE trip_id = $1")
        .bind("21520")
        .fetch_one(&pg.pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
    assert_eq!(second.trip.distance_km, Some(13.1));
    assert_eq!(second.trip.payload, json!({"weather": "rain"}));
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_check_constraint_is_not_retryable() {
    let pg = TestPostgres::start().await.expect("postgres");
    let sink = PgTripSink::new(pg.pool.clone());

    let err = sink.upsert(&completion("1", -5.0)).await.unwrap_err();

    assert_eq!(err.kind(), "constraint_violation");
    assert!(!err.is_retryable());
    assert!(sink.fetch("1").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ledger_is_append_only_and_latest_wins() {
    let pg = TestPostgres::start().await.expect("postgres");
    let ledger = PgLedger::new(pg.pool.clone());
    let id = TripIdentity::new("21520", "20250901").unwrap();

    assert!(ledger.latest_status(&id).await.unwrap().is_none());

    ledger.claim(&id).await.unwrap();
    ledger.fail(&id, "track stream not found").await.unwrap();
    ledger.claim(&id).await.unwrap();
    ledger.complete(&id, "/out/trip_21520.parquet").await.unwrap();

    let latest = ledger.latest_status(&id).await.unwrap().unwrap();
    assert_eq!(latest.status, ProcessingStatus::Completed);
    assert_eq!(latest.artifact_path.as_deref(), Some("/out/trip_21520.parquet"));

    let history = ledger.history(&id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].status, ProcessingStatus::Failed);
    assert_eq!(
        history[1].error_message.as_deref(),
        Some("track stream not found")
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_claims_do_not_conflict() {
    let pg = TestPostgres::start().await.expect("postgres");
    let ledger = PgLedger::new(pg.pool.clone());
    let id = TripIdentity::new("7", "20250901").unwrap();

    let (a, b) = tokio::join!(ledger.claim(&id), ledger.claim(&id));
    a.unwrap();
    b.unwrap();

    assert_eq!(ledger.history(&id).await.unwrap().len(), 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_status_check_constraint() {
    let pg = TestPostgres::start().await.expect("postgres");

    let result = sqlx::query(
        "INSERT INTO trip_processing_log (trip_id, start_date, processing_status) \
         VALUES ('1', '20250901', 'done')",
    )
    .execute(&pg.pool)
    .await;

    assert!(result.is_err());
}
