//! `trips` table writer

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{debug, instrument};

use super::{StoredTrip, TripSink};
use crate::error::{PipelineError, PipelineResult};
use crate::mapper::TripCompletion;

const STORE: &str = "postgres";

const UPSERT_TRIP: &str = r#"
INSERT INTO trips (
    trip_id, vehicle_id, route_id, route_short_name, route_long_name,
    driver_id, license_plate, service_date, start_time, end_time,
    scheduled_start_time, scheduled_end_time, completed_at,
    distance_km, duration_minutes, duration_seconds, status,
    passenger_count, fare_amount, stops_served, total_positions, completion_data
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22
)
ON CONFLICT (trip_id) DO UPDATE SET
    vehicle_id = EXCLUDED.vehicle_id,
    route_id = EXCLUDED.route_id,
    route_short_name = EXCLUDED.route_short_name,
    route_long_name = EXCLUDED.route_long_name,
    driver_id = EXCLUDED.driver_id,
    license_plate = EXCLUDED.license_plate,
    service_date = EXCLUDED.service_date,
    start_time = EXCLUDED.start_time,
    end_time = EXCLUDED.end_time,
    scheduled_start_time = EXCLUDED.scheduled_start_time,
    scheduled_end_time = EXCLUDED.scheduled_end_time,
    completed_at = EXCLUDED.completed_at,
    distance_km = EXCLUDED.distance_km,
    duration_minutes = EXCLUDED.duration_minutes,
    duration_seconds = EXCLUDED.duration_seconds,
    status = EXCLUDED.status,
    passenger_count = EXCLUDED.passenger_count,
    fare_amount = EXCLUDED.fare_amount,
    stops_served = EXCLUDED.stops_served,
    total_positions = EXCLUDED.total_positions,
    completion_data = EXCLUDED.completion_data,
    updated_at = NOW()
"#;

#[derive(Clone)]
pub struct PgTripSink {
    pool: PgPool,
}

impl PgTripSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl<'r> FromRow<'r, PgRow> for StoredTrip {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            trip: TripCompletion {
                trip_id: row.try_get("trip_id")?,
                vehicle_id: row.try_get("vehicle_id")?,
                route_id: row.try_get("route_id")?,
                route_short_name: row.try_get("route_short_name")?,
                route_long_name: row.try_get("route_long_name")?,
                driver_id: row.try_get("driver_id")?,
                license_plate: row.try_get("license_plate")?,
                service_date: row.try_get("service_date")?,
                start_time: row.try_get("start_time")?,
                end_time: row.try_get("end_time")?,
                scheduled_start_time: row.try_get("scheduled_start_time")?,
                scheduled_end_time: row.try_get("scheduled_end_time")?,
                completed_at: row.try_get("completed_at")?,
                distance_km: row.try_get("distance_km")?,
                duration_minutes: row.try_get("duration_minutes")?,
                duration_seconds: row.try_get("duration_seconds")?,
                status: row.try_get("status")?,
                passenger_count: row.try_get("passenger_count")?,
                fare_amount: row.try_get("fare_amount")?,
                stops_served: row.try_get("stops_served")?,
                total_positions: row.try_get("total_positions")?,
                payload: row.try_get("completion_data")?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl TripSink for PgTripSink {
    #[instrument(skip(self, completion), fields(trip_id = %completion.trip_id))]
    async fn upsert(&self, completion: &TripCompletion) -> PipelineResult<()> {
        let map_err = |e| PipelineError::from_sqlx(STORE, e);

        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query(UPSERT_TRIP)
            .bind(&completion.trip_id)
            .bind(&completion.vehicle_id)
            .bind(&completion.route_id)
            .bind(&completion.route_short_name)
            .bind(&completion.route_long_name)
            .bind(&completion.driver_id)
            .bind(&completion.license_plate)
            .bind(completion.service_date)
            .bind(completion.start_time)
            .bind(completion.end_time)
            .bind(&completion.scheduled_start_time)
            .bind(&completion.scheduled_end_time)
            .bind(completion.completed_at)
            .bind(completion.distance_km)
            .bind(completion.duration_minutes)
            .bind(completion.duration_seconds)
            .bind(&completion.status)
            .bind(completion.passenger_count)
            .bind(completion.fare_amount)
            .bind(completion.stops_served)
            .bind(completion.total_positions)
            .bind(sqlx::types::Json(&completion.payload))
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)?;

        debug!("Trip row upserted");
        Ok(())
    }

    async fn fetch(&self, trip_id: &str) -> PipelineResult<Option<StoredTrip>> {
        sqlx::query_as::<_, StoredTrip>("SELECT * FROM trips WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::from_sqlx(STORE, e))
    }
}
