pub mod m20260101_000001_create_students;
pub mod m20260101_000002_create_attendances;
pub mod m20260101_000003_create_rssi_streams;
pub mod m20260101_000004_create_anomalies;
pub mod m20260101_000005_create_idempotency_keys;
