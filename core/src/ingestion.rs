//! RSSI stream ingestion: clock-offset correction and append semantics.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use log::warn;

use db::models::rssi_stream::Sample;
use db::repositories::RssiStreamRepository;
use util::AppError;

use crate::clock::Clock;

const SKEW_LOG_THRESHOLD_MS: i64 = 5_000;

#[derive(Debug, Clone)]
pub struct RawSample {
    pub timestamp: Option<DateTime<Utc>>,
    pub rssi: Option<i32>,
}

pub struct IngestionService {
    streams: Arc<dyn RssiStreamRepository>,
    clock: Arc<dyn Clock>,
}

impl IngestionService {
    pub fn new(streams: Arc<dyn RssiStreamRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { streams, clock }
    }

    pub async fn append_stream(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
        device_timestamp: Option<DateTime<Utc>>,
        raw_samples: Vec<RawSample>,
    ) -> Result<i64, AppError> {
        if raw_samples.is_empty() {
            return Err(AppError::BadRequest("rssiData must contain at least one sample".into()));
        }

        let now = self.clock.now();
        let clock_offset_ms = device_timestamp
            .map(|device_now| (now - device_now).num_milliseconds())
            .unwrap_or(0);

        if clock_offset_ms.abs() > SKEW_LOG_THRESHOLD_MS {
            warn!(
                "device clock skew for {student_id}/{class_id} on {session_date}: {clock_offset_ms}ms"
            );
        }

        let mut samples = Vec::with_capacity(raw_samples.len());
        for raw in raw_samples {
            let rssi = raw
                .rssi
                .ok_or_else(|| AppError::BadRequest("sample is missing rssi".into()))?;
            let timestamp = raw
                .timestamp
                .ok_or_else(|| AppError::BadRequest("sample is missing timestamp".into()))?;

            if clock_offset_ms != 0 {
                samples.push(Sample {
                    timestamp: timestamp + chrono::Duration::milliseconds(clock_offset_ms),
                    rssi,
                    original_timestamp: Some(timestamp),
                    clock_offset_ms: Some(clock_offset_ms),
                });
            } else {
                samples.push(Sample {
                    timestamp,
                    rssi,
                    original_timestamp: None,
                    clock_offset_ms: None,
                });
            }
        }

        let last_offset = if clock_offset_ms != 0 { Some(clock_offset_ms) } else { None };
        self.streams
            .append(student_id, class_id, session_date, samples, now, last_offset)
            .await
            .map_err(AppError::from)
    }
}
