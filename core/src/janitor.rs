//! Periodic expiry of stale provisional attendance and pruning of old
//! cancelled records. Runs independently of the analyzer; the conditional
//! `provisional -> cancelled` write is what keeps the two from racing —
//! whichever of them gets there first wins, the loser's write is a no-op.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::time::interval;

use db::repositories::{AttendanceRepository, IdempotencyRepository};
use util::AppError;

use crate::clock::Clock;

const EXPIRY_REASON: &str = "Auto-cancelled: confirmation window expired";

pub struct JanitorJob {
    attendance: Arc<dyn AttendanceRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
    clock: Arc<dyn Clock>,
    confirmation_window: Duration,
    class_duration: Duration,
    idempotency_retention: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JanitorSummary {
    pub expired: usize,
    pub pruned: usize,
    pub idempotency_keys_pruned: u64,
}

impl JanitorJob {
    pub fn new(
        attendance: Arc<dyn AttendanceRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
        clock: Arc<dyn Clock>,
        confirmation_window: Duration,
        class_duration: Duration,
        idempotency_retention: Duration,
    ) -> Self {
        Self {
            attendance,
            idempotency,
            clock,
            confirmation_window,
            class_duration,
            idempotency_retention,
        }
    }

    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("janitor tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("janitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    pub async fn run_once(&self) -> Result<JanitorSummary, AppError> {
        let now = self.clock.now();
        let mut summary = JanitorSummary::default();

        let expiry_cutoff = now
            - chrono::Duration::from_std(self.confirmation_window).unwrap_or(chrono::Duration::zero());
        for record in self
            .attendance
            .list_provisional_expired(expiry_cutoff)
            .await
            .map_err(AppError::from)?
        {
            let result = db::retry::with_retry(|| {
                self.attendance.cancel_provisional(record.id, now, EXPIRY_REASON)
            })
            .await
            .map_err(AppError::from)?;
            // `None` means the analyzer already moved this record on; the
            // conditional write is what makes that race harmless.
            if result.is_some() {
                summary.expired += 1;
            }
        }

        let prune_cutoff =
            now - chrono::Duration::from_std(self.class_duration).unwrap_or(chrono::Duration::zero());
        for record in self
            .attendance
            .list_cancelled_expired(prune_cutoff)
            .await
            .map_err(AppError::from)?
        {
            db::retry::with_retry(|| self.attendance.delete(record.id))
                .await
                .map_err(AppError::from)?;
            summary.pruned += 1;
        }

        let idempotency_cutoff = now
            - chrono::Duration::from_std(self.idempotency_retention).unwrap_or(chrono::Duration::zero());
        summary.idempotency_keys_pruned = db::retry::with_retry(|| self.idempotency.prune_older_than(idempotency_cutoff))
            .await
            .map_err(AppError::from)?;

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{Duration as ChronoDuration, NaiveDate, Utc};

    use db::models::attendance::AttendanceStatus;
    use db::repositories::{
        AttendanceRepository, IdempotencyRepository, NewAttendance, SeaOrmAttendanceRepository,
        SeaOrmIdempotencyRepository,
    };
    use db::testing::setup_test_db;

    use crate::clock::FixedClock;

    use super::*;

    fn sample_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn expires_a_provisional_record_past_the_confirmation_window() {
        let now = Utc::now();
        let db = setup_test_db().await;
        let attendance = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
        let idempotency = Arc::new(SeaOrmIdempotencyRepository::new(db));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));

        let row = attendance
            .create_provisional(NewAttendance {
                student_id: "S1".into(),
                class_id: "C1".into(),
                session_date: sample_day(),
                device_id: "D1".into(),
                check_in_time: now - ChronoDuration::minutes(3) - ChronoDuration::seconds(5),
                rssi: Some(-55),
                beacon_major: None,
                beacon_minor: None,
            })
            .await
            .unwrap();

        let janitor = JanitorJob::new(
            attendance.clone(),
            idempotency,
            clock,
            StdDuration::from_secs(180),
            StdDuration::from_secs(3600),
            StdDuration::from_secs(86400),
        );

        let summary = janitor.run_once().await.unwrap();
        assert_eq!(summary.expired, 1);

        let reloaded = attendance.find_by_id(row.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AttendanceStatus::Cancelled);
        assert_eq!(
            reloaded.cancellation_reason.as_deref(),
            Some("Auto-cancelled: confirmation window expired")
        );
    }

    #[tokio::test]
    async fn leaves_a_fresh_provisional_record_alone() {
        let now = Utc::now();
        let db = setup_test_db().await;
        let attendance = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
        let idempotency = Arc::new(SeaOrmIdempotencyRepository::new(db));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));

        attendance
            .create_provisional(NewAttendance {
                student_id: "S1".into(),
                class_id: "C1".into(),
                session_date: sample_day(),
                device_id: "D1".into(),
                check_in_time: now,
                rssi: Some(-55),
                beacon_major: None,
                beacon_minor: None,
            })
            .await
            .unwrap();

        let janitor = JanitorJob::new(
            attendance,
            idempotency,
            clock,
            StdDuration::from_secs(180),
            StdDuration::from_secs(3600),
            StdDuration::from_secs(86400),
        );

        let summary = janitor.run_once().await.unwrap();
        assert_eq!(summary.expired, 0);
    }

    #[tokio::test]
    async fn prunes_idempotency_keys_past_the_retention_window() {
        let now = Utc::now();
        let db = setup_test_db().await;
        let attendance = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
        let idempotency = Arc::new(SeaOrmIdempotencyRepository::new(db));
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));

        idempotency
            .store(
                "stale-event",
                "checkin",
                "hash",
                serde_json::json!({}),
                200,
                now - ChronoDuration::hours(25),
            )
            .await
            .unwrap();
        idempotency
            .store("fresh-event", "checkin", "hash", serde_json::json!({}), 200, now)
            .await
            .unwrap();

        let janitor = JanitorJob::new(
            attendance,
            idempotency.clone(),
            clock,
            StdDuration::from_secs(180),
            StdDuration::from_secs(3600),
            StdDuration::from_secs(86400),
        );

        let summary = janitor.run_once().await.unwrap();
        assert_eq!(summary.idempotency_keys_pruned, 1);
        assert!(idempotency.find("fresh-event", "checkin").await.unwrap().is_some());
        assert!(idempotency.find("stale-event", "checkin").await.unwrap().is_none());
    }
}
