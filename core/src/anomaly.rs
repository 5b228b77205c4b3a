//! Anomaly lifecycle: deduplicated upsert of flagged correlation pairs with
//! canonical student ordering, and the human-reviewed resolution path.

use std::sync::Arc;

use chrono::NaiveDate;

use db::models::anomaly::{AnomalySeverity, AnomalyStatus, Model as AnomalyModel};
use db::models::attendance::AttendanceStatus;
use db::repositories::{AnomalyRepository, AttendanceRepository, PairUpsert};
use util::AppError;

use crate::clock::Clock;
use crate::correlation::Severity;

/// `ρ ≥ 0.98` auto-promotes a freshly-flagged pair straight to `confirmed_proxy`.
const AUTO_CONFIRM_THRESHOLD: f64 = 0.98;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    ConfirmProxy,
    FalsePositive,
}

pub struct AnomalyService {
    anomalies: Arc<dyn AnomalyRepository>,
    attendance: Arc<dyn AttendanceRepository>,
    clock: Arc<dyn Clock>,
}

impl AnomalyService {
    pub fn new(
        anomalies: Arc<dyn AnomalyRepository>,
        attendance: Arc<dyn AttendanceRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            anomalies,
            attendance,
            clock,
        }
    }

    /// Upserts a flagged pair, canonicalizing student order first. Returns the
    /// stored row, which may be unchanged if the new score did not strengthen it.
    pub async fn upsert_flagged_pair(
        &self,
        class_id: &str,
        session_date: NaiveDate,
        student_a: &str,
        student_b: &str,
        correlation_score: f64,
        severity: Severity,
        reason: &'static str,
    ) -> Result<AnomalyModel, AppError> {
        let (student_id_1, student_id_2) = canonical_pair(student_a, student_b);

        let initial_status = if correlation_score.abs() >= AUTO_CONFIRM_THRESHOLD {
            AnomalyStatus::ConfirmedProxy
        } else {
            AnomalyStatus::Pending
        };

        let row = self
            .anomalies
            .upsert(PairUpsert {
                class_id: class_id.to_owned(),
                session_date,
                student_id_1,
                student_id_2,
                correlation_score,
                severity: to_db_severity(severity),
                notes: Some(reason.to_owned()),
                created_at: self.clock.now(),
                initial_status,
            })
            .await
            .map_err(AppError::from)?;

        Ok(row)
    }

    pub async fn list(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
        status: Option<AnomalyStatus>,
    ) -> Result<Vec<AnomalyModel>, AppError> {
        self.anomalies
            .list(class_id, session_date, status)
            .await
            .map_err(AppError::from)
    }

    /// Applies a human review decision. `confirm_proxy` also cancels both
    /// students' attendance for that class/date, with a dedicated reason.
    pub async fn review(
        &self,
        anomaly_id: i64,
        action: ReviewAction,
        notes: Option<&str>,
    ) -> Result<AnomalyModel, AppError> {
        let now = self.clock.now();
        let status = match action {
            ReviewAction::ConfirmProxy => AnomalyStatus::ConfirmedProxy,
            ReviewAction::FalsePositive => AnomalyStatus::FalsePositive,
        };

        let updated = self
            .anomalies
            .update_status(anomaly_id, status, notes, now)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound("anomaly not found".into()))?;

        if action == ReviewAction::ConfirmProxy {
            const REASON: &str = "Proxy attendance detected";
            for student_id in [&updated.student_id_1, &updated.student_id_2] {
                if let Some(record) = self
                    .attendance
                    .find_by_student_class_day(student_id, &updated.class_id, updated.session_date)
                    .await
                    .map_err(AppError::from)?
                {
                    match record.status {
                        AttendanceStatus::Provisional => {
                            self.attendance
                                .cancel_provisional(record.id, now, REASON)
                                .await
                                .map_err(AppError::from)?;
                        }
                        AttendanceStatus::Confirmed => {
                            self.attendance
                                .cancel_confirmed(record.id, now, REASON)
                                .await
                                .map_err(AppError::from)?;
                        }
                        AttendanceStatus::Cancelled => {}
                    }
                }
            }
        }

        Ok(updated)
    }
}

fn canonical_pair(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

fn to_db_severity(severity: Severity) -> AnomalySeverity {
    match severity {
        Severity::Warning => AnomalySeverity::Warning,
        Severity::Critical => AnomalySeverity::Critical,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};

    use db::repositories::{
        AttendanceRepository, NewAttendance, SeaOrmAnomalyRepository, SeaOrmAttendanceRepository,
    };
    use db::testing::setup_test_db;

    use crate::clock::{Clock, FixedClock};
    use crate::correlation::Severity;

    use super::*;

    fn sample_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    async fn make_service(
        clock: Arc<dyn Clock>,
    ) -> (AnomalyService, Arc<SeaOrmAttendanceRepository>) {
        let db = setup_test_db().await;
        let attendance = Arc::new(SeaOrmAttendanceRepository::new(db.clone()));
        let anomalies = Arc::new(SeaOrmAnomalyRepository::new(db));
        let service = AnomalyService::new(anomalies, attendance.clone(), clock);
        (service, attendance)
    }

    #[test]
    fn canonicalizes_pair_regardless_of_input_order() {
        assert_eq!(canonical_pair("S2", "S1"), ("S1".to_string(), "S2".to_string()));
        assert_eq!(canonical_pair("S1", "S2"), ("S1".to_string(), "S2".to_string()));
    }

    #[tokio::test]
    async fn high_correlation_auto_promotes_to_confirmed_proxy() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(Utc::now()));
        let (service, _attendance) = make_service(clock).await;

        let row = service
            .upsert_flagged_pair("C1", sample_day(), "S2", "S1", 0.995, Severity::Critical, "stationary proxy")
            .await
            .unwrap();

        assert_eq!(row.status, AnomalyStatus::ConfirmedProxy);
        assert_eq!(row.student_id_1, "S1");
        assert_eq!(row.student_id_2, "S2");
    }

    #[tokio::test]
    async fn moderate_correlation_stays_pending() {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(Utc::now()));
        let (service, _attendance) = make_service(clock).await;

        let row = service
            .upsert_flagged_pair("C1", sample_day(), "S1", "S2", 0.9, Severity::Warning, "correlated proximity")
            .await
            .unwrap();

        assert_eq!(row.status, AnomalyStatus::Pending);
    }

    #[tokio::test]
    async fn confirm_proxy_review_reverses_an_already_confirmed_attendance() {
        let now = Utc::now();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(now));
        let (service, attendance) = make_service(clock).await;

        for student_id in ["S1", "S2"] {
            let row = attendance
                .create_provisional(NewAttendance {
                    student_id: student_id.into(),
                    class_id: "C1".into(),
                    session_date: sample_day(),
                    device_id: format!("device-{student_id}"),
                    check_in_time: now,
                    rssi: Some(-55),
                    beacon_major: None,
                    beacon_minor: None,
                })
                .await
                .unwrap();
            attendance.confirm(row.id, now).await.unwrap();
        }

        let flagged = service
            .upsert_flagged_pair("C1", sample_day(), "S1", "S2", 0.9, Severity::Warning, "correlated proximity")
            .await
            .unwrap();

        let reviewed = service
            .review(flagged.id, ReviewAction::ConfirmProxy, Some("manual review"))
            .await
            .unwrap();
        assert_eq!(reviewed.status, AnomalyStatus::ConfirmedProxy);

        for student_id in ["S1", "S2"] {
            let record = attendance
                .find_by_student_class_day(student_id, "C1", sample_day())
                .await
                .unwrap()
                .expect("attendance still exists");
            assert_eq!(record.status, AttendanceStatus::Cancelled);
        }
    }
}
