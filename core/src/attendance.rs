//! The two-phase attendance state machine: check-in, confirm, cancel, and
//! the read-side "today" view. Device binding and idempotency live here,
//! not in the repository layer, because they are business rules rather
//! than storage rules.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use db::error::RepoError;
use db::models::attendance::{AttendanceStatus, Model as AttendanceModel};
use db::repositories::{AttendanceRepository, IdempotencyRepository, NewAttendance, StudentRepository};
use util::{AppConfig, AppError};

use crate::clock::Clock;
use crate::device_signature;

const CHECKIN_SCOPE: &str = "checkin";

pub struct AttendanceService {
    attendance: Arc<dyn AttendanceRepository>,
    students: Arc<dyn StudentRepository>,
    idempotency: Arc<dyn IdempotencyRepository>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceView {
    pub id: i64,
    pub student_id: String,
    pub class_id: String,
    pub session_date: NaiveDate,
    pub device_id: String,
    pub status: String,
    pub check_in_time: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub rssi: Option<i32>,
    pub beacon_major: Option<i32>,
    pub beacon_minor: Option<i32>,
}

impl From<AttendanceModel> for AttendanceView {
    fn from(m: AttendanceModel) -> Self {
        AttendanceView {
            id: m.id,
            student_id: m.student_id,
            class_id: m.class_id,
            session_date: m.session_date,
            device_id: m.device_id,
            status: status_label(m.status).to_string(),
            check_in_time: m.check_in_time,
            confirmed_at: m.confirmed_at,
            cancelled_at: m.cancelled_at,
            cancellation_reason: m.cancellation_reason,
            rssi: m.rssi,
            beacon_major: m.beacon_major,
            beacon_minor: m.beacon_minor,
        }
    }
}

fn status_label(status: AttendanceStatus) -> &'static str {
    match status {
        AttendanceStatus::Provisional => "provisional",
        AttendanceStatus::Confirmed => "confirmed",
        AttendanceStatus::Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub success: bool,
    pub status: String,
    pub remaining_seconds: i64,
    pub attendance: AttendanceView,
}

#[derive(Debug, Clone)]
pub struct CheckInRequest {
    pub student_id: String,
    pub class_id: String,
    pub device_id: String,
    pub device_signature: String,
    pub device_salt_version: Option<u16>,
    pub event_id: String,
    pub rssi: Option<i32>,
    pub beacon_major: Option<i32>,
    pub beacon_minor: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayEntry {
    #[serde(flatten)]
    pub attendance: AttendanceView,
    pub remaining_seconds: Option<i64>,
    pub cooldown: Option<Cooldown>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cooldown {
    pub cooldown_ends_at: DateTime<Utc>,
    pub seconds_remaining: i64,
}

/// Hashes the event-significant fields of a check-in so a replayed `event_id`
/// can be told apart from a re-used id carrying a different request.
fn request_hash(req: &CheckInRequest) -> String {
    #[derive(Serialize)]
    struct Hashed<'a> {
        student_id: &'a str,
        class_id: &'a str,
        device_id: &'a str,
        rssi: Option<i32>,
        beacon_major: Option<i32>,
        beacon_minor: Option<i32>,
    }
    let hashed = Hashed {
        student_id: &req.student_id,
        class_id: &req.class_id,
        device_id: &req.device_id,
        rssi: req.rssi,
        beacon_major: req.beacon_major,
        beacon_minor: req.beacon_minor,
    };
    let bytes = serde_json::to_vec(&hashed).expect("plain struct always serializes");
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

impl AttendanceService {
    pub fn new(
        attendance: Arc<dyn AttendanceRepository>,
        students: Arc<dyn StudentRepository>,
        idempotency: Arc<dyn IdempotencyRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            attendance,
            students,
            idempotency,
            clock,
        }
    }

    pub async fn check_in(&self, req: CheckInRequest) -> Result<CheckInResponse, AppError> {
        if req.student_id.is_empty() || req.class_id.is_empty() || req.device_id.is_empty() {
            return Err(AppError::BadRequest("studentId, classId and deviceId are required".into()));
        }

        let hash = request_hash(&req);
        if let Some(existing) = self
            .idempotency
            .find(&req.event_id, CHECKIN_SCOPE)
            .await
            .map_err(repo_err)?
        {
            if existing.request_hash != hash {
                return Err(AppError::IdempotencyConflict(
                    "eventId was already used for a different request".into(),
                ));
            }
            let cached: CheckInResponse = serde_json::from_value(existing.stored_response)
                .map_err(|e| AppError::Internal(format!("corrupt idempotency record: {e}")))?;
            return Ok(cached);
        }

        let config = AppConfig::get();
        let salt_version = req.device_salt_version.unwrap_or(config.current_device_salt_version);
        device_signature::verify(&req.device_id, &req.device_signature, salt_version, &config.device_salts)?;

        let now = self.clock.now();

        if let Some(holder) = self.students.find_by_device_id(&req.device_id).await.map_err(repo_err)? {
            if holder.student_id != req.student_id {
                return Err(AppError::DeviceMismatch {
                    message: "device is bound to a different student".into(),
                    locked_to_student: holder.student_id,
                    bound_at: holder.device_registered_at,
                });
            }
        }

        let student = match self.students.find_by_student_id(&req.student_id).await.map_err(repo_err)? {
            Some(s) => s,
            None => self
                .students
                .create(&req.student_id, &req.student_id)
                .await
                .map_err(repo_err)?,
        };

        match &student.device_id {
            None => {
                let bound = self
                    .students
                    .bind_device_if_unset(student.id, &req.device_id, now)
                    .await
                    .map_err(repo_err)?;
                if let Some(bound) = bound {
                    if bound.device_id.as_deref() != Some(req.device_id.as_str()) {
                        return Err(AppError::DeviceMismatch {
                            message: "device is bound to a different student".into(),
                            locked_to_student: bound.student_id,
                            bound_at: bound.device_registered_at,
                        });
                    }
                } else {
                    // Lost a concurrent bind race; re-read to learn who won.
                    let reloaded = self
                        .students
                        .find_by_student_id(&req.student_id)
                        .await
                        .map_err(repo_err)?
                        .ok_or_else(|| AppError::Internal("student vanished mid check-in".into()))?;
                    if reloaded.device_id.as_deref() != Some(req.device_id.as_str()) {
                        return Err(AppError::DeviceMismatch {
                            message: "device is bound to a different student".into(),
                            locked_to_student: reloaded.student_id,
                            bound_at: reloaded.device_registered_at,
                        });
                    }
                }
            }
            Some(bound_device) if bound_device != &req.device_id => {
                return Err(AppError::DeviceMismatch {
                    message: "student is bound to a different device".into(),
                    locked_to_student: student.student_id.clone(),
                    bound_at: student.device_registered_at,
                });
            }
            Some(_) => {}
        }

        let session_date = self.clock.today();
        let existing = self
            .attendance
            .find_by_student_class_day(&req.student_id, &req.class_id, session_date)
            .await
            .map_err(repo_err)?;

        let (status, remaining_seconds, record) = match existing {
            None => {
                let record = self
                    .attendance
                    .create_provisional(NewAttendance {
                        student_id: req.student_id.clone(),
                        class_id: req.class_id.clone(),
                        session_date,
                        device_id: req.device_id.clone(),
                        check_in_time: now,
                        rssi: req.rssi,
                        beacon_major: req.beacon_major,
                        beacon_minor: req.beacon_minor,
                    })
                    .await
                    .map_err(repo_err)?;
                let remaining = config.confirmation_window.as_secs() as i64;
                ("provisional", remaining, record)
            }
            Some(record) if record.status == AttendanceStatus::Provisional => {
                let updated = self
                    .attendance
                    .update_snapshot(record.id, req.rssi, req.beacon_major, req.beacon_minor)
                    .await
                    .map_err(repo_err)?
                    .unwrap_or(record);
                let elapsed = (now - updated.check_in_time).num_seconds();
                let remaining = (config.confirmation_window.as_secs() as i64 - elapsed).max(0);
                ("provisional", remaining, updated)
            }
            Some(record) => {
                let label = status_label(record.status);
                (label, 0, record)
            }
        };

        let response = CheckInResponse {
            success: true,
            status: status.to_string(),
            remaining_seconds,
            attendance: record.into(),
        };

        let stored = serde_json::to_value(&response)
            .map_err(|e| AppError::Internal(format!("failed to serialize response: {e}")))?;
        self.idempotency
            .store(&req.event_id, CHECKIN_SCOPE, &hash, stored, 200, now)
            .await
            .map_err(repo_err)?;

        Ok(response)
    }

    pub async fn confirm(
        &self,
        student_id: &str,
        class_id: &str,
        device_id: &str,
        attendance_id: Option<i64>,
    ) -> Result<AttendanceView, AppError> {
        let today = self.clock.today();
        let record = match attendance_id {
            Some(id) => self.attendance.find_by_id(id).await.map_err(repo_err)?,
            None => self
                .attendance
                .find_by_student_class_day(student_id, class_id, today)
                .await
                .map_err(repo_err)?,
        };
        let record = record.ok_or_else(|| AppError::NotFound("attendance record not found".into()))?;

        if record.device_id != device_id {
            return Err(AppError::DeviceMismatch {
                message: "device does not match the one bound at check-in".into(),
                locked_to_student: record.student_id,
                bound_at: None,
            });
        }

        match record.status {
            AttendanceStatus::Cancelled => {
                Err(AppError::NotFound("attendance record not found".into()))
            }
            AttendanceStatus::Confirmed => Ok(record.into()),
            AttendanceStatus::Provisional => {
                let now = self.clock.now();
                let confirmed = self
                    .attendance
                    .confirm(record.id, now)
                    .await
                    .map_err(repo_err)?
                    .ok_or_else(|| AppError::NotFound("attendance record not found".into()))?;
                Ok(confirmed.into())
            }
        }
    }

    pub async fn cancel_provisional(
        &self,
        student_id: &str,
        class_id: &str,
        reason: Option<&str>,
    ) -> Result<AttendanceView, AppError> {
        let today = self.clock.today();
        let record = self
            .attendance
            .find_by_student_class_day(student_id, class_id, today)
            .await
            .map_err(repo_err)?
            .ok_or_else(|| AppError::NotFound("attendance record not found".into()))?;

        match record.status {
            AttendanceStatus::Cancelled => Ok(record.into()),
            AttendanceStatus::Confirmed => {
                Err(AppError::InvalidState("attendance is already confirmed".into()))
            }
            AttendanceStatus::Provisional => {
                let now = self.clock.now();
                let reason = reason.unwrap_or("left_before_confirmation");
                let cancelled = self
                    .attendance
                    .cancel_provisional(record.id, now, reason)
                    .await
                    .map_err(repo_err)?
                    .ok_or_else(|| AppError::NotFound("attendance record not found".into()))?;
                Ok(cancelled.into())
            }
        }
    }

    /// Clears a student's device binding. Only an admin caller should reach
    /// this; the HTTP surface for that is out of scope here.
    pub async fn reset_device(&self, student_id: &str) -> Result<(), AppError> {
        self.students
            .reset_device(student_id)
            .await
            .map_err(repo_err)?
            .ok_or_else(|| AppError::NotFound("student not found".into()))?;
        Ok(())
    }

    pub async fn query_today(&self, student_id: &str) -> Result<Vec<TodayEntry>, AppError> {
        let today = self.clock.today();
        let now = self.clock.now();
        let config = AppConfig::get();

        let records = self.attendance.list_today(student_id, today).await.map_err(repo_err)?;
        Ok(records
            .into_iter()
            .map(|m| {
                let remaining_seconds = if m.status == AttendanceStatus::Provisional {
                    let elapsed = (now - m.check_in_time).num_seconds();
                    Some((config.confirmation_window.as_secs() as i64 - elapsed).max(0))
                } else {
                    None
                };
                let cooldown = if m.status == AttendanceStatus::Confirmed {
                    m.confirmed_at.map(|confirmed_at| {
                        let ends_at = confirmed_at
                            + chrono::Duration::from_std(config.cooldown_window)
                                .unwrap_or(chrono::Duration::zero());
                        let seconds_remaining = (ends_at - now).num_seconds().max(0);
                        Cooldown {
                            cooldown_ends_at: ends_at,
                            seconds_remaining,
                        }
                    })
                } else {
                    None
                };
                TodayEntry {
                    attendance: m.into(),
                    remaining_seconds,
                    cooldown,
                }
            })
            .collect())
    }
}

fn repo_err(e: RepoError) -> AppError {
    AppError::from(e)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use db::repositories::{SeaOrmAttendanceRepository, SeaOrmIdempotencyRepository, SeaOrmStudentRepository};
    use db::testing::setup_test_db;

    use crate::clock::FixedClock;
    use crate::device_signature;

    use super::*;

    fn init_test_config() {
        unsafe {
            std::env::set_var("DEVICE_SALTS", "1:test-salt-v1");
            std::env::set_var("CURRENT_DEVICE_SALT_VERSION", "1");
            std::env::set_var("HOST", "127.0.0.1");
            std::env::set_var("PORT", "0");
            std::env::set_var("DATABASE_URL", "sqlite::memory:");
            std::env::set_var("CONFIRMATION_WINDOW_SECONDS", "180");
            std::env::set_var("CLASS_DURATION_SECONDS", "3600");
            std::env::set_var("COOLDOWN_WINDOW_SECONDS", "900");
            std::env::set_var("ANALYZER_INTERVAL_SECONDS", "30");
            std::env::set_var("JANITOR_INTERVAL_SECONDS", "30");
            std::env::set_var("IDEMPOTENCY_RETENTION_SECONDS", "86400");
        }
        AppConfig::init();
    }

    async fn make_service(now: DateTime<Utc>) -> AttendanceService {
        init_test_config();
        let db = setup_test_db().await;
        AttendanceService::new(
            Arc::new(SeaOrmAttendanceRepository::new(db.clone())),
            Arc::new(SeaOrmStudentRepository::new(db.clone())),
            Arc::new(SeaOrmIdempotencyRepository::new(db)),
            Arc::new(FixedClock(now)),
        )
    }

    fn signed(device_id: &str) -> String {
        device_signature::sign(device_id, "test-salt-v1")
    }

    fn checkin(event_id: &str) -> CheckInRequest {
        CheckInRequest {
            student_id: "S1".into(),
            class_id: "C1".into(),
            device_id: "D1".into(),
            device_signature: signed("D1"),
            device_salt_version: None,
            event_id: event_id.into(),
            rssi: Some(-55),
            beacon_major: None,
            beacon_minor: None,
        }
    }

    #[tokio::test]
    async fn happy_path_check_in_then_confirm() {
        let t0 = Utc::now();
        let service = make_service(t0).await;

        let resp = service.check_in(checkin("e1")).await.unwrap();
        assert_eq!(resp.status, "provisional");
        assert_eq!(resp.remaining_seconds, 180);

        let confirmed = service.confirm("S1", "C1", "D1", None).await.unwrap();
        assert_eq!(confirmed.status, "confirmed");
    }

    #[tokio::test]
    async fn replayed_event_id_returns_cached_response() {
        let service = make_service(Utc::now()).await;

        let first = service.check_in(checkin("e1")).await.unwrap();
        let second = service.check_in(checkin("e1")).await.unwrap();
        assert_eq!(first.attendance.id, second.attendance.id);
    }

    #[tokio::test]
    async fn reused_event_id_with_different_payload_conflicts() {
        let service = make_service(Utc::now()).await;

        service.check_in(checkin("e1")).await.unwrap();

        let mut different = checkin("e1");
        different.rssi = Some(-70);
        let err = service.check_in(different).await.unwrap_err();
        assert!(matches!(err, AppError::IdempotencyConflict(_)));
    }

    #[tokio::test]
    async fn device_bound_to_another_student_is_rejected() {
        let service = make_service(Utc::now()).await;

        service.check_in(checkin("e1")).await.unwrap();

        let mut other_student = checkin("e2");
        other_student.student_id = "S2".into();
        let err = service.check_in(other_student).await.unwrap_err();
        match err {
            AppError::DeviceMismatch { locked_to_student, .. } => assert_eq!(locked_to_student, "S1"),
            other => panic!("expected DeviceMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancel_provisional_then_reconfirm_fails() {
        let service = make_service(Utc::now()).await;

        service.check_in(checkin("e1")).await.unwrap();
        let cancelled = service.cancel_provisional("S1", "C1", Some("left_before_confirmation")).await.unwrap();
        assert_eq!(cancelled.status, "cancelled");

        let err = service.confirm("S1", "C1", "D1", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reset_device_clears_the_students_binding() {
        init_test_config();
        let db = setup_test_db().await;
        let students = Arc::new(SeaOrmStudentRepository::new(db.clone()));
        let service = AttendanceService::new(
            Arc::new(SeaOrmAttendanceRepository::new(db.clone())),
            students.clone(),
            Arc::new(SeaOrmIdempotencyRepository::new(db)),
            Arc::new(FixedClock(Utc::now())),
        );

        service.check_in(checkin("e1")).await.unwrap();
        assert!(students.find_by_device_id("D1").await.unwrap().is_some());

        service.reset_device("S1").await.unwrap();
        assert!(students.find_by_device_id("D1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_today_reports_cooldown_after_confirmation() {
        let t0 = Utc::now();
        let service = make_service(t0).await;

        service.check_in(checkin("e1")).await.unwrap();
        service.confirm("S1", "C1", "D1", None).await.unwrap();

        let entries = service.query_today("S1").await.unwrap();
        assert_eq!(entries.len(), 1);
        let cooldown = entries[0].cooldown.as_ref().expect("confirmed entry has a cooldown block");
        assert_eq!(cooldown.seconds_remaining, ChronoDuration::minutes(15).num_seconds());
    }
}
