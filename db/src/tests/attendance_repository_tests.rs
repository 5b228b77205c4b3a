use chrono::{Duration, NaiveDate, Utc};

use super::setup_test_db;
use crate::models::attendance::AttendanceStatus;
use crate::repositories::{AttendanceRepository, NewAttendance, SeaOrmAttendanceRepository};

fn sample_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
}

fn sample_new(student_id: &str, class_id: &str) -> NewAttendance {
    NewAttendance {
        student_id: student_id.to_owned(),
        class_id: class_id.to_owned(),
        session_date: sample_day(),
        device_id: "device-1".to_owned(),
        check_in_time: Utc::now(),
        rssi: Some(-55),
        beacon_major: Some(1),
        beacon_minor: Some(2),
    }
}

#[tokio::test]
async fn create_provisional_then_confirm() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let row = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    assert_eq!(row.status, AttendanceStatus::Provisional);

    let confirmed = repo
        .confirm(row.id, Utc::now())
        .await
        .unwrap()
        .expect("confirm should succeed from provisional");
    assert_eq!(confirmed.status, AttendanceStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());
}

#[tokio::test]
async fn confirm_is_a_no_op_once_already_confirmed() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let row = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    repo.confirm(row.id, Utc::now()).await.unwrap();

    // Row is no longer provisional, so a second confirm must not match.
    let second = repo.confirm(row.id, Utc::now()).await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn cancel_provisional_sets_reason() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let row = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    let cancelled = repo
        .cancel_provisional(row.id, Utc::now(), "expired")
        .await
        .unwrap()
        .expect("cancel should succeed from provisional");

    assert_eq!(cancelled.status, AttendanceStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("expired"));
}

#[tokio::test]
async fn cancel_confirmed_reverses_a_confirmed_record() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let row = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    repo.confirm(row.id, Utc::now()).await.unwrap();

    let reversed = repo
        .cancel_confirmed(row.id, Utc::now(), "confirmed proxy pair")
        .await
        .unwrap()
        .expect("a confirmed record can be reversed to cancelled");
    assert_eq!(reversed.status, AttendanceStatus::Cancelled);
}

#[tokio::test]
async fn create_provisional_is_idempotent_per_student_class_day() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let first = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    let second = repo.create_provisional(sample_new("s1", "c1")).await.unwrap();

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn list_today_scopes_to_student_and_date() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    repo.create_provisional(sample_new("s1", "c1")).await.unwrap();
    repo.create_provisional(sample_new("s1", "c2")).await.unwrap();
    repo.create_provisional(sample_new("s2", "c1")).await.unwrap();

    let today = repo.list_today("s1", sample_day()).await.unwrap();
    assert_eq!(today.len(), 2);
}

#[tokio::test]
async fn list_provisional_expired_respects_cutoff() {
    let db = setup_test_db().await;
    let repo = SeaOrmAttendanceRepository::new(db);

    let mut new = sample_new("s1", "c1");
    new.check_in_time = Utc::now() - Duration::minutes(30);
    repo.create_provisional(new).await.unwrap();

    let cutoff = Utc::now() - Duration::minutes(10);
    let expired = repo.list_provisional_expired(cutoff).await.unwrap();
    assert_eq!(expired.len(), 1);

    let not_yet_cutoff = Utc::now() - Duration::hours(1);
    let none_expired = repo.list_provisional_expired(not_yet_cutoff).await.unwrap();
    assert!(none_expired.is_empty());
}
