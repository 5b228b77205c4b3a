use chrono::Utc;

use super::setup_test_db;
use crate::repositories::{SeaOrmStudentRepository, StudentRepository};

#[tokio::test]
async fn create_and_find_round_trip() {
    let db = setup_test_db().await;
    let repo = SeaOrmStudentRepository::new(db);

    let created = repo.create("u12345678", "Jane Doe").await.unwrap();
    assert!(created.device_id.is_none());

    let found = repo
        .find_by_student_id("u12345678")
        .await
        .unwrap()
        .expect("student should exist");
    assert_eq!(found.id, created.id);
    assert_eq!(found.name, "Jane Doe");
}

#[tokio::test]
async fn bind_device_if_unset_succeeds_once() {
    let db = setup_test_db().await;
    let repo = SeaOrmStudentRepository::new(db);

    let student = repo.create("u1", "A").await.unwrap();
    let now = Utc::now();

    let bound = repo
        .bind_device_if_unset(student.id, "device-a", now)
        .await
        .unwrap()
        .expect("first bind should succeed");
    assert_eq!(bound.device_id.as_deref(), Some("device-a"));

    // A second bind attempt must lose the race: device_id is no longer null.
    let second = repo
        .bind_device_if_unset(student.id, "device-b", now)
        .await
        .unwrap();
    assert!(second.is_none());

    let reloaded = repo.find_by_student_id("u1").await.unwrap().unwrap();
    assert_eq!(reloaded.device_id.as_deref(), Some("device-a"));
}

#[tokio::test]
async fn reset_device_clears_binding() {
    let db = setup_test_db().await;
    let repo = SeaOrmStudentRepository::new(db);

    let student = repo.create("u2", "B").await.unwrap();
    repo.bind_device_if_unset(student.id, "device-a", Utc::now())
        .await
        .unwrap();

    let reset = repo.reset_device("u2").await.unwrap().unwrap();
    assert!(reset.device_id.is_none());
    assert!(reset.device_registered_at.is_none());

    // Binding is available again after reset.
    let rebound = repo
        .bind_device_if_unset(student.id, "device-c", Utc::now())
        .await
        .unwrap();
    assert!(rebound.is_some());
}

#[tokio::test]
async fn find_by_device_id_finds_bound_student() {
    let db = setup_test_db().await;
    let repo = SeaOrmStudentRepository::new(db);

    let student = repo.create("u3", "C").await.unwrap();
    repo.bind_device_if_unset(student.id, "device-z", Utc::now())
        .await
        .unwrap();

    let found = repo
        .find_by_device_id("device-z")
        .await
        .unwrap()
        .expect("should find by device id");
    assert_eq!(found.student_id, "u3");
}
