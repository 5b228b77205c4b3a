mod attendance_repository_tests;
mod student_repository_tests;

pub use crate::testing::setup_test_db;
