pub mod anomaly_repository;
pub mod attendance_repository;
pub mod idempotency_repository;
pub mod rssi_stream_repository;
pub mod student_repository;

pub use anomaly_repository::{AnomalyRepository, PairUpsert, SeaOrmAnomalyRepository};
pub use attendance_repository::{AttendanceRepository, NewAttendance, SeaOrmAttendanceRepository};
pub use idempotency_repository::{IdempotencyRepository, SeaOrmIdempotencyRepository};
pub use rssi_stream_repository::{RssiStreamRepository, SeaOrmRssiStreamRepository};
pub use student_repository::{SeaOrmStudentRepository, StudentRepository};
