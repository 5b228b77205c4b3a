pub mod anomaly;
pub mod attendance;
pub mod idempotency_key;
pub mod rssi_stream;
pub mod student;

pub use anomaly::Entity as Anomaly;
pub use attendance::Entity as Attendance;
pub use idempotency_key::Entity as IdempotencyKey;
pub use rssi_stream::Entity as RssiStream;
pub use student::Entity as Student;
