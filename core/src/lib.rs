pub mod analyzer;
pub mod anomaly;
pub mod attendance;
pub mod clock;
pub mod correlation;
pub mod device_signature;
pub mod ingestion;
pub mod janitor;

pub use clock::{Clock, FixedClock, SystemClock};
