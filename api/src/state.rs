//! Shared application state for Axum handlers: the assembled service layer
//! (no raw repository access — routes go through `core_logic`'s services).

use std::sync::Arc;

use core_logic::analyzer::AnalyzerJob;
use core_logic::anomaly::AnomalyService;
use core_logic::attendance::AttendanceService;
use core_logic::ingestion::IngestionService;

#[derive(Clone)]
pub struct AppState {
    pub attendance: Arc<AttendanceService>,
    pub ingestion: Arc<IngestionService>,
    pub anomalies: Arc<AnomalyService>,
    pub analyzer: Arc<AnalyzerJob>,
}
