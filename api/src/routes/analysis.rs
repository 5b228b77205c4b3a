use axum::Json;
use axum::extract::State;
use chrono::NaiveDate;
use serde::Deserialize;
use util::AppError;

use core_logic::analyzer::AnalysisSummary;

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    pub class_id: Option<String>,
    pub session_date: Option<NaiveDate>,
}

pub async fn analyze_correlations(
    State(state): State<AppState>,
    body: Option<Json<AnalyzeBody>>,
) -> Result<Json<AnalysisSummary>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let summary = state
        .analyzer
        .run_once(body.class_id.as_deref(), body.session_date)
        .await?;
    Ok(Json(summary))
}
