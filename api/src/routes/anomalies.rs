use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use util::AppError;

use core_logic::anomaly::ReviewAction;
use db::models::anomaly::{AnomalySeverity, AnomalyStatus, Model as AnomalyModel};

use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyView {
    pub id: i64,
    pub class_id: String,
    pub session_date: NaiveDate,
    pub student_id_1: String,
    pub student_id_2: String,
    pub correlation_score: f64,
    pub severity: AnomalySeverity,
    pub status: AnomalyStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<AnomalyModel> for AnomalyView {
    fn from(m: AnomalyModel) -> Self {
        AnomalyView {
            id: m.id,
            class_id: m.class_id,
            session_date: m.session_date,
            student_id_1: m.student_id_1,
            student_id_2: m.student_id_2,
            correlation_score: m.correlation_score,
            severity: m.severity,
            status: m.status,
            notes: m.notes,
            created_at: m.created_at,
            reviewed_at: m.reviewed_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAnomaliesQuery {
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub session_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<AnomalyStatus>,
}

pub async fn list_anomalies(
    State(state): State<AppState>,
    Query(query): Query<ListAnomaliesQuery>,
) -> Result<Json<Vec<AnomalyView>>, AppError> {
    let rows = state
        .anomalies
        .list(query.class_id.as_deref(), query.session_date, query.status)
        .await?;
    Ok(Json(rows.into_iter().map(AnomalyView::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewActionBody {
    ConfirmProxy,
    FalsePositive,
}

impl From<ReviewActionBody> for ReviewAction {
    fn from(action: ReviewActionBody) -> Self {
        match action {
            ReviewActionBody::ConfirmProxy => ReviewAction::ConfirmProxy,
            ReviewActionBody::FalsePositive => ReviewAction::FalsePositive,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    pub action: ReviewActionBody,
    pub notes: Option<String>,
}

pub async fn review_anomaly(
    State(state): State<AppState>,
    Path(anomaly_id): Path<i64>,
    Json(body): Json<ReviewBody>,
) -> Result<Json<AnomalyView>, AppError> {
    let updated = state
        .anomalies
        .review(anomaly_id, body.action.into(), body.notes.as_deref())
        .await?;
    Ok(Json(updated.into()))
}
