use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use validator::Validate;

use util::AppError;

use core_logic::attendance::{AttendanceView, CheckInRequest, CheckInResponse, TodayEntry};
use core_logic::ingestion::RawSample;

use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckInBody {
    #[validate(length(min = 1, message = "studentId must not be empty"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "classId must not be empty"))]
    pub class_id: String,
    #[validate(length(min = 1, message = "deviceId must not be empty"))]
    pub device_id: String,
    #[validate(length(min = 1, message = "deviceSignature must not be empty"))]
    pub device_signature: String,
    pub device_salt_version: Option<u16>,
    #[validate(length(min = 1, message = "eventId must not be empty"))]
    pub event_id: String,
    pub rssi: Option<i32>,
    pub beacon_major: Option<i32>,
    pub beacon_minor: Option<i32>,
}

pub async fn check_in(
    State(state): State<AppState>,
    Json(body): Json<CheckInBody>,
) -> Result<Json<CheckInResponse>, AppError> {
    if let Err(errors) = body.validate() {
        return Err(AppError::BadRequest(common::format_validation_errors(&errors)));
    }

    let req = CheckInRequest {
        student_id: body.student_id,
        class_id: body.class_id,
        device_id: body.device_id,
        device_signature: body.device_signature,
        device_salt_version: body.device_salt_version,
        event_id: body.event_id,
        rssi: body.rssi,
        beacon_major: body.beacon_major,
        beacon_minor: body.beacon_minor,
    };
    Ok(Json(state.attendance.check_in(req).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    pub student_id: String,
    pub class_id: String,
    pub device_id: String,
    pub attendance_id: Option<i64>,
}

pub async fn confirm(
    State(state): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<AttendanceView>, AppError> {
    Ok(Json(
        state
            .attendance
            .confirm(&body.student_id, &body.class_id, &body.device_id, body.attendance_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelProvisionalBody {
    pub student_id: String,
    pub class_id: String,
    pub reason: Option<String>,
}

pub async fn cancel_provisional(
    State(state): State<AppState>,
    Json(body): Json<CancelProvisionalBody>,
) -> Result<Json<AttendanceView>, AppError> {
    Ok(Json(
        state
            .attendance
            .cancel_provisional(&body.student_id, &body.class_id, body.reason.as_deref())
            .await?,
    ))
}

pub async fn today(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<TodayEntry>>, AppError> {
    Ok(Json(state.attendance.query_today(&student_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RssiSampleBody {
    pub timestamp: DateTime<Utc>,
    pub rssi: i32,
    #[serde(default)]
    pub distance: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RssiStreamBody {
    #[validate(length(min = 1, message = "studentId must not be empty"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "classId must not be empty"))]
    pub class_id: String,
    pub session_date: Option<NaiveDate>,
    pub device_timestamp: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "rssiData must contain at least one sample"))]
    pub rssi_data: Vec<RssiSampleBody>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RssiStreamResponse {
    pub sample_count: i64,
}

pub async fn append_rssi_stream(
    State(state): State<AppState>,
    Json(body): Json<RssiStreamBody>,
) -> Result<Json<RssiStreamResponse>, AppError> {
    if let Err(errors) = body.validate() {
        return Err(AppError::BadRequest(common::format_validation_errors(&errors)));
    }

    let session_date = body.session_date.unwrap_or_else(|| Utc::now().date_naive());
    let samples = body
        .rssi_data
        .into_iter()
        .map(|s| RawSample {
            timestamp: Some(s.timestamp),
            rssi: Some(s.rssi),
        })
        .collect();

    let sample_count = state
        .ingestion
        .append_stream(&body.student_id, &body.class_id, session_date, body.device_timestamp, samples)
        .await?;

    Ok(Json(RssiStreamResponse { sample_count }))
}
