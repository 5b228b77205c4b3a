use std::ops::{Deref, DerefMut};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::FromJsonQueryResult;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "rssi_streams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub student_id: String,
    pub class_id: String,
    pub session_date: NaiveDate,
    #[sea_orm(column_type = "JsonBinary")]
    pub samples: SampleList,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub sample_count: i64,
    pub last_clock_offset_ms: Option<i64>,
}

/// One RSSI reading, server-corrected for clock skew where applicable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub rssi: i32,
    pub original_timestamp: Option<DateTime<Utc>>,
    pub clock_offset_ms: Option<i64>,
}

/// Wraps the stream's samples so sea-orm can round-trip the column as JSON
/// (`FromJsonQueryResult` only applies to a named type, not a bare `Vec<T>`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct SampleList(pub Vec<Sample>);

impl Deref for SampleList {
    type Target = Vec<Sample>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SampleList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<Sample>> for SampleList {
    fn from(samples: Vec<Sample>) -> Self {
        Self(samples)
    }
}

impl IntoIterator for SampleList {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
