use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::error::RepoResult;
use crate::models::rssi_stream::{ActiveModel, Column, Entity, Model, Sample, SampleList};

#[async_trait]
pub trait RssiStreamRepository: Send + Sync {
    async fn find_by_student_class_day(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
    ) -> RepoResult<Option<Model>>;

    /// Appends `samples` to the day's stream for (student, class), creating it
    /// if absent. Returns the resulting `sample_count`.
    async fn append(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
        samples: Vec<Sample>,
        now: DateTime<Utc>,
        last_clock_offset_ms: Option<i64>,
    ) -> RepoResult<i64>;

    /// Streams with at least `min_samples`, filtered by class/date when given,
    /// else bounded to the last 24 hours (`since`).
    async fn find_for_analysis(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
        since: DateTime<Utc>,
        min_samples: i64,
    ) -> RepoResult<Vec<Model>>;
}

pub struct SeaOrmRssiStreamRepository {
    db: DatabaseConnection,
}

impl SeaOrmRssiStreamRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RssiStreamRepository for SeaOrmRssiStreamRepository {
    async fn find_by_student_class_day(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
    ) -> RepoResult<Option<Model>> {
        Ok(Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::ClassId.eq(class_id))
            .filter(Column::SessionDate.eq(session_date))
            .one(&self.db)
            .await?)
    }

    async fn append(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
        samples: Vec<Sample>,
        now: DateTime<Utc>,
        last_clock_offset_ms: Option<i64>,
    ) -> RepoResult<i64> {
        match self
            .find_by_student_class_day(student_id, class_id, session_date)
            .await?
        {
            Some(existing) => {
                let mut merged = existing.samples.clone();
                merged.extend(samples);
                let new_count = merged.len() as i64;

                let mut am: ActiveModel = existing.into();
                am.samples = Set(merged);
                am.sample_count = Set(new_count);
                am.completed_at = Set(now);
                am.last_clock_offset_ms = Set(last_clock_offset_ms);
                am.update(&self.db).await?;
                Ok(new_count)
            }
            None => {
                let count = samples.len() as i64;
                let am = ActiveModel {
                    id: Default::default(),
                    student_id: Set(student_id.to_owned()),
                    class_id: Set(class_id.to_owned()),
                    session_date: Set(session_date),
                    samples: Set(SampleList::from(samples)),
                    started_at: Set(now),
                    completed_at: Set(now),
                    sample_count: Set(count),
                    last_clock_offset_ms: Set(last_clock_offset_ms),
                };
                am.insert(&self.db).await?;
                Ok(count)
            }
        }
    }

    async fn find_for_analysis(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
        since: DateTime<Utc>,
        min_samples: i64,
    ) -> RepoResult<Vec<Model>> {
        let mut sel = Entity::find().filter(Column::SampleCount.gte(min_samples));
        match class_id {
            Some(c) => sel = sel.filter(Column::ClassId.eq(c)),
            None => sel = sel.filter(Column::CompletedAt.gte(since)),
        }
        if let Some(d) = session_date {
            sel = sel.filter(Column::SessionDate.eq(d));
        }
        Ok(sel.all(&self.db).await?)
    }
}
