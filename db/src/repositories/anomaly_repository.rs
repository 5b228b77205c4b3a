use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::error::RepoResult;
use crate::models::anomaly::{ActiveModel, AnomalySeverity, AnomalyStatus, Column, Entity, Model};

/// `student_id_1 < student_id_2` is the caller's responsibility; canonicalization
/// happens one layer up, where the business rule lives.
#[derive(Debug, Clone)]
pub struct PairUpsert {
    pub class_id: String,
    pub session_date: NaiveDate,
    pub student_id_1: String,
    pub student_id_2: String,
    pub correlation_score: f64,
    pub severity: AnomalySeverity,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Status to use if this pair has never been seen before. Auto-promotion
    /// (`ρ ≥ 0.98`) is decided by the caller; an existing row's status is
    /// never touched by this call, whatever it is.
    pub initial_status: AnomalyStatus,
}

#[async_trait]
pub trait AnomalyRepository: Send + Sync {
    async fn find_pair(
        &self,
        class_id: &str,
        session_date: NaiveDate,
        student_id_1: &str,
        student_id_2: &str,
    ) -> RepoResult<Option<Model>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Model>>;

    async fn list(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
        status: Option<AnomalyStatus>,
    ) -> RepoResult<Vec<Model>>;

    /// Inserts the pair if absent, with `initial_status`. If present and the
    /// new correlation score is higher, overwrites score/severity/notes —
    /// status is never touched by an update, whatever it currently holds.
    async fn upsert(&self, pair: PairUpsert) -> RepoResult<Model>;

    async fn update_status(
        &self,
        id: i64,
        status: AnomalyStatus,
        notes: Option<&str>,
        reviewed_at: DateTime<Utc>,
    ) -> RepoResult<Option<Model>>;
}

pub struct SeaOrmAnomalyRepository {
    db: DatabaseConnection,
}

impl SeaOrmAnomalyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AnomalyRepository for SeaOrmAnomalyRepository {
    async fn find_pair(
        &self,
        class_id: &str,
        session_date: NaiveDate,
        student_id_1: &str,
        student_id_2: &str,
    ) -> RepoResult<Option<Model>> {
        Ok(Entity::find()
            .filter(Column::ClassId.eq(class_id))
            .filter(Column::SessionDate.eq(session_date))
            .filter(Column::StudentId1.eq(student_id_1))
            .filter(Column::StudentId2.eq(student_id_2))
            .one(&self.db)
            .await?)
    }

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Model>> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn list(
        &self,
        class_id: Option<&str>,
        session_date: Option<NaiveDate>,
        status: Option<AnomalyStatus>,
    ) -> RepoResult<Vec<Model>> {
        let mut sel = Entity::find();
        if let Some(c) = class_id {
            sel = sel.filter(Column::ClassId.eq(c));
        }
        if let Some(d) = session_date {
            sel = sel.filter(Column::SessionDate.eq(d));
        }
        if let Some(s) = status {
            sel = sel.filter(Column::Status.eq(s));
        }
        Ok(sel.all(&self.db).await?)
    }

    async fn upsert(&self, pair: PairUpsert) -> RepoResult<Model> {
        match self
            .find_pair(
                &pair.class_id,
                pair.session_date,
                &pair.student_id_1,
                &pair.student_id_2,
            )
            .await?
        {
            Some(existing) => {
                if pair.correlation_score > existing.correlation_score {
                    let mut am: ActiveModel = existing.into();
                    am.correlation_score = Set(pair.correlation_score);
                    am.severity = Set(pair.severity);
                    if pair.notes.is_some() {
                        am.notes = Set(pair.notes);
                    }
                    Ok(am.update(&self.db).await?)
                } else {
                    Ok(existing)
                }
            }
            None => {
                let am = ActiveModel {
                    id: Default::default(),
                    class_id: Set(pair.class_id),
                    session_date: Set(pair.session_date),
                    student_id_1: Set(pair.student_id_1),
                    student_id_2: Set(pair.student_id_2),
                    correlation_score: Set(pair.correlation_score),
                    severity: Set(pair.severity),
                    status: Set(pair.initial_status),
                    notes: Set(pair.notes),
                    created_at: Set(pair.created_at),
                    reviewed_at: Set(None),
                };
                Ok(am.insert(&self.db).await?)
            }
        }
    }

    async fn update_status(
        &self,
        id: i64,
        status: AnomalyStatus,
        notes: Option<&str>,
        reviewed_at: DateTime<Utc>,
    ) -> RepoResult<Option<Model>> {
        let Some(existing) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let mut am: ActiveModel = existing.into();
        am.status = Set(status);
        am.notes = Set(notes.map(str::to_owned));
        am.reviewed_at = Set(Some(reviewed_at));
        Ok(Some(am.update(&self.db).await?))
    }
}
