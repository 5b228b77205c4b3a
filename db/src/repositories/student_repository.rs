use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};

use crate::error::RepoResult;
use crate::models::student::{ActiveModel, Column, Entity, Model};

#[async_trait]
pub trait StudentRepository: Send + Sync {
    async fn find_by_student_id(&self, student_id: &str) -> RepoResult<Option<Model>>;
    async fn find_by_device_id(&self, device_id: &str) -> RepoResult<Option<Model>>;
    async fn create(&self, student_id: &str, name: &str) -> RepoResult<Model>;

    /// Binds `device_id` to the student, but only if no device is bound yet.
    /// Returns `None` if the row no longer has a null `device_id` (lost the race).
    async fn bind_device_if_unset(
        &self,
        id: i64,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Model>>;

    async fn reset_device(&self, student_id: &str) -> RepoResult<Option<Model>>;
}

pub struct SeaOrmStudentRepository {
    db: DatabaseConnection,
}

impl SeaOrmStudentRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StudentRepository for SeaOrmStudentRepository {
    async fn find_by_student_id(&self, student_id: &str) -> RepoResult<Option<Model>> {
        Ok(Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .one(&self.db)
            .await?)
    }

    async fn find_by_device_id(&self, device_id: &str) -> RepoResult<Option<Model>> {
        Ok(Entity::find()
            .filter(Column::DeviceId.eq(device_id))
            .one(&self.db)
            .await?)
    }

    async fn create(&self, student_id: &str, name: &str) -> RepoResult<Model> {
        let am = ActiveModel {
            id: Default::default(),
            student_id: Set(student_id.to_owned()),
            name: Set(name.to_owned()),
            device_id: Set(None),
            device_registered_at: Set(None),
        };
        Ok(am.insert(&self.db).await?)
    }

    async fn bind_device_if_unset(
        &self,
        id: i64,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> RepoResult<Option<Model>> {
        let result = Entity::update_many()
            .col_expr(Column::DeviceId, Expr::value(device_id))
            .col_expr(Column::DeviceRegisteredAt, Expr::value(at))
            .filter(Column::Id.eq(id))
            .filter(Column::DeviceId.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn reset_device(&self, student_id: &str) -> RepoResult<Option<Model>> {
        let Some(existing) = self.find_by_student_id(student_id).await? else {
            return Ok(None);
        };
        let mut am: ActiveModel = existing.into();
        am.device_id = Set(None);
        am.device_registered_at = Set(None);
        Ok(Some(am.update(&self.db).await?))
    }
}
