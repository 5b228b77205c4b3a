use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::error::RepoResult;
use crate::models::idempotency_key::{ActiveModel, Column, Entity, Model};

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    async fn find(&self, event_id: &str, scope: &str) -> RepoResult<Option<Model>>;

    async fn store(
        &self,
        event_id: &str,
        scope: &str,
        request_hash: &str,
        stored_response: serde_json::Value,
        status_code: i16,
        created_at: DateTime<Utc>,
    ) -> RepoResult<Model>;

    /// Deletes keys older than `cutoff`; returns the number removed.
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64>;
}

pub struct SeaOrmIdempotencyRepository {
    db: DatabaseConnection,
}

impl SeaOrmIdempotencyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdempotencyRepository for SeaOrmIdempotencyRepository {
    async fn find(&self, event_id: &str, scope: &str) -> RepoResult<Option<Model>> {
        Ok(Entity::find()
            .filter(Column::EventId.eq(event_id))
            .filter(Column::Scope.eq(scope))
            .one(&self.db)
            .await?)
    }

    async fn store(
        &self,
        event_id: &str,
        scope: &str,
        request_hash: &str,
        stored_response: serde_json::Value,
        status_code: i16,
        created_at: DateTime<Utc>,
    ) -> RepoResult<Model> {
        let am = ActiveModel {
            event_id: Set(event_id.to_owned()),
            scope: Set(scope.to_owned()),
            request_hash: Set(request_hash.to_owned()),
            stored_response: Set(stored_response),
            status_code: Set(status_code),
            created_at: Set(created_at),
        };
        Ok(am.insert(&self.db).await?)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> RepoResult<u64> {
        let result = Entity::delete_many()
            .filter(Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
