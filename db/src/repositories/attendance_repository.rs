use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set, sea_query::Expr,
};

use crate::error::RepoResult;
use crate::models::attendance::{ActiveModel, AttendanceStatus, Column, Entity, Model};

/// Everything needed to create a brand-new provisional attendance record.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub student_id: String,
    pub class_id: String,
    pub session_date: NaiveDate,
    pub device_id: String,
    pub check_in_time: DateTime<Utc>,
    pub rssi: Option<i32>,
    pub beacon_major: Option<i32>,
    pub beacon_minor: Option<i32>,
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn find_by_student_class_day(
        &self,
        student_id: &str,
        class_id: &str,
        session_date: NaiveDate,
    ) -> RepoResult<Option<Model>>;

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Model>>;

    async fn list_today(&self, student_id: &str, today: NaiveDate) -> RepoResult<Vec<Model>>;

    /// Inserts a new provisional record, folding a racing duplicate insert into
    /// the row that won instead of surfacing a conflict.
    async fn create_provisional(&self, new: NewAttendance) -> RepoResult<Model>;

    async fn update_snapshot(
        &self,
        id: i64,
        rssi: Option<i32>,
        beacon_major: Option<i32>,
        beacon_minor: Option<i32>,
    ) -> RepoResult<Option<Model>>;

    /// `provisional -> confirmed`, conditional on the row still being provisional.
    async fn confirm(&self, id: i64, confirmed_at: DateTime<Utc>) -> RepoResult<Option<Model>>;

    /// `provisional -> cancelled`, conditional on the row still being provisional.
    async fn cancel_provisional(
        &self,
        id: i64,
        cancelled_at: DateTime<Utc>,
        reason: &str,
    ) -> RepoResult<Option<Model>>;

    /// `confirmed -> cancelled`, the one documented exception to monotonicity:
    /// a reviewer confirming a proxy pair reverses an already-confirmed attendance.
    async fn cancel_confirmed(
        &self,
        id: i64,
        cancelled_at: DateTime<Utc>,
        reason: &str,
    ) -> RepoResult<Option<Model>>;

    async fn list_provisional_for_group(
        &self,
        class_id: &str,
        session_date: NaiveDate,
    ) -> RepoResult<Vec<Model>>;

    async fn list_provisional_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepoResult<Vec<Model>>;

    async fn list_cancelled_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Model>>;

    async fn delete(&self, id: i64) -> RepoResult<()>;
}

pub struct SeaOrmAttendanceRepository {
    db: DatabaseConnection,
}

impl SeaOrmAttendanceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn transition(
        &self,
        id: i64,
        from: AttendanceStatus,
        to: AttendanceStatus,
        timestamp_col: Column,
        at: DateTime<Utc>,
        reason: Option<&str>,
    ) -> RepoResult<Option<Model>> {
        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(to.to_value()))
            .col_expr(timestamp_col, Expr::value(at));
        if let Some(reason) = reason {
            update = update.col_expr(Column::CancellationReason, Expr::value(reason));
        }
        let result = update
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(from))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }
}

#[async_trait]
impl AttendanceRepository for SeaOrmAttendanceRepository {
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

    async fn find_by_id(&self, id: i64) -> RepoResult<Option<Model>> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn list_today(&self, student_id: &str, today: NaiveDate) -> RepoResult<Vec<Model>> {
        Ok(Entity::find()
            .filter(Column::StudentId.eq(student_id))
            .filter(Column::SessionDate.eq(today))
            .all(&self.db)
            .await?)
    }

    async fn create_provisional(&self, new: NewAttendance) -> RepoResult<Model> {
        let am = ActiveModel {
            id: Default::default(),
            student_id: Set(new.student_id.clone()),
            class_id: Set(new.class_id.clone()),
            session_date: Set(new.session_date),
            device_id: Set(new.device_id),
            status: Set(AttendanceStatus::Provisional),
            check_in_time: Set(new.check_in_time),
            confirmed_at: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            rssi: Set(new.rssi),
            beacon_major: Set(new.beacon_major),
            beacon_minor: Set(new.beacon_minor),
        };

        match am.insert(&self.db).await {
            Ok(row) => Ok(row),
            Err(DbErr::Query(_) | DbErr::Exec(_)) => {
                // Lost a race against a concurrent check-in for the same
                // (student, class, day); fold into the row that won.
                match self
                    .find_by_student_class_day(&new.student_id, &new.class_id, new.session_date)
                    .await?
                {
                    Some(existing) => Ok(existing),
                    None => Err(DbErr::Custom(
                        "attendance insert conflicted but no row found".into(),
                    )
                    .into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_snapshot(
        &self,
        id: i64,
        rssi: Option<i32>,
        beacon_major: Option<i32>,
        beacon_minor: Option<i32>,
    ) -> RepoResult<Option<Model>> {
        let result = Entity::update_many()
            .col_expr(Column::Rssi, Expr::value(rssi))
            .col_expr(Column::BeaconMajor, Expr::value(beacon_major))
            .col_expr(Column::BeaconMinor, Expr::value(beacon_minor))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(AttendanceStatus::Provisional))
            .exec(&self.db)
            .await?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn confirm(&self, id: i64, confirmed_at: DateTime<Utc>) -> RepoResult<Option<Model>> {
        self.transition(
            id,
            AttendanceStatus::Provisional,
            AttendanceStatus::Confirmed,
            Column::ConfirmedAt,
            confirmed_at,
            None,
        )
        .await
    }

    async fn cancel_provisional(
        &self,
        id: i64,
        cancelled_at: DateTime<Utc>,
        reason: &str,
    ) -> RepoResult<Option<Model>> {
        self.transition(
            id,
            AttendanceStatus::Provisional,
            AttendanceStatus::Cancelled,
            Column::CancelledAt,
            cancelled_at,
            Some(reason),
        )
        .await
    }

    async fn cancel_confirmed(
        &self,
        id: i64,
        cancelled_at: DateTime<Utc>,
        reason: &str,
    ) -> RepoResult<Option<Model>> {
        self.transition(
            id,
            AttendanceStatus::Confirmed,
            AttendanceStatus::Cancelled,
            Column::CancelledAt,
            cancelled_at,
            Some(reason),
        )
        .await
    }

    async fn list_provisional_for_group(
        &self,
        class_id: &str,
        session_date: NaiveDate,
    ) -> RepoResult<Vec<Model>> {
        Ok(Entity::find()
            .filter(Column::ClassId.eq(class_id))
            .filter(Column::SessionDate.eq(session_date))
            .filter(Column::Status.eq(AttendanceStatus::Provisional))
            .all(&self.db)
            .await?)
    }

    async fn list_provisional_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Model>> {
        Ok(Entity::find()
            .filter(Column::Status.eq(AttendanceStatus::Provisional))
            .filter(Column::CheckInTime.lt(cutoff))
            .all(&self.db)
            .await?)
    }

    async fn list_cancelled_expired(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Model>> {
        Ok(Entity::find()
            .filter(Column::Status.eq(AttendanceStatus::Cancelled))
            .filter(Column::CheckInTime.lt(cutoff))
            .all(&self.db)
            .await?)
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }
}
