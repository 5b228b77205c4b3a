use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20260101_000002_create_attendances"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alias::new("attendances"))
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Alias::new("id"))
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("student_id"))
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("class_id")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("session_date"))
                            .date()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Alias::new("device_id")).string().not_null())
                    .col(ColumnDef::new(Alias::new("status")).string().not_null())
                    .col(
                        ColumnDef::new(Alias::new("check_in_time"))
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("confirmed_at"))
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("cancelled_at"))
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("cancellation_reason"))
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(Alias::new("rssi")).integer().null())
                    .col(
                        ColumnDef::new(Alias::new("beacon_major"))
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alias::new("beacon_minor"))
                            .integer()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_attendances_student_class_day")
                    .table(Alias::new("attendances"))
                    .col(Alias::new("student_id"))
                    .col(Alias::new("class_id"))
                    .col(Alias::new("session_date"))
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alias::new("attendances")).to_owned())
            .await
    }
}
