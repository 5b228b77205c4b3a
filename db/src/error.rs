use thiserror::Error;

/// Storage-layer failure, kept free of any core business semantics.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

pub type RepoResult<T> = Result<T, RepoError>;
