use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("source error: {0}")]
    Source(#[from] reqwest::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("projection error: {0}")]
    Projection(String),
    #[error("{0}")]
    Message(String),
}

pub type AppResult<T> = Result<T, AppError>;

/// True when `error` is worth a retry: request timeouts, connect failures,
/// and 5xx/429 responses. Any other 4xx is a persistent error — retrying it
/// just burns the backoff budget for nothing.
pub fn is_retryable(error: &AppError) -> bool {
    let AppError::Source(source) = error else {
        return false;
    };
    if source.is_timeout() || source.is_connect() {
        return true;
    }
    match source.status() {
        Some(status) => status.is_server_error() || status.as_u16() == 429,
        None => false,
    }
}
