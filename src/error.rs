use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Hit not found")]
    HitNotFound,

    #[error("Referral not found")]
    ReferralNotFound,

    #[error("Invalid affiliate: {0}")]
    InvalidAffiliate(String),

    #[error("Invalid referral: {0}")]
    InvalidReferral(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid table prefix: {0}")]
    InvalidTablePrefix(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::HitNotFound | Error::ReferralNotFound => StatusCode::NOT_FOUND,
            Error::InvalidAffiliate(_)
            | Error::InvalidReferral(_)
            | Error::InvalidTimezone(_)
            | Error::InvalidTablePrefix(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
