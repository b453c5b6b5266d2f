use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use cardwall_db::DbError;
use cardwall_types::api::ErrorResponse;

use crate::assets::AssetError;

/// Every failure a handler can report. Rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("you do not own this card")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} is already taken")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    DimensionTooLarge(String),

    #[error("{0}")]
    InvalidImageData(String),

    #[error("you already liked this card")]
    AlreadyLiked,

    #[error("you have not liked this card")]
    NotLiked,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::DimensionTooLarge(_)
            | Self::InvalidImageData(_)
            | Self::AlreadyLiked
            | Self::NotLiked => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Self::NotFound("record"),
            DbError::AlreadyLiked => Self::AlreadyLiked,
            DbError::NotLiked => Self::NotLiked,
            DbError::Validation(msg) => Self::Validation(msg),
            DbError::Conflict(what) => Self::Conflict(what),
            e @ (DbError::Sqlite(_) | DbError::LockPoisoned(_)) => {
                error!("Store failure: {}", e);
                Self::Internal
            }
        }
    }
}

impl From<AssetError> for ApiError {
    fn from(err: AssetError) -> Self {
        match err {
            e @ AssetError::PayloadTooLarge { .. } => Self::PayloadTooLarge(e.to_string()),
            e @ AssetError::UnsupportedFormat => Self::UnsupportedFormat(e.to_string()),
            e @ AssetError::DimensionTooLarge { .. } => Self::DimensionTooLarge(e.to_string()),
            e @ AssetError::InvalidImageData(_) => Self::InvalidImageData(e.to_string()),
            e @ (AssetError::InvalidReference(_) | AssetError::Io(_) | AssetError::Task(_)) => {
                error!("Asset storage failure: {}", e);
                Self::Internal
            }
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(err.body_text())
        } else {
            Self::Validation(format!("malformed form data: {}", err.body_text()))
        }
    }
}
