use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid signature: {0}")]
    Signature(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Gateway {
        message: String,
        details: Option<String>,
    },

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn gateway(message: impl Into<String>, details: impl ToString) -> Self {
        AppError::Gateway {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Signature(_) => StatusCode::BAD_REQUEST,
            AppError::Payload(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Gateway { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::OrmError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        let details = match err {
            AppError::Gateway { details, .. } => details.clone(),
            _ => None,
        };
        ErrorBody {
            error: err.to_string(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::OrmError(err) => tracing::error!(error = %err, "database error"),
            AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
            _ => {}
        }
        let status = self.status_code();
        (status, axum::Json(ErrorBody::from(&self))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
