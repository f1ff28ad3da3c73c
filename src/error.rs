use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("group is full")]
    CapacityExceeded,
    #[error("a round is in progress")]
    RoundInProgress,
    #[error("player is not in this group")]
    PlayerNotInGroup,
    #[error("no round is running")]
    RoundNotRunning,
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::NotFound(_) => "not_found",
            SessionError::CapacityExceeded => "capacity_exceeded",
            SessionError::RoundInProgress => "round_in_progress",
            SessionError::PlayerNotInGroup => "player_not_in_group",
            SessionError::RoundNotRunning => "round_not_running",
            SessionError::PersistenceFailure(_) => "persistence_failure",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            SessionError::NotFound(_) => StatusCode::NOT_FOUND,
            SessionError::CapacityExceeded
            | SessionError::RoundInProgress
            | SessionError::PlayerNotInGroup
            | SessionError::RoundNotRunning => StatusCode::CONFLICT,
            SessionError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => SessionError::NotFound(what),
            StoreError::CapacityExceeded => SessionError::CapacityExceeded,
            StoreError::Unavailable(reason) => SessionError::PersistenceFailure(reason),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{0}")]
    InvalidInput(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Session(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Session(err) => (err.status(), err.code()),
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        };
        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));
        (status, body).into_response()
    }
}
