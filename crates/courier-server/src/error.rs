use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_common::ErrorBody;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Auth Errors
    #[error("No session token found")]
    AuthFailNoToken,
    #[error("Session token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("Invalid session token")]
    AuthFailInvalidToken,
    #[error("Auth context missing")]
    AuthFailCtxNotInRequestExt,

    // Model Errors
    #[error("Conversation {id} not found")]
    ConversationNotFound { id: String },
    #[error("Message {id} not found")]
    MessageNotFound { id: String },
    #[error("{0}")]
    Forbidden(String),

    // Generic
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::AuthFailNoToken | Error::AuthFailTokenWrongFormat | Error::AuthFailInvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthFailCtxNotInRequestExt | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::ConversationNotFound { .. } | Error::MessageNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

// Store and IO failures surface as anyhow errors
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::AuthFailNoToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::MessageNotFound { id: "m1".into() }.status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Forbidden("nope".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::from(anyhow::anyhow!("disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
