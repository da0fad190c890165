use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    pairline_sessions::SessionLookupError,
    pairline_whatsapp::WhatsAppError,
    tracing::error,
};

/// Request failures, rendered as plain-text bodies.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid number")]
    InvalidNumber,
    #[error("Invalid session id")]
    InvalidSessionId,
    #[error("Missing fields")]
    MissingFields,
    #[error("Invalid delay")]
    InvalidDelay,
    #[error("Invalid target type")]
    InvalidTargetType,
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    #[error("Upload too large")]
    UploadTooLarge,
    #[error("No WhatsApp session")]
    NoSession,
    #[error("Unknown WhatsApp session")]
    UnknownSession,
    #[error("Multiple WhatsApp sessions; specify session")]
    AmbiguousSession,
    #[error("Unknown task")]
    UnknownTask,
    #[error("Task already finished")]
    TaskFinished,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Error: {0}")]
    WhatsApp(#[from] WhatsAppError),
    #[error("Internal error")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidNumber
            | Self::InvalidSessionId
            | Self::MissingFields
            | Self::InvalidDelay
            | Self::InvalidTargetType
            | Self::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            Self::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnknownSession | Self::UnknownTask => StatusCode::NOT_FOUND,
            Self::NoSession | Self::AmbiguousSession | Self::TaskFinished => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::WhatsApp(WhatsAppError::PairingTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::WhatsApp(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SessionLookupError> for GatewayError {
    fn from(err: SessionLookupError) -> Self {
        match err {
            SessionLookupError::Empty => Self::NoSession,
            SessionLookupError::Unknown(_) => Self::UnknownSession,
            SessionLookupError::Ambiguous(_) => Self::AmbiguousSession,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!(error = %detail, "request failed");
        }
        (self.status(), self.to_string()).into_response()
    }
}
