use actix_web::{http::StatusCode, HttpResponse};
use serde::Serialize;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Resource not found: {resource}"))]
    NotFound { resource: String },

    #[snafu(display("Internal server error"))]
    InternalServerError {
        #[snafu(source(false))]
        source: Option<eyre::Report>,
    },

    #[snafu(display("Error returned from database"))]
    Store {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("Error running migrations"))]
    Migration {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("Queue error: {message}"))]
    Queue {
        message: String,
        #[snafu(source(false))]
        source: Option<sqlx::Error>,
    },

    #[snafu(display("Error encoding or decoding message"))]
    Codec {
        #[snafu(source)]
        source: serde_json::Error,
    },

    #[snafu(display("Deadline elapsed"))]
    Timeout,

    #[snafu(display("Operation cancelled"))]
    Cancelled,

    #[snafu(display("Invalid parameter: {message}"))]
    InvalidParameter { message: String },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Store { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Codec { source }
    }
}

impl From<eyre::Report> for Error {
    fn from(e: eyre::Report) -> Self {
        Self::InternalServerError { source: Some(e) }
    }
}

impl Error {
    pub fn internal(e: impl Into<eyre::Report>) -> Self {
        Self::InternalServerError {
            source: Some(e.into()),
        }
    }

    pub fn message_not_found(id: u64) -> Self {
        Self::NotFound {
            resource: format!("message {id}"),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    pub fn queue_transport(source: sqlx::Error) -> Self {
        Self::Queue {
            message: "transport failure".to_owned(),
            source: Some(source),
        }
    }

    /// Whether this error is the expected end of a bounded wait rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Timeout | Self::Cancelled)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,

            Self::InternalServerError { .. }
            | Self::Store { .. }
            | Self::Migration { .. }
            | Self::Queue { .. }
            | Self::Codec { .. }
            | Self::Timeout
            | Self::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Client errors carry their own message; everything else stays opaque.
        let error = if status.is_client_error() {
            self.to_string()
        } else {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_owned()
        };

        HttpResponse::build(status).json(ErrorBody { error })
    }
}
