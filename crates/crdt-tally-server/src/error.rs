use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use crdt_tally::CounterError;
use thiserror::Error;
use tracing::warn;

/// Errors raised by the server, each mapped onto an HTTP status.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A counter route was called before `/config`.
    #[error("This Host has not yet been configured")]
    NotConfigured,

    /// The named counter has never been referenced on this host.
    #[error("no counter named '{0}' could be found on this host")]
    UnknownCounter(String),

    /// None of this host's addresses appear in the actor list.
    #[error("None of this Host's IPs: {0:?} were found in actors list")]
    HostNotFound(Vec<String>),

    /// A request body is not the JSON this route expects.
    #[error("malformed request body: {0}")]
    BadBody(String),

    /// `/config` was called again with a different actor list.
    #[error("this host is already configured with a different actor list")]
    AlreadyConfigured,

    /// Rejected by the counter itself.
    #[error(transparent)]
    Counter(#[from] CounterError),

    /// Local network interfaces could not be listed.
    #[error("failed to list network interfaces: {0}")]
    Interfaces(String),

    /// The peer HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// Binding or serving the listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// The status code this error is answered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotConfigured => StatusCode::PRECONDITION_FAILED,
            Self::UnknownCounter(_) => StatusCode::NOT_FOUND,
            Self::HostNotFound(_) | Self::BadBody(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyConfigured => StatusCode::CONFLICT,
            Self::Counter(CounterError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Counter(_) => StatusCode::BAD_REQUEST,
            Self::Interfaces(_) | Self::Client(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(%status, error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
