//! Every way a backend call can fail, each with its own user-facing text.

use taskdeck_proto::error::{ErrorPayload, FieldError, InputError, join_field_errors};

use crate::config::ConfigError;

/// Shown when a request times out or the server answers with a cold-start page.
pub const STARTING_UP: &str =
    "Backend is starting up. Please wait 30-60 seconds and try again.";

/// Statuses that mean the route does not exist on this deployment.
const ABSENT_ROUTE_STATUSES: [u16; 3] = [404, 405, 501];

/// Longest diagnostic body kept from a non-JSON response.
const SNIPPET_CHARS: usize = 200;

/// Errors from talking to the backend.
///
/// `Display` is the message meant for the user; [`ApiError::user_message`]
/// is an alias kept for call sites that read better with it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The API address is unusable; no request was sent.
    #[error("{0}")]
    Configuration(#[from] ConfigError),

    /// The request exceeded its time bound.
    #[error("Request timed out. The service may be starting up, please retry shortly.")]
    Timeout,

    /// The response was not JSON (an HTML error page, a proxy banner).
    #[error("{message}")]
    Protocol {
        /// HTTP status of the response.
        status: u16,
        /// Startup notice or generic unavailability text.
        message: &'static str,
        /// Start of the body, for logs.
        snippet: String,
    },

    /// The response claimed to be JSON but could not be decoded.
    #[error("Invalid response from server: {reason}")]
    Decode {
        /// What went wrong.
        reason: String,
    },

    /// Field-level validation errors, from local checks or the server.
    #[error("{}", join_field_errors(.fields))]
    Validation {
        /// HTTP status, when the server reported them.
        status: Option<u16>,
        /// Each offending field.
        fields: Vec<FieldError>,
    },

    /// Non-2xx with a message from the server, shown verbatim.
    #[error("{message}")]
    Application {
        /// HTTP status of the response.
        status: u16,
        /// Server-provided message.
        message: String,
    },

    /// Non-2xx without a usable error payload.
    #[error("Server error ({status})")]
    Server {
        /// HTTP status of the response.
        status: u16,
    },

    /// Connection refused, DNS failure, TLS failure, and similar.
    #[error("Cannot connect to server. Please check your internet connection.")]
    Network {
        /// Transport-level description, for logs.
        reason: String,
    },

    /// The backend does not implement this operation.
    #[error("{operation} is not available yet.")]
    Unsupported {
        /// What the user tried to do.
        operation: &'static str,
    },

    /// Sign-in succeeded without returning a token.
    #[error("No token received from server")]
    MissingToken,

    /// The operation needs a session and none is held.
    #[error("Please sign in first")]
    NotAuthenticated,
}

fn protocol_message(status: u16, snippet: &str) -> &'static str {
    if status == 503 || snippet.contains("503") || snippet.contains("Application Error") {
        STARTING_UP
    } else {
        "Server unavailable: it returned a non-JSON response."
    }
}

impl ApiError {
    /// The one message to show the user for this failure.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// HTTP status of the response that caused the error, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. }
            | Self::Application { status, .. }
            | Self::Server { status } => Some(*status),
            Self::Validation { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the server answered as if the route did not exist.
    #[must_use]
    pub fn is_absent_route(&self) -> bool {
        self.status()
            .is_some_and(|s| ABSENT_ROUTE_STATUSES.contains(&s))
    }

    /// Whether retrying later could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network { .. } => true,
            Self::Protocol { status, .. } | Self::Server { status } => *status >= 500,
            _ => false,
        }
    }

    /// Builds the error for a non-2xx response from its decoded body.
    ///
    /// Field errors win over a top-level message; with neither, the
    /// status alone is reported.
    #[must_use]
    pub fn from_status(status: u16, body: Option<&serde_json::Value>) -> Self {
        match body.and_then(ErrorPayload::from_value) {
            Some(payload) if payload.has_field_errors() => Self::Validation {
                status: Some(status),
                fields: payload.fields,
            },
            Some(ErrorPayload {
                message: Some(message),
                ..
            }) => Self::Application { status, message },
            _ => Self::Server { status },
        }
    }

    /// Builds the error for a response whose body is not JSON.
    #[must_use]
    pub fn non_json(status: u16, body: &str) -> Self {
        Self::Protocol {
            status,
            message: protocol_message(status, body),
            snippet: body.trim().chars().take(SNIPPET_CHARS).collect(),
        }
    }

    /// Classifies a transport failure from reqwest.
    #[must_use]
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode {
                reason: err.to_string(),
            }
        } else {
            Self::Network {
                reason: err.to_string(),
            }
        }
    }
}

impl From<InputError> for ApiError {
    fn from(err: InputError) -> Self {
        Self::Validation {
            status: None,
            fields: err.fields,
        }
    }
}
