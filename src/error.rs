//! Error types for the survey service.

use std::time::Duration;

use crate::survey::state::SurveyPhase;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to read .env file: {0}")]
    Dotenv(String),
}

/// Model gateway errors.
///
/// `Transport` and `MalformedResponse` are kept apart because callers show
/// different messages for each.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Request to {provider} failed: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Request to {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Malformed response from {provider}: {reason}")]
    MalformedResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether the failure happened on the wire rather than in the payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by a survey turn.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("Message is empty")]
    EmptyInput,

    #[error("Survey could not be started: {0}")]
    Initialization(#[source] LlmError),

    #[error("Model transport failure: {0}")]
    Transport(#[source] LlmError),

    #[error("Model returned an unusable response: {0}")]
    MalformedResponse(#[source] LlmError),

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: SurveyPhase, to: SurveyPhase },

    #[error("Session store error: {0}")]
    Store(#[from] DatabaseError),
}

impl From<LlmError> for SurveyError {
    fn from(e: LlmError) -> Self {
        if e.is_transport() {
            Self::Transport(e)
        } else {
            Self::MalformedResponse(e)
        }
    }
}

impl SurveyError {
    /// Safe, user-facing text for this error. Never includes provider detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Por favor, escribe un mensaje.",
            Self::Initialization(_) => {
                "No se pudo iniciar la encuesta. Por favor, recarga la página."
            }
            Self::Transport(_) => {
                "Lo siento, hubo un problema de comunicación con el asistente. Inténtalo de nuevo en un momento."
            }
            Self::MalformedResponse(_) => {
                "Lo siento, ocurrió un error al procesar la respuesta. Inténtalo de nuevo."
            }
            Self::InvalidTransition { .. } | Self::Store(_) => {
                "Ocurrió un error interno. Inténtalo de nuevo más tarde."
            }
        }
    }
}
