use thiserror::Error;

/// Why an inbound or peer payload could not be turned into a command.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not a valid {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown websocket action `{0}`")]
    UnknownAction(String),
    #[error("unknown peer path `{0}`")]
    UnknownPath(String),
}

#[derive(Debug, Error)]
#[error("unknown pulse policy `{0}` (expected `threshold` or `proportional`)")]
pub struct ParsePolicyError(pub String);
