use thiserror::Error;

/// Faults raised while answering a webhook. These never reach the provider as-is; see
/// [`crate::config::FaultPolicy`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("malformed webhook payload: {0}")]
    Payload(#[from] serde_urlencoded::de::Error),
    #[error("conversation log i/o failed: {0}")]
    LogIo(#[from] std::io::Error),
    #[error("conversation log is not valid json: {0}")]
    LogFormat(#[from] serde_json::Error),
    #[error("text generation failed: {0}")]
    Generation(String),
}

/// Missing or unusable settings. Always detected before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set!")]
    Missing(&'static str),
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Ways an outbound call request can fail.
#[derive(Debug, Error)]
pub enum PlaceCallError {
    /// Twilio answered with an error document.
    #[error("twilio rejected the call ({status}, code {code:?}): {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
        more_info: Option<String>,
    },
    #[error("failed to reach twilio: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response from twilio ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
}
