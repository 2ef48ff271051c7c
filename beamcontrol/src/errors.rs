use thiserror::Error;

/// Error taxonomy of the cast control core.
///
/// The control plane maps every variant to HTTP 400 with the display
/// string as the human-readable message.
#[derive(Error, Debug)]
pub enum CastControlError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    #[error("Unsupported protocol for device {0}")]
    UnsupportedProtocol(String),
    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
    #[error("Not currently casting")]
    NotCasting,
    #[error("Unknown control action: {0}")]
    UnknownAction(String),
    #[error("Action {0} requires a numeric value")]
    MissingValue(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Chromecast error: {0}")]
    Chromecast(String),
    #[error("DLNA error: {0}")]
    Dlna(String),
    #[error("AirPlay error: {0}")]
    AirPlay(String),
}

impl CastControlError {
    pub fn chromecast(message: impl Into<String>) -> Self {
        CastControlError::Chromecast(message.into())
    }

    pub fn dlna(message: impl Into<String>) -> Self {
        CastControlError::Dlna(message.into())
    }

    pub fn airplay(message: impl Into<String>) -> Self {
        CastControlError::AirPlay(message.into())
    }
}
