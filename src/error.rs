use thiserror::Error as ThisError;

/// Inbound payload could not be turned into a [`SensorReading`](crate::sensors::SensorReading).
#[derive(ThisError, Debug)]
#[error("Malformed payload on {topic}: {source}")]
pub struct DecodeError {
    pub topic: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(ThisError, Debug)]
pub enum DispatchError {
    #[error("Invalid e-mail address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build notification message: {0}")]
    Message(String),

    #[error("Notification transport failed: {0}")]
    Transport(String),
}

#[derive(ThisError, Debug)]
pub enum StartupError {
    #[error("Failed to read credentials file {path}: {source}")]
    CredentialsFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Credentials file {0} is empty")]
    EmptyCredential(String),

    #[error("Invalid status listen address: {0}")]
    InvalidListenAddress(String),

    #[error("Failed to bind status server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MQTT connection timeout after {0} seconds")]
    ConnectTimeout(u64),

    #[error("Failed to configure SMTP transport: {0}")]
    Smtp(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StartupError>;
