// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error {status}")]
    Http { status: u16 },
    #[error("Socket error: {msg}")]
    Socket { msg: String },
    #[error("Stream error: {condition}")]
    Stream {
        condition: String,
        text: Option<String>,
    },
    #[error("Failed to parse server data: {msg}")]
    Parse { msg: String },
    #[error("Giving up after too many retries")]
    RetriesExhausted,
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid service URL '{url}'")]
    InvalidService { url: String },
    #[error("No restorable session")]
    NoSession,
}

impl TransportError {
    /// A short, stable name for the error that is reported as connection condition.
    pub fn condition(&self) -> String {
        match self {
            TransportError::Http { .. } => "http-error".to_string(),
            TransportError::Socket { .. } => "connection-lost".to_string(),
            TransportError::Stream { condition, .. } => condition.clone(),
            TransportError::Parse { .. } => "bad-format".to_string(),
            TransportError::RetriesExhausted => "giving-up".to_string(),
            TransportError::NotConnected => "not-connected".to_string(),
            TransportError::InvalidService { .. } => "invalid-service".to_string(),
            TransportError::NoSession => "no-session".to_string(),
        }
    }
}

impl From<minidom::Error> for TransportError {
    fn from(value: minidom::Error) -> Self {
        TransportError::Parse {
            msg: value.to_string(),
        }
    }
}
