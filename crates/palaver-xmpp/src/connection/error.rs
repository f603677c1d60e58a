// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Protocol error: {msg}")]
    Protocol { msg: String },
    #[error("Authentication failed: {condition}")]
    Auth { condition: String },
    #[error("Registration failed: {condition}")]
    Registration { condition: String },
    #[error("Connection timed out")]
    TimedOut,
    #[error("No restorable session")]
    NoRestorableSession,
    #[error("Connection failed: {condition}")]
    Failed { condition: String },
}
