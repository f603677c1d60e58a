// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    /// The connection attempt failed. See `Connection::last_condition`.
    Connfail,
    Authenticating,
    Authfail,
    Connected,
    Disconnecting,
    /// A persisted session was restored.
    Attached,
    Redirect,
    ConnTimeout,
    /// Authenticated, waiting for `Connection::bind`.
    BindRequired,
    AttachFail,
    Reconnecting,
    RegiFail,
    Register,
    Registered,
    Conflict,
    NotAcceptable,
}

impl ConnectionStatus {
    /// Whether a pending `connect`, `register` or `restore` call resolves with this status.
    pub(crate) fn is_terminal(&self) -> bool {
        !matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::Authenticating
                | ConnectionStatus::Redirect
                | ConnectionStatus::Reconnecting
                | ConnectionStatus::Register
                | ConnectionStatus::Registered
                | ConnectionStatus::Disconnecting
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Attached)
    }
}
