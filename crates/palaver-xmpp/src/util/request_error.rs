// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::stanza::{DefinedCondition, StanzaError};

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Request Timeout")]
    TimedOut,
    #[error("Request Error: Unexpected server response")]
    UnexpectedResponse,
    #[error("XMPP Error: {err}")]
    XMPP { err: StanzaError },
    #[error("Request Error: Not connected")]
    Disconnected,
    #[error(transparent)]
    JidError(#[from] jid::Error),
    #[error("Request error: {msg}")]
    Generic { msg: String },
    #[error(transparent)]
    ParseError(#[from] ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Parse error: {msg}")]
    Generic { msg: String },
    #[error(transparent)]
    JidError(#[from] jid::Error),
    #[error(transparent)]
    XMLError(#[from] minidom::Error),
    #[error(transparent)]
    ParseIntError(#[from] std::num::ParseIntError),
    #[error(transparent)]
    DateTimeError(#[from] chrono::ParseError),
}

impl From<StanzaError> for RequestError {
    fn from(value: StanzaError) -> Self {
        Self::XMPP { err: value }
    }
}

impl RequestError {
    pub fn is_item_not_found_err(&self) -> bool {
        self.defined_condition() == Some(DefinedCondition::ItemNotFound)
    }

    pub fn is_forbidden_err(&self) -> bool {
        self.defined_condition() == Some(DefinedCondition::Forbidden)
    }

    pub fn defined_condition(&self) -> Option<DefinedCondition> {
        let RequestError::XMPP { err } = self else {
            return None;
        };
        Some(err.condition)
    }
}
