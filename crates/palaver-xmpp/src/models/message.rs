// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jid::Jid;
use minidom::Element;

use crate::ns;
use crate::stanza::{origin_id, stanza_id, Delay};
use crate::util::{ElementExt, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Chat,
    Groupchat,
    Normal,
    Headline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// The id the sender assigned. Empty if it had none.
    pub id: String,
    /// The id our archive (or the room's) assigned, from `<stanza-id/>` or a MAM result.
    pub stanza_id: Option<String>,
    pub kind: MessageKind,
    pub from: Jid,
    pub to: Option<Jid>,
    pub body: String,
    /// Send time. Taken from `<delay/>` if present.
    pub timestamp: DateTime<Utc>,
    pub delayed: bool,
    pub from_archive: bool,
    pub outgoing: bool,
}

impl ChatMessage {
    /// Parses a `<message/>` carrying a body. Returns `None` for messages without one, e.g. chat
    /// states or receipts.
    pub fn from_stanza(stanza: &Element, now: DateTime<Utc>) -> Result<Option<Self>, ParseError> {
        let Some(body) = stanza.child_text("body", ns::JABBER_CLIENT) else {
            return Ok(None);
        };

        let from = stanza.attr_jid("from")?.ok_or(ParseError::Generic {
            msg: "Message is missing a sender".to_string(),
        })?;

        let kind = stanza
            .attr("type")
            .and_then(|t| MessageKind::from_str(t).ok())
            .unwrap_or(MessageKind::Normal);

        let delay = Delay::from_parent(stanza)?;
        let to = stanza.attr_jid("to")?;

        let archive = match kind {
            MessageKind::Groupchat => Some(from.to_bare()),
            _ => to.as_ref().map(Jid::to_bare),
        };

        Ok(Some(ChatMessage {
            id: origin_id(stanza).unwrap_or_default(),
            stanza_id: archive.and_then(|archive| stanza_id(stanza, &archive)),
            kind,
            from,
            to,
            body,
            timestamp: delay.as_ref().map(|d| d.stamp).unwrap_or(now),
            delayed: delay.is_some(),
            from_archive: false,
            outgoing: false,
        }))
    }
}

/// Messages of a single conversation, ordered by timestamp.
///
/// A message is stored once even if it arrives under different ids, e.g. live with the id its
/// sender gave it and later from the archive with its stanza id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    ids: HashSet<String>,
}

impl MessageStore {
    /// Inserts `message` at its chronological position. Returns false if the message is already
    /// stored under its id or its stanza id. In that case a stanza id the stored copy lacks is
    /// taken over.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if let Some(idx) = self.position_of(&message) {
            let existing = &mut self.messages[idx];
            if existing.stanza_id.is_none() {
                if let Some(stanza_id) = message.stanza_id {
                    self.ids.insert(stanza_id.clone());
                    existing.stanza_id = Some(stanza_id);
                }
            }
            return false;
        }

        self.ids.extend(message_ids(&message).map(ToString::to_string));

        let idx = self
            .messages
            .partition_point(|existing| existing.timestamp <= message.timestamp);
        self.messages.insert(idx, message);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The stanza id of the newest message the archive knows about. Ids assigned by senders are
    /// never returned since the archive can't resolve them.
    pub fn archive_cursor(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find_map(|message| message.stanza_id.as_deref())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn position_of(&self, message: &ChatMessage) -> Option<usize> {
        if !message_ids(message).any(|id| self.ids.contains(id)) {
            return None;
        }

        self.messages.iter().position(|existing| {
            (!message.id.is_empty() && existing.id == message.id)
                || (message.stanza_id.is_some() && existing.stanza_id == message.stanza_id)
        })
    }
}

fn message_ids(message: &ChatMessage) -> impl Iterator<Item = &str> {
    Some(message.id.as_str())
        .filter(|id| !id.is_empty())
        .into_iter()
        .chain(message.stanza_id.as_deref())
}
