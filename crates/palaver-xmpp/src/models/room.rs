// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;

use jid::{BareJid, Jid};

use crate::models::MessageStore;
use crate::stanza::muc::{Affiliation, Role};

#[derive(Debug, Clone, PartialEq)]
pub struct RoomOccupant {
    /// The occupant's real JID, if the room discloses it.
    pub jid: Option<Jid>,
    pub nick: String,
    pub affiliation: Affiliation,
    pub role: Role,
}

/// A room we're currently in.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub jid: BareJid,
    /// Our own nickname in the room.
    pub nick: String,
    pub occupants: BTreeMap<String, RoomOccupant>,
    pub subject: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub messages: MessageStore,
}

impl Room {
    pub fn new(jid: BareJid, nick: impl Into<String>) -> Self {
        Room {
            jid,
            nick: nick.into(),
            occupants: Default::default(),
            subject: None,
            name: None,
            description: None,
            messages: Default::default(),
        }
    }

    pub fn occupant(&self, nick: &str) -> Option<&RoomOccupant> {
        self.occupants.get(nick)
    }

    /// Finds the occupant whose real JID has the bare form `jid`.
    pub fn occupant_by_jid(&self, jid: &BareJid) -> Option<&RoomOccupant> {
        self.occupants.values().find(|occupant| {
            occupant
                .jid
                .as_ref()
                .map(|occupant_jid| &occupant_jid.to_bare() == jid)
                .unwrap_or(false)
        })
    }
}
