// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;

use jid::BareJid;

use crate::models::{ChatMessage, Contact, MessageStore, Room};
use crate::util::{ReplayStream, ReplaySubject};

pub type Contacts = BTreeMap<BareJid, Contact>;
pub type Rooms = BTreeMap<BareJid, Room>;
/// Messages exchanged with JIDs that are not on the roster.
pub type Conversations = BTreeMap<BareJid, MessageStore>;

/// Contacts, joined rooms and conversations with strangers of the current session, shared by all
/// modules.
///
/// All collections are published as replay-latest streams. Everything is dropped on logout.
#[derive(Default)]
pub struct SessionStore {
    contacts: ReplaySubject<Contacts>,
    rooms: ReplaySubject<Rooms>,
    conversations: ReplaySubject<Conversations>,
}

impl SessionStore {
    pub fn contacts(&self) -> Contacts {
        self.contacts.value()
    }

    pub fn contact(&self, jid: &BareJid) -> Option<Contact> {
        self.contacts.value().get(jid).cloned()
    }

    pub fn contacts_stream(&self) -> ReplayStream<Contacts> {
        self.contacts.subscribe()
    }

    pub fn update_contacts(&self, f: impl FnOnce(&mut Contacts)) -> bool {
        self.contacts.update(f)
    }

    /// Applies `f` to the contact with `jid`, creating it first if needed.
    pub fn upsert_contact(&self, jid: &BareJid, f: impl FnOnce(&mut Contact)) -> bool {
        self.contacts.update(|contacts| {
            let contact = contacts
                .entry(jid.clone())
                .or_insert_with(|| self.new_contact(jid));
            f(contact)
        })
    }

    /// Creates the contact `jid`. Messages exchanged with `jid` before it was added to the roster
    /// move over to the contact.
    pub fn new_contact(&self, jid: &BareJid) -> Contact {
        let mut messages = None;
        self.conversations.update(|conversations| messages = conversations.remove(jid));

        Contact {
            messages: messages.unwrap_or_default(),
            ..Contact::new(jid.clone())
        }
    }

    /// Keeps the messages of a contact that was removed from the roster.
    pub fn release_contact(&self, contact: Contact) {
        if contact.messages.is_empty() {
            return;
        }
        self.conversations.update(|conversations| {
            conversations.insert(contact.jid, contact.messages);
        });
    }

    pub fn conversations(&self) -> Conversations {
        self.conversations.value()
    }

    pub fn conversations_stream(&self) -> ReplayStream<Conversations> {
        self.conversations.subscribe()
    }

    /// Messages exchanged with `jid`, whether it is a contact or not.
    pub fn messages_with(&self, jid: &BareJid) -> Option<MessageStore> {
        self.contact(jid)
            .map(|contact| contact.messages)
            .or_else(|| self.conversations.value().get(jid).cloned())
    }

    /// Applies `f` to the contact with `jid` if it exists.
    pub fn update_contact(&self, jid: &BareJid, f: impl FnOnce(&mut Contact)) -> bool {
        self.contacts.update(|contacts| {
            if let Some(contact) = contacts.get_mut(jid) {
                f(contact)
            }
        })
    }

    pub fn rooms(&self) -> Rooms {
        self.rooms.value()
    }

    pub fn room(&self, jid: &BareJid) -> Option<Room> {
        self.rooms.value().get(jid).cloned()
    }

    pub fn rooms_stream(&self) -> ReplayStream<Rooms> {
        self.rooms.subscribe()
    }

    pub fn update_rooms(&self, f: impl FnOnce(&mut Rooms)) -> bool {
        self.rooms.update(f)
    }

    pub fn update_room(&self, jid: &BareJid, f: impl FnOnce(&mut Room)) -> bool {
        self.rooms.update(|rooms| {
            if let Some(room) = rooms.get_mut(jid) {
                f(room)
            }
        })
    }

    /// Stores a 1:1 message on the contact `with` or, if `with` is not on the roster, on the
    /// conversation with `with`. Returns false if it was a duplicate.
    pub fn add_contact_message(&self, with: &BareJid, message: ChatMessage) -> bool {
        let mut inserted = None;
        self.contacts.update(|contacts| {
            if let Some(contact) = contacts.get_mut(with) {
                inserted = Some(contact.messages.insert(message.clone()));
            }
        });
        if let Some(inserted) = inserted {
            return inserted;
        }

        let mut inserted = false;
        self.conversations.update(|conversations| {
            inserted = conversations
                .entry(with.clone())
                .or_default()
                .insert(message)
        });
        inserted
    }

    /// Stores a groupchat message on the room `room`. Messages for rooms we're not in are dropped.
    pub fn add_room_message(&self, room: &BareJid, message: ChatMessage) -> bool {
        let mut inserted = false;
        self.update_room(room, |room| inserted = room.messages.insert(message));
        inserted
    }

    pub fn clear(&self) {
        self.contacts.next(Default::default());
        self.rooms.next(Default::default());
        self.conversations.next(Default::default());
    }
}
