// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::sync::Arc;

use anyhow::Result;
use jid::{BareJid, Jid};
use minidom::Element;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::ModuleContext;
use crate::handler::Matcher;
use crate::models::{ChatMessage, MessageKind};
use crate::mods::Module;
use crate::ns;
use crate::stanza::mam::{ArchivedMessage, Fin, MamQuery};
use crate::stanza::{PubSubEvent, ResultSet, StanzaBuilder};

/// Number of messages fetched on initial sync.
const INITIAL_PAGE_SIZE: usize = 250;
/// Number of messages fetched per backfill request.
const BACKFILL_PAGE_SIZE: usize = 100;

/// XEP-0313: Message Archive Management
#[derive(Default, Clone)]
pub struct MAM {
    ctx: ModuleContext,
}

/// The result of a single archive query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MamPage {
    /// Messages that weren't stored before this query.
    pub messages: Vec<ChatMessage>,
    pub complete: bool,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl Module for MAM {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl MAM {
    /// Fetches the newest messages of our own archive.
    pub async fn load_initial(&self) -> Result<MamPage> {
        self.query(
            None,
            MamQuery::default().with_rsm(ResultSet::last_page(INITIAL_PAGE_SIZE)),
        )
        .await
    }

    /// Fetches the messages exchanged with `contact` after the newest one the archive assigned an
    /// id to. Without such a message the newest page is fetched.
    pub async fn backfill_contact(&self, contact: &BareJid) -> Result<MamPage> {
        let after = self
            .ctx
            .store()
            .messages_with(contact)
            .and_then(|messages| messages.archive_cursor().map(ToString::to_string));

        self.query(
            None,
            MamQuery {
                with: Some(Jid::from(contact.clone())),
                ..Default::default()
            }
            .with_rsm(ResultSet::after(BACKFILL_PAGE_SIZE, after)),
        )
        .await
    }

    /// Fetches the messages of `room` after the newest one the room's archive assigned an id to.
    pub async fn backfill_room(&self, room: &BareJid) -> Result<MamPage> {
        let after = self
            .ctx
            .store()
            .room(room)
            .and_then(|room| room.messages.archive_cursor().map(ToString::to_string));

        self.query(
            Some(room),
            MamQuery::default().with_rsm(ResultSet::after(BACKFILL_PAGE_SIZE, after)),
        )
        .await
    }

    /// Pages backward through the archive, newest page first, until the server reports it
    /// complete. `archive` selects a room's archive instead of ours. The returned messages are in
    /// chronological order.
    pub async fn load_full_history(
        &self,
        archive: Option<&BareJid>,
        with: Option<&BareJid>,
    ) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = vec![];
        // An empty `<before/>` requests the newest page.
        let mut cursor = String::new();

        loop {
            let page = self
                .query(
                    archive,
                    MamQuery {
                        with: with.cloned().map(Jid::from),
                        ..Default::default()
                    }
                    .with_rsm(ResultSet::before(BACKFILL_PAGE_SIZE, cursor.clone())),
                )
                .await?;

            messages = page.messages.into_iter().chain(messages).collect();

            match page.first {
                Some(first) if !page.complete && first != cursor => cursor = first,
                _ => break,
            }
        }

        Ok(messages)
    }

    /// Runs `query` against our own archive or, if `archive` is set, against a room's archive.
    /// Routes the results into the session store.
    pub async fn query(&self, archive: Option<&BareJid>, query: MamQuery) -> Result<MamPage> {
        let query_id = self.ctx.generate_id();
        let collected = Arc::new(Mutex::new(Vec::<ArchivedMessage>::new()));

        let collector = {
            let collected = collected.clone();
            let query_id = query_id.clone();
            self.ctx
                .add_collector(Matcher::new().name("message").ns(ns::MAM), move |message| {
                    match ArchivedMessage::from_message(message) {
                        Ok(Some(archived))
                            if archived.query_id.as_deref() == Some(query_id.as_str()) =>
                        {
                            collected.lock().push(archived)
                        }
                        Ok(_) => (),
                        Err(err) => warn!("Failed to parse archived message. {}", err),
                    }
                    Ok(true)
                })
        };

        let mut iq = StanzaBuilder::iq("set").attr("id", self.ctx.generate_id());
        if let Some(archive) = archive {
            iq = iq.attr("to", archive.to_string());
        }

        let response = self
            .ctx
            .send_iq_expecting_payload(iq.cnode(query.into_element(query_id)))
            .await;
        self.ctx.remove_handler(&collector);

        let fin = Fin::try_from(&response?)?;
        let archived = std::mem::take(&mut *collected.lock());

        debug!(
            "Archive query returned {} messages (complete: {})",
            archived.len(),
            fin.complete
        );

        let messages = archived
            .into_iter()
            .filter_map(|archived| match self.route(archived) {
                Ok(message) => message,
                Err(err) => {
                    warn!("Skipping archived message. {:?}", err);
                    None
                }
            })
            .collect();

        Ok(MamPage {
            messages,
            complete: fin.complete,
            first: fin.set.first,
            last: fin.set.last,
        })
    }
}

impl MAM {
    /// Stores `archived` on its contact or room. Returns the message if it wasn't known yet.
    fn route(&self, archived: ArchivedMessage) -> Result<Option<ChatMessage>> {
        let stanza = unwrap_mucsub(&archived.forwarded.stanza).unwrap_or(archived.forwarded.stanza);

        let Some(mut message) = ChatMessage::from_stanza(&stanza, self.ctx.now())? else {
            return Ok(None);
        };

        message.stanza_id = Some(archived.id);
        message.from_archive = true;
        message.delayed = true;
        if let Some(delay) = archived.forwarded.delay {
            message.timestamp = delay.stamp;
        }

        let inserted = match message.kind {
            MessageKind::Groupchat => {
                let room = message.from.to_bare();
                let own_nick = self.ctx.store().room(&room).map(|room| room.nick);
                message.outgoing = message
                    .from
                    .resource()
                    .map(|nick| Some(nick.as_str()) == own_nick.as_deref())
                    .unwrap_or(false);
                self.ctx.store().add_room_message(&room, message.clone())
            }
            _ => {
                let own_jid = self.ctx.bare_jid()?;
                message.outgoing = message.from.to_bare() == own_jid;

                let counterpart = if message.outgoing {
                    match &message.to {
                        Some(to) => to.to_bare(),
                        None => return Ok(None),
                    }
                } else {
                    message.from.to_bare()
                };
                self.ctx
                    .store()
                    .add_contact_message(&counterpart, message.clone())
            }
        };

        Ok(inserted.then_some(message))
    }
}

/// Room archives of MUC/Sub rooms may contain messages wrapped in pubsub events.
fn unwrap_mucsub(stanza: &Element) -> Option<Element> {
    PubSubEvent::from_message(stanza)
        .ok()?
        .into_iter()
        .filter(|event| event.node == ns::MUCSUB_NODES_MESSAGES)
        .flat_map(|event| event.published)
        .find_map(|item| item.payload.filter(|payload| payload.name() == "message"))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_unwraps_mucsub_message() -> Result<()> {
        let stanza = Element::from_str(
            r#"<message xmlns="jabber:client" from="room@conference.prose.org"><event xmlns="http://jabber.org/protocol/pubsub#event"><items node="urn:xmpp:mucsub:nodes:messages"><item id="1"><message xmlns="jabber:client" from="room@conference.prose.org/nick" type="groupchat" id="m1"><body>Hi</body></message></item></items></event></message>"#,
        )?;

        let message = unwrap_mucsub(&stanza).expect("missing wrapped message");
        assert_eq!(message.attr("type"), Some("groupchat"));
        assert_eq!(message.attr("id"), Some("m1"));

        let plain = Element::from_str(
            r#"<message xmlns="jabber:client" from="friend@prose.org" type="chat"><body>Hi</body></message>"#,
        )?;
        assert_eq!(unwrap_mucsub(&plain), None);
        Ok(())
    }
}
