// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::Result;
use jid::BareJid;
use minidom::Element;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::mods::{Module, PubSub};
use crate::ns;
use crate::stanza::{Conference, ConferenceBookmark, PubSubEvent, PubSubItem, PublishOptions};
use crate::util::ParseError;

/// XEP-0402: PEP Native Bookmarks
/// https://xmpp.org/extensions/xep-0402.html
#[derive(Default, Clone)]
pub struct Bookmark2 {
    ctx: ModuleContext,
    pubsub: PubSub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BookmarksPublished { bookmarks: Vec<ConferenceBookmark> },
    BookmarksRetracted { jids: Vec<BareJid> },
}

impl Module for Bookmark2 {
    fn register_with(&mut self, context: ModuleContext) {
        self.pubsub.register_with(context.clone());
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").ns(ns::PUBSUB_EVENT),
            |bookmark, message| bookmark.handle_pubsub_message(message),
        );
    }
}

impl Bookmark2 {
    pub async fn load_bookmarks(&self) -> Result<Vec<ConferenceBookmark>> {
        let items = self
            .pubsub
            .retrieve_items(None, ns::BOOKMARKS2, None)
            .await?;

        Ok(items
            .iter()
            .map(bookmark_from_item)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Saves or updates the bookmark of `room`. Updating means republishing under the same id.
    pub async fn publish_bookmark(&self, room: &BareJid, conference: Conference) -> Result<()> {
        self.pubsub
            .publish(
                None,
                ns::BOOKMARKS2,
                [PubSubItem::new(Some(room.to_string()), conference.into())],
                Some(PublishOptions::private().with_max_items("max")),
            )
            .await?;
        Ok(())
    }

    pub async fn retract_bookmark(&self, room: &BareJid) -> Result<()> {
        self.pubsub
            .retract(None, ns::BOOKMARKS2, [room.to_string()])
            .await?;
        Ok(())
    }
}

impl Bookmark2 {
    fn handle_pubsub_message(&self, message: &Element) -> Result<()> {
        if !self.ctx.is_from_own_account(message) {
            return Ok(());
        }

        for event in PubSubEvent::from_message(message)? {
            if event.node != ns::BOOKMARKS2 {
                continue;
            }

            if !event.published.is_empty() {
                let bookmarks = event
                    .published
                    .iter()
                    .map(bookmark_from_item)
                    .collect::<Result<Vec<_>, _>>()?;
                self.ctx
                    .schedule_event(ClientEvent::Bookmark2(Event::BookmarksPublished {
                        bookmarks,
                    }));
            }

            if !event.retracted.is_empty() {
                let jids = event
                    .retracted
                    .iter()
                    .map(|id| BareJid::from_str(id))
                    .collect::<Result<Vec<_>, _>>()?;
                self.ctx
                    .schedule_event(ClientEvent::Bookmark2(Event::BookmarksRetracted { jids }));
            }
        }
        Ok(())
    }
}

fn bookmark_from_item(item: &PubSubItem) -> Result<ConferenceBookmark, ParseError> {
    let jid = item
        .id
        .as_deref()
        .ok_or(ParseError::Generic {
            msg: "Bookmark item is missing its id".to_string(),
        })
        .and_then(|id| Ok(BareJid::from_str(id)?))?;

    let conference = item
        .payload
        .as_ref()
        .map(Conference::try_from)
        .transpose()?
        .unwrap_or_default();

    Ok(ConferenceBookmark {
        jid,
        name: conference.name,
        autojoin: conference.autojoin,
        nick: conference.nick,
        password: conference.password,
    })
}
