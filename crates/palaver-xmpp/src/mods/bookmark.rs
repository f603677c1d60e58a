// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use minidom::Element;
use tracing::warn;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::mods::pubsub::find_payload;
use crate::mods::{Module, PubSub};
use crate::ns;
use crate::stanza::bookmark::{build_storage, parse_storage};
use crate::stanza::{ConferenceBookmark, PubSubEvent, PubSubItem, PublishOptions};

/// XEP-0048: Bookmarks
/// https://xmpp.org/extensions/xep-0048.html
///
/// The whole `<storage/>` is kept in a single PEP item.
#[derive(Default, Clone)]
pub struct Bookmark {
    ctx: ModuleContext,
    pubsub: PubSub,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BookmarksChanged { bookmarks: Vec<ConferenceBookmark> },
}

impl Module for Bookmark {
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

impl Bookmark {
    pub async fn load_bookmarks(&self) -> Result<Vec<ConferenceBookmark>> {
        let items = self
            .pubsub
            .retrieve_items(None, ns::BOOKMARKS, None)
            .await?;

        let Some(storage) = find_payload(&items, "storage", ns::BOOKMARKS) else {
            return Ok(vec![]);
        };
        Ok(parse_storage(storage)?)
    }

    /// Replaces the stored bookmarks with `bookmarks`.
    pub async fn publish_bookmarks(
        &self,
        bookmarks: impl IntoIterator<Item = ConferenceBookmark>,
    ) -> Result<()> {
        self.pubsub
            .publish(
                None,
                ns::BOOKMARKS,
                [PubSubItem::new(
                    Some("current".to_string()),
                    build_storage(bookmarks),
                )],
                Some(PublishOptions::private()),
            )
            .await?;
        Ok(())
    }
}

impl Bookmark {
    fn handle_pubsub_message(&self, message: &Element) -> Result<()> {
        if !self.ctx.is_from_own_account(message) {
            return Ok(());
        }

        for event in PubSubEvent::from_message(message)? {
            if event.node != ns::BOOKMARKS {
                continue;
            }
            let Some(storage) = find_payload(&event.published, "storage", ns::BOOKMARKS) else {
                continue;
            };

            match parse_storage(storage) {
                Ok(bookmarks) => self
                    .ctx
                    .schedule_event(ClientEvent::Bookmark(Event::BookmarksChanged { bookmarks })),
                Err(err) => warn!("Ignoring invalid bookmark storage. {}", err),
            }
        }
        Ok(())
    }
}
