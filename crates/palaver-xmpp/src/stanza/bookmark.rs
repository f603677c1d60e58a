// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;
use minidom::Element;

use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// A room bookmark inside a XEP-0048 `<storage/>`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConferenceBookmark {
    pub jid: BareJid,
    pub name: Option<String>,
    pub autojoin: bool,
    pub nick: Option<String>,
    pub password: Option<String>,
}

/// XEP-0402 `<conference/>`. The room's JID is the id of the pubsub item carrying it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Conference {
    pub name: Option<String>,
    pub autojoin: bool,
    pub nick: Option<String>,
    pub password: Option<String>,
    pub extensions: Option<Element>,
}

/// Parses a XEP-0048 `<storage/>`.
pub fn parse_storage(storage: &Element) -> Result<Vec<ConferenceBookmark>, ParseError> {
    storage.expect_is("storage", ns::BOOKMARKS)?;

    storage
        .children()
        .filter(|child| child.is("conference", ns::BOOKMARKS))
        .map(|conference| -> Result<ConferenceBookmark, ParseError> {
            Ok(ConferenceBookmark {
                jid: conference.attr_req("jid")?.parse()?,
                name: conference.attr("name").map(ToString::to_string),
                autojoin: conference.attr_bool("autojoin")?.unwrap_or(false),
                nick: conference.child_text("nick", ns::BOOKMARKS),
                password: conference.child_text("password", ns::BOOKMARKS),
            })
        })
        .collect()
}

pub fn build_storage(bookmarks: impl IntoIterator<Item = ConferenceBookmark>) -> Element {
    let mut builder = StanzaBuilder::new("storage", ns::BOOKMARKS);

    for bookmark in bookmarks {
        builder = builder
            .c("conference")
            .attr("jid", bookmark.jid.to_string())
            .attr("name", bookmark.name)
            .attr("autojoin", if bookmark.autojoin { "true" } else { "false" });
        if let Some(nick) = bookmark.nick {
            builder = builder.text_child("nick", nick);
        }
        if let Some(password) = bookmark.password {
            builder = builder.text_child("password", password);
        }
        builder = builder.up();
    }

    builder.build()
}

impl TryFrom<&Element> for Conference {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("conference", ns::BOOKMARKS2)?;

        Ok(Conference {
            name: root.attr("name").map(ToString::to_string),
            autojoin: root.attr_bool("autojoin")?.unwrap_or(false),
            nick: root.child_text("nick", ns::BOOKMARKS2),
            password: root.child_text("password", ns::BOOKMARKS2),
            extensions: root.get_child("extensions", ns::BOOKMARKS2).cloned(),
        })
    }
}

impl From<Conference> for Element {
    fn from(value: Conference) -> Self {
        let mut builder = StanzaBuilder::new("conference", ns::BOOKMARKS2)
            .attr("name", value.name)
            .attr("autojoin", if value.autojoin { "true" } else { "false" });

        if let Some(nick) = value.nick {
            builder = builder.text_child("nick", nick);
        }
        if let Some(password) = value.password {
            builder = builder.text_child("password", password);
        }
        if let Some(extensions) = value.extensions {
            builder = builder.cnode(extensions);
        }

        builder.build()
    }
}
