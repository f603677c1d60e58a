// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use jid::BareJid;
use minidom::Element;

use crate::models::Subscription;
use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// A `<item/>` of a `jabber:iq:roster` query.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterItem {
    pub jid: BareJid,
    pub name: Option<String>,
    pub subscription: ItemSubscription,
    /// `ask='subscribe'`, i.e. our subscription request is pending.
    pub ask: bool,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSubscription {
    State(Subscription),
    Remove,
}

impl RosterItem {
    pub fn new(jid: BareJid) -> Self {
        RosterItem {
            jid,
            name: None,
            subscription: ItemSubscription::State(Subscription::None),
            ask: false,
            groups: vec![],
        }
    }

    pub fn removal(jid: BareJid) -> Self {
        RosterItem {
            subscription: ItemSubscription::Remove,
            ..Self::new(jid)
        }
    }

    /// Parses the items of a roster query result or push.
    pub fn parse_query(query: &Element) -> Result<Vec<RosterItem>, ParseError> {
        query.expect_is("query", ns::ROSTER)?;

        query
            .children()
            .filter(|child| child.is("item", ns::ROSTER))
            .map(RosterItem::try_from)
            .collect()
    }

    pub fn query(items: impl IntoIterator<Item = RosterItem>) -> Element {
        StanzaBuilder::new("query", ns::ROSTER)
            .cnodes(items.into_iter().map(Element::from))
            .build()
    }
}

impl TryFrom<&Element> for RosterItem {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        let subscription = match root.attr("subscription") {
            None => ItemSubscription::State(Subscription::None),
            Some("remove") => ItemSubscription::Remove,
            Some(value) => ItemSubscription::State(Subscription::from_str(value).map_err(
                |_| ParseError::Generic {
                    msg: format!("Invalid subscription '{}'", value),
                },
            )?),
        };

        Ok(RosterItem {
            jid: root.attr_req("jid")?.parse()?,
            name: root
                .attr("name")
                .filter(|name| !name.is_empty())
                .map(ToString::to_string),
            subscription,
            ask: root.attr("ask") == Some("subscribe"),
            groups: root
                .children()
                .filter(|child| child.name() == "group")
                .filter_map(|group| group.non_empty_text())
                .collect(),
        })
    }
}

impl From<RosterItem> for Element {
    fn from(value: RosterItem) -> Self {
        let subscription = match value.subscription {
            ItemSubscription::Remove => Some("remove"),
            ItemSubscription::State(_) => None,
        };

        StanzaBuilder::new("item", ns::ROSTER)
            .attr("jid", value.jid.to_string())
            .attr("name", value.name)
            .attr("subscription", subscription)
            .cnodes(value.groups.into_iter().map(|group| {
                StanzaBuilder::new("group", ns::ROSTER).t(group).build()
            }))
            .build()
    }
}
