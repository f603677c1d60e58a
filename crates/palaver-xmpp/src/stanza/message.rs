// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use chrono::{DateTime, Utc};
use jid::BareJid;
use minidom::Element;

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0203 delayed delivery information.
#[derive(Debug, Clone, PartialEq)]
pub struct Delay {
    pub stamp: DateTime<Utc>,
    pub from: Option<String>,
}

impl Delay {
    pub fn from_parent(parent: &Element) -> Result<Option<Self>, ParseError> {
        parent
            .get_child("delay", ns::DELAY)
            .map(Delay::try_from)
            .transpose()
    }
}

impl TryFrom<&Element> for Delay {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("delay", ns::DELAY)?;
        Ok(Delay {
            stamp: DateTime::parse_from_rfc3339(root.attr_req("stamp")?)?.with_timezone(&Utc),
            from: root.attr("from").map(ToString::to_string),
        })
    }
}

/// XEP-0297 `<forwarded/>` wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct Forwarded {
    pub delay: Option<Delay>,
    pub stanza: Element,
}

impl TryFrom<&Element> for Forwarded {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("forwarded", ns::FORWARD)?;

        let stanza = root
            .children()
            .find(|child| matches!(child.name(), "message" | "presence" | "iq"))
            .cloned()
            .ok_or(ParseError::Generic {
                msg: "Missing forwarded stanza".to_string(),
            })?;

        Ok(Forwarded {
            delay: Delay::from_parent(root)?,
            stanza,
        })
    }
}

/// The id the sender gave the message: its `origin-id`, then the plain `id` attribute.
pub fn origin_id(message: &Element) -> Option<String> {
    message
        .get_child("origin-id", ns::SID)
        .and_then(|oid| oid.attr("id"))
        .or_else(|| message.attr("id"))
        .map(ToString::to_string)
}

/// The XEP-0359 `stanza-id` assigned by `by`, which is our own account for 1:1 messages and the
/// room for groupchat messages. Ids stamped by anybody else are ignored.
pub fn stanza_id(message: &Element, by: &BareJid) -> Option<String> {
    message
        .children()
        .filter(|child| child.is("stanza-id", ns::SID))
        .find(|sid| {
            sid.attr("by")
                .and_then(|by| BareJid::from_str(by).ok())
                .as_ref()
                == Some(by)
        })
        .and_then(|sid| sid.attr("id"))
        .map(ToString::to_string)
}
