// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::{BareJid, Jid};
use minidom::Element;

use crate::ns;
use crate::util::{ElementExt, ParseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationKind {
    Invite,
    Decline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub kind: InvitationKind,
    pub room: BareJid,
    /// Who sent the invite, or who declined ours.
    pub from: Jid,
    pub reason: Option<String>,
    pub password: Option<String>,
}

impl Invitation {
    /// Parses a mediated (XEP-0045 §7.8.2) or direct (XEP-0249) invitation or a decline.
    /// Returns `None` for messages carrying neither.
    pub fn from_message(message: &Element) -> Result<Option<Self>, ParseError> {
        if let Some(x) = message.get_child("x", ns::CONFERENCE) {
            let room = x.attr_req("jid")?.parse::<BareJid>()?;
            let from = message.attr_jid("from")?.ok_or(ParseError::Generic {
                msg: "Invitation is missing a sender".to_string(),
            })?;

            return Ok(Some(Invitation {
                kind: InvitationKind::Invite,
                room,
                from,
                reason: x.attr("reason").map(ToString::to_string),
                password: x.attr("password").map(ToString::to_string),
            }));
        }

        let Some(x) = message.get_child("x", ns::MUC_USER) else {
            return Ok(None);
        };

        let kind_and_elem = x
            .get_child("invite", ns::MUC_USER)
            .map(|invite| (InvitationKind::Invite, invite))
            .or_else(|| {
                x.get_child("decline", ns::MUC_USER)
                    .map(|decline| (InvitationKind::Decline, decline))
            });

        let Some((kind, elem)) = kind_and_elem else {
            return Ok(None);
        };

        let room = message
            .from_bare()
            .ok_or(ParseError::Generic {
                msg: "Invitation is missing the room".to_string(),
            })?;

        let from = elem.attr_jid("from")?.ok_or(ParseError::Generic {
            msg: "Invitation is missing the inviter".to_string(),
        })?;

        Ok(Some(Invitation {
            kind,
            room,
            from,
            reason: elem.child_text("reason", ns::MUC_USER),
            password: x.child_text("password", ns::MUC_USER),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parses_mediated_invitation() -> Result<()> {
        let message = Element::from_str(
            r#"<message xmlns="jabber:client" from="room@conference.prose.org" to="test@prose.org"><x xmlns="http://jabber.org/protocol/muc#user"><invite from="friend@prose.org/phone"><reason>Join us</reason></invite><password>secret</password></x></message>"#,
        )?;

        assert_eq!(
            Invitation::from_message(&message)?,
            Some(Invitation {
                kind: InvitationKind::Invite,
                room: BareJid::from_str("room@conference.prose.org")?,
                from: Jid::from_str("friend@prose.org/phone")?,
                reason: Some("Join us".to_string()),
                password: Some("secret".to_string()),
            })
        );
        Ok(())
    }

    #[test]
    fn test_parses_direct_invitation() -> Result<()> {
        let message = Element::from_str(
            r#"<message xmlns="jabber:client" from="friend@prose.org/phone" to="test@prose.org"><x xmlns="jabber:x:conference" jid="room@conference.prose.org" reason="Hey"/></message>"#,
        )?;

        let invitation = Invitation::from_message(&message)?.unwrap();
        assert_eq!(invitation.kind, InvitationKind::Invite);
        assert_eq!(invitation.room, BareJid::from_str("room@conference.prose.org")?);
        assert_eq!(invitation.reason.as_deref(), Some("Hey"));
        Ok(())
    }

    #[test]
    fn test_parses_decline() -> Result<()> {
        let message = Element::from_str(
            r#"<message xmlns="jabber:client" from="room@conference.prose.org" to="test@prose.org"><x xmlns="http://jabber.org/protocol/muc#user"><decline from="friend@prose.org"/></x></message>"#,
        )?;

        let invitation = Invitation::from_message(&message)?.unwrap();
        assert_eq!(invitation.kind, InvitationKind::Decline);
        assert_eq!(invitation.from, Jid::from_str("friend@prose.org")?);
        Ok(())
    }
}
