// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use jid::{BareJid, Jid};
use minidom::Element;
use serde::{Deserialize, Serialize};

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0045 §17.1 status codes.
pub mod status {
    pub const SELF_PRESENCE: u16 = 110;
    pub const ROOM_CREATED: u16 = 201;
    pub const BANNED: u16 = 301;
    pub const NEW_NICK: u16 = 303;
    pub const KICKED: u16 = 307;
    pub const REMOVED_AFFILIATION_CHANGE: u16 = 321;
    pub const REMOVED_MEMBERS_ONLY: u16 = 322;
    pub const REMOVED_SHUTDOWN: u16 = 332;
    pub const REMOVED_ERROR: u16 = 333;
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Affiliation {
    Owner,
    Admin,
    Member,
    Outcast,
    None,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Moderator,
    Participant,
    Visitor,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub nick: Option<String>,
    pub jid: Option<Jid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MucItem {
    pub affiliation: Affiliation,
    pub role: Role,
    pub jid: Option<Jid>,
    pub nick: Option<String>,
    pub actor: Option<Actor>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Destroy {
    pub jid: Option<BareJid>,
    pub reason: Option<String>,
}

/// The `<x xmlns='http://jabber.org/protocol/muc#user'/>` payload of room presences.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MucUser {
    pub status_codes: Vec<u16>,
    pub items: Vec<MucItem>,
    pub destroy: Option<Destroy>,
}

impl MucUser {
    pub fn from_stanza(stanza: &Element) -> Result<Option<Self>, ParseError> {
        stanza
            .get_child("x", ns::MUC_USER)
            .map(MucUser::try_from)
            .transpose()
    }

    pub fn has_status(&self, code: u16) -> bool {
        self.status_codes.contains(&code)
    }

    pub fn item(&self) -> Option<&MucItem> {
        self.items.first()
    }
}

impl TryFrom<&Element> for MucUser {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("x", ns::MUC_USER)?;

        let mut user = MucUser::default();

        for child in root.children() {
            match child.name() {
                "status" => user.status_codes.push(child.attr_req("code")?.parse()?),
                "item" => user.items.push(MucItem::try_from(child)?),
                "destroy" => {
                    user.destroy = Some(Destroy {
                        jid: child.attr("jid").map(BareJid::from_str).transpose()?,
                        reason: child.child_text("reason", ns::MUC_USER),
                    })
                }
                _ => (),
            }
        }

        Ok(user)
    }
}

impl TryFrom<&Element> for MucItem {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        let affiliation = root
            .attr("affiliation")
            .map(|a| {
                Affiliation::from_str(a).map_err(|_| ParseError::Generic {
                    msg: format!("Invalid affiliation '{}'", a),
                })
            })
            .transpose()?
            .unwrap_or(Affiliation::None);

        let role = root
            .attr("role")
            .map(|r| {
                Role::from_str(r).map_err(|_| ParseError::Generic {
                    msg: format!("Invalid role '{}'", r),
                })
            })
            .transpose()?
            .unwrap_or(Role::None);

        let actor = root
            .children()
            .find(|child| child.name() == "actor")
            .map(|actor| -> Result<Actor, ParseError> {
                Ok(Actor {
                    nick: actor.attr("nick").map(ToString::to_string),
                    jid: actor.attr_jid("jid")?,
                })
            })
            .transpose()?;

        Ok(MucItem {
            affiliation,
            role,
            jid: root.attr_jid("jid")?,
            nick: root.attr("nick").map(ToString::to_string),
            actor,
            reason: root
                .children()
                .find(|child| child.name() == "reason")
                .and_then(|reason| reason.non_empty_text()),
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parses_kick_presence() -> Result<()> {
        let presence = Element::from_str(
            r#"<presence xmlns="jabber:client" from="room@conf.prose.org/pistol" type="unavailable">
                <x xmlns="http://jabber.org/protocol/muc#user">
                    <item affiliation="none" role="none">
                        <actor nick="Fluellen"/>
                        <reason>Avaunt, you cullion!</reason>
                    </item>
                    <status code="307"/>
                </x>
            </presence>"#,
        )?;

        let user = MucUser::from_stanza(&presence)?.expect("missing muc#user payload");
        assert!(user.has_status(status::KICKED));
        assert_eq!(
            user.item(),
            Some(&MucItem {
                affiliation: Affiliation::None,
                role: Role::None,
                jid: None,
                nick: None,
                actor: Some(Actor {
                    nick: Some("Fluellen".to_string()),
                    jid: None
                }),
                reason: Some("Avaunt, you cullion!".to_string()),
            })
        );
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_affiliation() -> Result<()> {
        let x = Element::from_str(
            r#"<x xmlns="http://jabber.org/protocol/muc#user"><item affiliation="king" role="none"/></x>"#,
        )?;
        assert!(MucUser::try_from(&x).is_err());
        Ok(())
    }
}
