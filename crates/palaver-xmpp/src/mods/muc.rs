// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use tracing::{debug, info, warn};

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::models::{ChatMessage, Invitation, InvitationKind, Room, RoomOccupant};
use crate::mods::{Disco, Module};
use crate::ns;
use crate::stanza::muc::{status, Affiliation, MucItem, MucUser, Role};
use crate::stanza::{DataForm, DiscoItem, PubSubEvent, StanzaBuilder};
use crate::util::{ElementExt, ParseError};

/// XEP-0045: Multi-User Chat
/// https://xmpp.org/extensions/xep-0045.html
///
/// Joined rooms and their occupants live in the session store. Also covers XEP-0249 direct
/// invitations and ejabberd's MUC/Sub.
#[derive(Default, Clone)]
pub struct MUC {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// We just created `room`. Sent instead of `OccupantJoined` for our own occupant.
    RoomCreated { room: BareJid },
    OccupantJoined {
        room: BareJid,
        occupant: RoomOccupant,
    },
    /// Affiliation or role of an occupant changed.
    OccupantModified {
        room: BareJid,
        occupant: RoomOccupant,
    },
    OccupantLeft {
        room: BareJid,
        nick: String,
        reason: ExitReason,
    },
    NickChanged {
        room: BareJid,
        old_nick: String,
        new_nick: String,
    },
    /// We are no longer in `room`.
    RoomLeft { room: BareJid, reason: ExitReason },
    SubjectChanged {
        room: BareJid,
        subject: Option<String>,
    },
    MessageReceived {
        room: BareJid,
        message: ChatMessage,
    },
    InvitationReceived(Invitation),
    InvitationDeclined(Invitation),
}

/// Why an occupant is gone, decoded from the status codes of its unavailable presence.
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    Left,
    Banned {
        actor: String,
        reason: String,
    },
    Kicked {
        actor: String,
        reason: String,
    },
    AffiliationChanged,
    MembersOnly,
    /// The service shut down or hit an error.
    ConnectionError,
    RoomDestroyed {
        reason: Option<String>,
        alternate: Option<BareJid>,
    },
}

/// The options `create_room` applies to a fresh room.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomConfig {
    pub name: Option<String>,
    /// Everybody may see the occupants' real JIDs.
    pub non_anonymous: bool,
    pub public: bool,
    pub members_only: bool,
    pub persistent: bool,
    pub allow_subscription: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublicRoom {
    pub jid: BareJid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub subject: Option<String>,
    pub occupant_count: Option<u32>,
    pub features: Vec<String>,
}

/// A room we receive MUC/Sub events from.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSubscription {
    pub room: BareJid,
    pub nodes: Vec<String>,
}

impl RoomConfig {
    /// A private, members-only room with visible JIDs.
    pub fn group(name: impl Into<String>) -> Self {
        RoomConfig {
            name: Some(name.into()),
            non_anonymous: true,
            public: false,
            members_only: true,
            persistent: true,
            allow_subscription: true,
        }
    }

    pub fn public_channel(name: impl Into<String>) -> Self {
        RoomConfig {
            name: Some(name.into()),
            non_anonymous: false,
            public: true,
            members_only: false,
            persistent: true,
            allow_subscription: true,
        }
    }

    pub fn private_channel(name: impl Into<String>) -> Self {
        RoomConfig {
            public: false,
            members_only: true,
            ..Self::public_channel(name)
        }
    }

    /// Fills in the owner configuration form. Fails if `form` isn't a room configuration form.
    pub fn apply(&self, form: &mut DataForm) -> Result<(), ParseError> {
        if form.form_type() != Some(ns::MUC_ROOMCONFIG) {
            return Err(ParseError::Generic {
                msg: format!(
                    "Expected room configuration form but got {:?}",
                    form.form_type()
                ),
            });
        }

        if let Some(name) = &self.name {
            form.set_field_value("text-single", "muc#roomconfig_roomname", name.clone())?;
        }
        form.set_field_value(
            "list-single",
            "muc#roomconfig_whois",
            if self.non_anonymous {
                "anyone"
            } else {
                "moderators"
            },
        )?;
        form.set_bool("muc#roomconfig_publicroom", self.public)?;
        form.set_bool("muc#roomconfig_membersonly", self.members_only)?;
        form.set_bool("muc#roomconfig_persistentroom", self.persistent)?;
        form.set_bool("muc#roomconfig_allow_subscription", self.allow_subscription)?;
        Ok(())
    }
}

impl Module for MUC {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("presence").ns(ns::MUC_USER),
            |muc, presence| muc.handle_presence(presence),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").type_("groupchat"),
            |muc, message| muc.handle_groupchat_message(message),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").ns(ns::PUBSUB_EVENT),
            |muc, message| muc.handle_mucsub_event(message),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").ns(ns::MUC_USER),
            |muc, message| muc.handle_invitation(message),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").ns(ns::CONFERENCE),
            |muc, message| muc.handle_invitation(message),
        );
    }
}

impl MUC {
    /// https://xmpp.org/extensions/xep-0045.html#createroom
    ///
    /// Creates and configures `room`. Fails if the room exists already and we're not its owner.
    pub async fn create_room(
        &self,
        room: &BareJid,
        nick: &str,
        config: RoomConfig,
    ) -> Result<Room> {
        let presence = self.enter_room(room, nick, None).await?;

        let affiliation = MucUser::from_stanza(&presence)?
            .as_ref()
            .and_then(MucUser::item)
            .map(|item| item.affiliation)
            .unwrap_or(Affiliation::None);

        if affiliation != Affiliation::Owner {
            self.leave_room(room, None)?;
            bail!("user is not owner");
        }

        if let Err(err) = self.configure_room(room, &config).await {
            warn!("Failed to configure room {}. {:?}", room, err);
            self.leave_room(room, None)?;
            return Err(err);
        }

        info!("Created room {}", room);
        self.ctx
            .store()
            .room(room)
            .ok_or_else(|| anyhow!("Room {} vanished while it was being created", room))
    }

    /// https://xmpp.org/extensions/xep-0045.html#enter
    pub async fn join_room(
        &self,
        room: &BareJid,
        nick: &str,
        password: Option<&str>,
    ) -> Result<Room> {
        self.enter_room(room, nick, password).await?;
        self.ctx
            .store()
            .room(room)
            .ok_or_else(|| anyhow!("Room {} vanished while it was being joined", room))
    }

    /// https://xmpp.org/extensions/xep-0045.html#exit
    pub fn leave_room(&self, room: &BareJid, status: Option<&str>) -> Result<()> {
        let Some(joined) = self.ctx.store().room(room) else {
            return Ok(());
        };

        let mut presence = StanzaBuilder::presence()
            .attr("type", "unavailable")
            .attr("to", occupant_jid(room, &joined.nick)?.to_string());
        if let Some(status) = status {
            presence = presence.text_child("status", status);
        }

        self.forget_room(room);
        self.ctx.send_stanza(presence)
    }

    /// https://xmpp.org/extensions/xep-0045.html#changenick
    pub async fn change_nickname(&self, room: &BareJid, nick: &str) -> Result<()> {
        if self.ctx.store().room(room).is_none() {
            bail!("Not in room {}", room);
        }

        self.ctx
            .send_presence_awaiting(
                StanzaBuilder::presence().attr("to", occupant_jid(room, nick)?.to_string()),
            )
            .await?;

        self.ctx
            .store()
            .update_room(room, |joined| joined.nick = nick.to_string());
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0045.html#subject-mod
    pub fn change_room_subject(&self, room: &BareJid, subject: &str) -> Result<()> {
        self.ctx.send_stanza(
            StanzaBuilder::message()
                .attr("id", self.ctx.generate_id())
                .attr("type", "groupchat")
                .attr("to", room.to_string())
                .text_child("subject", subject),
        )
    }

    /// Sends a groupchat message to `room` and returns its id. The message is stored once the room
    /// reflects it.
    pub fn send_room_message(&self, room: &BareJid, body: impl Into<String>) -> Result<String> {
        let id = self.ctx.generate_id();
        self.ctx.send_stanza(
            StanzaBuilder::message()
                .attr("id", id.clone())
                .attr("type", "groupchat")
                .attr("to", room.to_string())
                .text_child("body", body.into())
                .c_ns("origin-id", ns::SID)
                .attr("id", id.clone()),
        )?;
        Ok(id)
    }

    /// https://xmpp.org/extensions/xep-0045.html#invite-mediated
    pub fn invite_user(&self, room: &BareJid, user: &BareJid, reason: Option<&str>) -> Result<()> {
        let mut builder = StanzaBuilder::message()
            .attr("id", self.ctx.generate_id())
            .attr("to", room.to_string())
            .c_ns("x", ns::MUC_USER)
            .c("invite")
            .attr("to", user.to_string());
        if let Some(reason) = reason {
            builder = builder.text_child("reason", reason);
        }
        self.ctx.send_stanza(builder)
    }

    /// https://xmpp.org/extensions/xep-0249.html
    pub fn invite_user_direct(
        &self,
        room: &BareJid,
        user: &BareJid,
        reason: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        self.ctx.send_stanza(
            StanzaBuilder::message()
                .attr("id", self.ctx.generate_id())
                .attr("to", user.to_string())
                .c_ns("x", ns::CONFERENCE)
                .attr("jid", room.to_string())
                .attr("reason", reason)
                .attr("password", password),
        )
    }

    /// https://xmpp.org/extensions/xep-0045.html#decline
    pub fn decline_invitation(
        &self,
        room: &BareJid,
        inviter: &Jid,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut builder = StanzaBuilder::message()
            .attr("id", self.ctx.generate_id())
            .attr("to", room.to_string())
            .c_ns("x", ns::MUC_USER)
            .c("decline")
            .attr("to", inviter.to_string());
        if let Some(reason) = reason {
            builder = builder.text_child("reason", reason);
        }
        self.ctx.send_stanza(builder)
    }

    /// https://xmpp.org/extensions/xep-0045.html#destroyroom
    pub async fn destroy_room(
        &self,
        room: &BareJid,
        alternate: Option<&BareJid>,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut builder = StanzaBuilder::iq("set")
            .attr("id", self.ctx.generate_id())
            .attr("to", room.to_string())
            .c_ns("query", ns::MUC_OWNER)
            .c("destroy")
            .attr("jid", alternate.map(ToString::to_string));
        if let Some(reason) = reason {
            builder = builder.text_child("reason", reason);
        }

        self.ctx.send_iq(builder).await?;
        self.forget_room(room);
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0045.html#disco-rooms
    ///
    /// Lists the rooms of `service`, or of the server's MUC service if `service` is `None`.
    pub async fn query_all_rooms(&self, service: Option<&BareJid>) -> Result<Vec<PublicRoom>> {
        let disco = self.disco()?;

        let service = match service {
            Some(service) => Jid::from(service.clone()),
            None => disco
                .find_service("conference", "text")
                .await?
                .ok_or_else(|| anyhow!("Server doesn't offer a MUC service"))?,
        };

        let items = disco.query_items(&service, None).await?;
        Ok(items
            .into_iter()
            .map(|DiscoItem { jid, name, .. }| PublicRoom {
                jid: jid.to_bare(),
                name,
            })
            .collect())
    }

    /// https://xmpp.org/extensions/xep-0045.html#disco-roominfo
    pub async fn get_room_info(&self, room: &BareJid) -> Result<RoomInfo> {
        let info = self
            .disco()?
            .query_info(&Jid::from(room.clone()), None)
            .await?;

        let mut room_info = RoomInfo {
            name: info
                .identities
                .iter()
                .find(|identity| identity.category == "conference")
                .and_then(|identity| identity.name.clone()),
            features: info.features.clone(),
            ..Default::default()
        };

        if let Some(form) = info.form(ns::MUC_ROOMINFO) {
            room_info.description = form
                .field_value("muc#roominfo_description")
                .map(ToString::to_string);
            room_info.subject = form
                .field_value("muc#roominfo_subject")
                .map(ToString::to_string);
            room_info.occupant_count = form
                .field_value("muc#roominfo_occupants")
                .and_then(|count| count.parse().ok());
        }

        Ok(room_info)
    }

    /// https://xmpp.org/extensions/xep-0045.html#modifymember
    pub async fn query_user_list(
        &self,
        room: &BareJid,
        affiliation: Affiliation,
    ) -> Result<Vec<MucItem>> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", room.to_string())
                    .c_ns("query", ns::MUC_ADMIN)
                    .c("item")
                    .attr("affiliation", affiliation.as_ref()),
            )
            .await?;

        response.expect_is("query", ns::MUC_ADMIN)?;

        Ok(response
            .children()
            .filter(|child| child.is("item", ns::MUC_ADMIN))
            .map(MucItem::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// https://xmpp.org/extensions/xep-0045.html#modifyban
    pub async fn get_ban_list(&self, room: &BareJid) -> Result<Vec<MucItem>> {
        self.query_user_list(room, Affiliation::Outcast).await
    }

    /// https://xmpp.org/extensions/xep-0045.html#ban
    pub async fn ban_user(&self, room: &BareJid, nick: &str, reason: Option<&str>) -> Result<()> {
        let jid = self.resolve_occupant_jid(room, nick).await?;
        self.set_affiliation(room, &jid, Affiliation::Outcast, reason)
            .await
    }

    pub async fn unban_user(&self, room: &BareJid, user: &BareJid) -> Result<()> {
        self.set_affiliation(room, user, Affiliation::None, None)
            .await
    }

    /// https://xmpp.org/extensions/xep-0045.html#grantmember
    pub async fn grant_membership(&self, room: &BareJid, nick: &str) -> Result<()> {
        let jid = self.resolve_occupant_jid(room, nick).await?;
        self.set_affiliation(room, &jid, Affiliation::Member, None)
            .await
    }

    /// https://xmpp.org/extensions/xep-0045.html#revokemember
    pub async fn revoke_membership(&self, room: &BareJid, nick: &str) -> Result<()> {
        let jid = self.resolve_occupant_jid(room, nick).await?;
        self.set_affiliation(room, &jid, Affiliation::None, None)
            .await
    }

    /// https://xmpp.org/extensions/xep-0045.html#grantadmin
    pub async fn grant_admin(&self, room: &BareJid, nick: &str) -> Result<()> {
        let jid = self.resolve_occupant_jid(room, nick).await?;
        self.set_affiliation(room, &jid, Affiliation::Admin, None)
            .await
    }

    /// https://xmpp.org/extensions/xep-0045.html#revokeadmin
    pub async fn revoke_admin(&self, room: &BareJid, nick: &str) -> Result<()> {
        let jid = self.resolve_occupant_jid(room, nick).await?;
        self.set_affiliation(room, &jid, Affiliation::Member, None)
            .await
    }

    /// https://xmpp.org/extensions/xep-0045.html#kick
    pub async fn kick_from_room(
        &self,
        room: &BareJid,
        nick: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        self.set_role(room, nick, Role::None, reason).await?;
        self.ctx.store().update_room(room, |joined| {
            joined.occupants.remove(nick);
        });
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0045.html#grantmod
    pub async fn grant_moderator(&self, room: &BareJid, nick: &str) -> Result<()> {
        self.set_role(room, nick, Role::Moderator, None).await
    }

    /// https://xmpp.org/extensions/xep-0045.html#revokemod
    pub async fn revoke_moderator(&self, room: &BareJid, nick: &str) -> Result<()> {
        self.set_role(room, nick, Role::Participant, None).await
    }

    /// Subscribes to the MUC/Sub `nodes` of `room`. Returns the nodes the room accepted.
    pub async fn subscribe_room(
        &self,
        room: &BareJid,
        nick: &str,
        nodes: &[&str],
        password: Option<&str>,
    ) -> Result<Vec<String>> {
        let response = self
            .ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", room.to_string())
                    .c_ns("subscribe", ns::MUCSUB)
                    .attr("nick", nick)
                    .attr("password", password)
                    .cnodes(nodes.iter().map(|node| {
                        StanzaBuilder::new("event", ns::MUCSUB)
                            .attr("node", *node)
                            .build()
                    })),
            )
            .await?;

        Ok(response.map(|subscribe| event_nodes(&subscribe)).unwrap_or_default())
    }

    pub async fn unsubscribe_room(&self, room: &BareJid) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", room.to_string())
                    .c_ns("unsubscribe", ns::MUCSUB),
            )
            .await?;
        Ok(())
    }

    /// Lists the rooms of `service` we have MUC/Sub subscriptions for.
    pub async fn retrieve_subscriptions(&self, service: &BareJid) -> Result<Vec<RoomSubscription>> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", service.to_string())
                    .c_ns("subscriptions", ns::MUCSUB),
            )
            .await?;

        response.expect_is("subscriptions", ns::MUCSUB)?;

        Ok(response
            .children()
            .filter(|child| child.is("subscription", ns::MUCSUB))
            .map(|subscription| -> Result<RoomSubscription, ParseError> {
                Ok(RoomSubscription {
                    room: BareJid::from_str(subscription.attr_req("jid")?)?,
                    nodes: event_nodes(subscription),
                })
            })
            .collect::<Result<Vec<_>, _>>()?)
    }
}

impl MUC {
    /// Registers `room` and sends our join presence. Returns our own occupant presence.
    async fn enter_room(
        &self,
        room: &BareJid,
        nick: &str,
        password: Option<&str>,
    ) -> Result<Element> {
        let to = occupant_jid(room, nick)?;

        let mut inserted = false;
        self.ctx.store().update_rooms(|rooms| {
            if rooms.contains_key(room) {
                return;
            }
            rooms.insert(room.clone(), Room::new(room.clone(), nick));
            inserted = true;
        });
        if !inserted {
            bail!("can not join room more than once");
        }

        let mut x = StanzaBuilder::new("x", ns::MUC);
        if let Some(password) = password {
            x = x.text_child("password", password);
        }

        let result = self
            .ctx
            .send_presence_awaiting(
                StanzaBuilder::presence()
                    .attr("to", to.to_string())
                    .cnode(x),
            )
            .await;

        match result {
            Ok(presence) => Ok(presence),
            Err(err) => {
                self.forget_room(room);
                Err(err.into())
            }
        }
    }

    async fn configure_room(&self, room: &BareJid, config: &RoomConfig) -> Result<()> {
        let query = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", room.to_string())
                    .c_ns("query", ns::MUC_OWNER),
            )
            .await?;

        let form = query
            .get_child("x", ns::DATA_FORMS)
            .ok_or_else(|| anyhow!("Room {} didn't send a configuration form", room))?;
        let mut form = DataForm::try_from(form)?;
        config.apply(&mut form)?;

        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", room.to_string())
                    .c_ns("query", ns::MUC_OWNER)
                    .cnode(form.into_submit_form()),
            )
            .await?;
        Ok(())
    }

    async fn set_affiliation(
        &self,
        room: &BareJid,
        user: &BareJid,
        affiliation: Affiliation,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut builder = StanzaBuilder::iq("set")
            .attr("id", self.ctx.generate_id())
            .attr("to", room.to_string())
            .c_ns("query", ns::MUC_ADMIN)
            .c("item")
            .attr("affiliation", affiliation.as_ref())
            .attr("jid", user.to_string());
        if let Some(reason) = reason {
            builder = builder.text_child("reason", reason);
        }
        self.ctx.send_iq(builder).await?;
        Ok(())
    }

    async fn set_role(
        &self,
        room: &BareJid,
        nick: &str,
        role: Role,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut builder = StanzaBuilder::iq("set")
            .attr("id", self.ctx.generate_id())
            .attr("to", room.to_string())
            .c_ns("query", ns::MUC_ADMIN)
            .c("item")
            .attr("nick", nick)
            .attr("role", role.as_ref());
        if let Some(reason) = reason {
            builder = builder.text_child("reason", reason);
        }
        self.ctx.send_iq(builder).await?;
        Ok(())
    }

    /// The real bare JID behind `nick`. Falls back to the room's user lists if the room doesn't
    /// disclose it in the occupant's presence.
    async fn resolve_occupant_jid(&self, room: &BareJid, nick: &str) -> Result<BareJid> {
        if let Some(jid) = self
            .ctx
            .store()
            .room(room)
            .and_then(|joined| joined.occupant(nick).and_then(|o| o.jid.clone()))
        {
            return Ok(jid.to_bare());
        }

        for affiliation in [
            Affiliation::Member,
            Affiliation::Admin,
            Affiliation::Owner,
            Affiliation::Outcast,
        ] {
            let items = self.query_user_list(room, affiliation).await?;
            if let Some(jid) = items
                .into_iter()
                .find(|item| item.nick.as_deref() == Some(nick))
                .and_then(|item| item.jid)
            {
                return Ok(jid.to_bare());
            }
        }

        bail!("Could not resolve JID of {} in room {}", nick, room)
    }

    fn forget_room(&self, room: &BareJid) {
        self.ctx.store().update_rooms(|rooms| {
            rooms.remove(room);
        });
    }

    fn disco(&self) -> Result<Disco> {
        self.ctx
            .get_mod::<Disco>()
            .ok_or_else(|| anyhow!("The client was built without the Disco module"))
    }
}

impl MUC {
    fn handle_presence(&self, presence: &Element) -> Result<()> {
        if presence.attr("type") == Some("error") {
            return Ok(());
        }

        let Some(from) = presence.attr_jid("from")? else {
            return Ok(());
        };
        let Some(nick) = from.resource().map(|r| r.to_string()) else {
            return Ok(());
        };
        let room = from.to_bare();

        if self.ctx.store().room(&room).is_none() {
            debug!("Ignoring presence for unknown room {}", room);
            return Ok(());
        }

        let Some(user) = MucUser::from_stanza(presence)? else {
            return Ok(());
        };

        if presence.attr("type") == Some("unavailable") {
            return self.handle_unavailable(room, nick, &user);
        }

        let item = user.item();
        let occupant = RoomOccupant {
            jid: item.and_then(|item| item.jid.clone()),
            nick: nick.clone(),
            affiliation: item.map(|item| item.affiliation).unwrap_or(Affiliation::None),
            role: item.map(|item| item.role).unwrap_or(Role::None),
        };
        let is_self = user.has_status(status::SELF_PRESENCE);

        let mut is_new = false;
        self.ctx.store().update_room(&room, |joined| {
            if is_self {
                joined.nick = nick.clone();
            }
            is_new = joined
                .occupants
                .insert(nick.clone(), occupant.clone())
                .is_none();
        });

        let event = if is_self && user.has_status(status::ROOM_CREATED) {
            Event::RoomCreated { room }
        } else if is_new {
            Event::OccupantJoined { room, occupant }
        } else {
            Event::OccupantModified { room, occupant }
        };
        self.ctx.schedule_event(ClientEvent::MUC(event));
        Ok(())
    }

    fn handle_unavailable(&self, room: BareJid, nick: String, user: &MucUser) -> Result<()> {
        let is_self = user.has_status(status::SELF_PRESENCE);

        if user.has_status(status::NEW_NICK) {
            if let Some(new_nick) = user.item().and_then(|item| item.nick.clone()) {
                self.ctx.store().update_room(&room, |joined| {
                    if let Some(mut occupant) = joined.occupants.remove(&nick) {
                        occupant.nick = new_nick.clone();
                        joined.occupants.insert(new_nick.clone(), occupant);
                    }
                    if is_self {
                        joined.nick = new_nick.clone();
                    }
                });
                self.ctx.schedule_event(ClientEvent::MUC(Event::NickChanged {
                    room,
                    old_nick: nick,
                    new_nick,
                }));
                return Ok(());
            }
        }

        let reason = exit_reason(user);

        if is_self {
            info!("Left room {} ({:?})", room, reason);
            self.forget_room(&room);
            self.ctx
                .schedule_event(ClientEvent::MUC(Event::RoomLeft { room, reason }));
            return Ok(());
        }

        self.ctx.store().update_room(&room, |joined| {
            joined.occupants.remove(&nick);
        });
        self.ctx.schedule_event(ClientEvent::MUC(Event::OccupantLeft {
            room,
            nick,
            reason,
        }));
        Ok(())
    }

    fn handle_groupchat_message(&self, message: &Element) -> Result<()> {
        let Some(room) = message.from_bare() else {
            return Ok(());
        };
        let Some(joined) = self.ctx.store().room(&room) else {
            return Ok(());
        };

        if message.get_child("body", ns::JABBER_CLIENT).is_none() {
            if let Some(subject) = message.child_text("subject", ns::JABBER_CLIENT) {
                let subject = (!subject.is_empty()).then_some(subject);
                self.ctx
                    .store()
                    .update_room(&room, |joined| joined.subject = subject.clone());
                self.ctx
                    .schedule_event(ClientEvent::MUC(Event::SubjectChanged { room, subject }));
            }
            return Ok(());
        }

        let Some(mut chat_message) = ChatMessage::from_stanza(message, self.ctx.now())? else {
            return Ok(());
        };
        chat_message.outgoing = chat_message
            .from
            .resource()
            .map(|nick| nick.as_str() == joined.nick)
            .unwrap_or(false);

        if self.ctx.store().add_room_message(&room, chat_message.clone()) {
            self.ctx.schedule_event(ClientEvent::MUC(Event::MessageReceived {
                room,
                message: chat_message,
            }));
        }
        Ok(())
    }

    /// MUC/Sub delivers room traffic wrapped in pubsub events.
    fn handle_mucsub_event(&self, message: &Element) -> Result<()> {
        for event in PubSubEvent::from_message(message)? {
            if event.node != ns::MUCSUB_NODES_MESSAGES && event.node != ns::MUCSUB_NODES_SUBJECT {
                continue;
            }
            for item in event.published {
                let Some(payload) = item.payload else {
                    continue;
                };
                if payload.name() == "message" {
                    self.handle_groupchat_message(&payload)?;
                }
            }
        }
        Ok(())
    }

    fn handle_invitation(&self, message: &Element) -> Result<()> {
        if message.attr("type") == Some("groupchat") || message.attr("type") == Some("error") {
            return Ok(());
        }

        let Some(invitation) = Invitation::from_message(message)? else {
            return Ok(());
        };

        let event = match invitation.kind {
            InvitationKind::Invite => Event::InvitationReceived(invitation),
            InvitationKind::Decline => Event::InvitationDeclined(invitation),
        };
        self.ctx.schedule_event(ClientEvent::MUC(event));
        Ok(())
    }
}

fn occupant_jid(room: &BareJid, nick: &str) -> Result<FullJid> {
    Ok(FullJid::from_str(&format!("{}/{}", room, nick))?)
}

fn event_nodes(parent: &Element) -> Vec<String> {
    parent
        .children()
        .filter(|child| child.is("event", ns::MUCSUB))
        .filter_map(|event| event.attr("node").map(ToString::to_string))
        .collect()
}

/// Classifies an unavailable occupant presence by its XEP-0045 §17.1 status codes.
fn exit_reason(user: &MucUser) -> ExitReason {
    if let Some(destroy) = &user.destroy {
        return ExitReason::RoomDestroyed {
            reason: destroy.reason.clone(),
            alternate: destroy.jid.clone(),
        };
    }

    let actor_and_reason = user.item().and_then(|item| {
        let actor = item.actor.as_ref()?.nick.clone()?;
        let reason = item.reason.clone()?;
        Some((actor, reason))
    });

    if user.has_status(status::BANNED) {
        if let Some((actor, reason)) = actor_and_reason {
            return ExitReason::Banned { actor, reason };
        }
    } else if user.has_status(status::KICKED) {
        if let Some((actor, reason)) = actor_and_reason {
            return ExitReason::Kicked { actor, reason };
        }
    } else if user.has_status(status::REMOVED_AFFILIATION_CHANGE) {
        return ExitReason::AffiliationChanged;
    } else if user.has_status(status::REMOVED_MEMBERS_ONLY) {
        return ExitReason::MembersOnly;
    } else if user.has_status(status::REMOVED_SHUTDOWN) || user.has_status(status::REMOVED_ERROR)
    {
        return ExitReason::ConnectionError;
    }

    ExitReason::Left
}
