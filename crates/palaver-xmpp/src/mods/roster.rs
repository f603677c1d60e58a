// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::{bail, Result};
use async_trait::async_trait;
use jid::{BareJid, Jid};
use minidom::Element;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::models::{Availability, Contact, Contacts, Presence, Show};
use crate::mods::Module;
use crate::ns;
use crate::stanza::{ItemSubscription, RosterItem, StanzaBuilder};
use crate::util::{ReplayStream, RequestError};

/// RFC 6121 roster management and presence subscriptions.
///
/// Contacts live in the session store. Roster pushes are only applied if they originate from our
/// own account.
#[derive(Default, Clone)]
pub struct Roster {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `from` asked to see our presence.
    PresenceSubscriptionRequest { from: BareJid },
    /// `jid` approved our subscription request.
    SubscriptionApproved { jid: BareJid },
    /// `jid` denied or cancelled our subscription.
    SubscriptionRevoked { jid: BareJid },
    /// `jid` no longer wants to see our presence.
    ContactUnsubscribed { jid: BareJid },
    PresenceChanged {
        jid: BareJid,
        availability: Availability,
    },
    ContactChanged { jid: BareJid },
}

#[async_trait]
impl Module for Roster {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("set").ns(ns::ROSTER),
            |roster, iq| roster.handle_roster_push(iq),
        );
        self.ctx.add_handler::<Self, _>(Matcher::new().name("presence"), |roster, presence| {
            roster.handle_presence(presence)
        });
    }

    async fn handle_connect(&self) -> Result<()> {
        self.load_roster().await?;
        self.send_presence(None, None)
    }
}

impl Roster {
    /// Fetches the roster and replaces the stored contacts with it. Messages of contacts that
    /// remain on the roster are kept.
    pub async fn load_roster(&self) -> Result<Contacts> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .cnode(RosterItem::query([])),
            )
            .await?;

        let items = RosterItem::parse_query(&response)?;

        let store = self.ctx.store();
        let mut dropped = Contacts::new();

        store.update_contacts(|contacts| {
            let mut previous = std::mem::take(contacts);

            for item in items {
                if item.subscription == ItemSubscription::Remove {
                    continue;
                }
                let mut contact = previous
                    .remove(&item.jid)
                    .unwrap_or_else(|| store.new_contact(&item.jid));
                apply_item(&mut contact, item);
                contacts.insert(contact.jid.clone(), contact);
            }
            dropped = previous;
        });

        for contact in dropped.into_values() {
            store.release_contact(contact);
        }

        Ok(self.ctx.store().contacts())
    }

    /// Adds `jid` to the roster and asks for a presence subscription. Resolves once the server has
    /// pushed the roster item for `jid`, even if `jid` was already a contact.
    pub async fn add_contact(
        &self,
        jid: &BareJid,
        name: Option<&str>,
        groups: &[String],
    ) -> Result<()> {
        let own_jid = self.ctx.bare_jid()?;
        ensure_not_self(&own_jid, jid)?;

        let (pushed_tx, pushed_rx) = oneshot::channel();
        let pushed_tx = Mutex::new(Some(pushed_tx));
        let expected_jid = jid.clone();

        // Registered after our own push handler, so the store is up to date when this fires.
        let push_listener = self.ctx.add_collector(
            Matcher::new().name("iq").type_("set").ns(ns::ROSTER),
            move |iq| {
                if !is_push_for(iq, &own_jid, &expected_jid) {
                    return Ok(true);
                }
                if let Some(tx) = pushed_tx.lock().take() {
                    let _ = tx.send(());
                }
                Ok(false)
            },
        );

        let item = RosterItem {
            name: name.map(ToString::to_string),
            groups: groups.to_vec(),
            ..RosterItem::new(jid.clone())
        };

        let result = self.send_roster_item(item, pushed_rx).await;
        self.ctx.remove_handler(&push_listener);
        result
    }

    pub async fn remove_contact(&self, jid: &BareJid) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .cnode(RosterItem::query([RosterItem::removal(jid.clone())])),
            )
            .await?;

        let mut removed = None;
        self.ctx.store().update_contacts(|contacts| removed = contacts.remove(jid));
        if let Some(contact) = removed {
            self.ctx.store().release_contact(contact);
        }
        Ok(())
    }

    /// Asks `jid` for permission to see their presence.
    pub fn subscribe(&self, jid: &BareJid) -> Result<()> {
        self.send_subscription_presence(jid, "subscribe")?;
        self.ctx
            .store()
            .update_contact(jid, |contact| contact.pending_out = true);
        Ok(())
    }

    /// Stops receiving `jid`'s presence.
    pub fn unsubscribe(&self, jid: &BareJid) -> Result<()> {
        self.send_subscription_presence(jid, "unsubscribe")?;
        self.ctx.store().update_contact(jid, |contact| {
            contact.subscription = contact.subscription.removing_to();
            contact.pending_out = false;
            contact.clear_presences();
        });
        Ok(())
    }

    pub fn approve_subscription(&self, jid: &BareJid) -> Result<()> {
        self.send_subscription_presence(jid, "subscribed")?;
        self.ctx.store().upsert_contact(jid, |contact| {
            contact.subscription = contact.subscription.adding_from();
            contact.pending_in = false;
        });
        Ok(())
    }

    pub fn deny_subscription(&self, jid: &BareJid) -> Result<()> {
        self.send_subscription_presence(jid, "unsubscribed")?;
        self.ctx
            .store()
            .update_contact(jid, |contact| contact.pending_in = false);
        Ok(())
    }

    /// Broadcasts our own presence.
    pub fn send_presence(&self, show: Option<Show>, status: Option<&str>) -> Result<()> {
        let mut presence = StanzaBuilder::presence();
        if let Some(show) = show {
            presence = presence.text_child("show", show.as_ref());
        }
        if let Some(status) = status {
            presence = presence.text_child("status", status);
        }
        self.ctx.send_stanza(presence)
    }

    pub fn contacts(&self) -> Contacts {
        self.ctx.store().contacts()
    }

    pub fn contact(&self, jid: &BareJid) -> Option<Contact> {
        self.ctx.store().contact(jid)
    }

    /// Yields the current contacts first and then every change.
    pub fn contacts_stream(&self) -> ReplayStream<Contacts> {
        self.ctx.store().contacts_stream()
    }
}

impl Roster {
    async fn send_roster_item(
        &self,
        item: RosterItem,
        pushed: oneshot::Receiver<()>,
    ) -> Result<()> {
        let jid = item.jid.clone();

        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .cnode(RosterItem::query([item])),
            )
            .await?;
        self.subscribe(&jid)?;

        match tokio::time::timeout(self.ctx.config().request_timeout, pushed).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RequestError::Disconnected.into()),
            Err(_) => Err(RequestError::TimedOut.into()),
        }
    }

    fn send_subscription_presence(&self, to: &BareJid, type_: &str) -> Result<()> {
        self.ctx.send_stanza(
            StanzaBuilder::presence()
                .attr("type", type_)
                .attr("to", to.to_string()),
        )
    }

    fn handle_roster_push(&self, iq: &Element) -> Result<()> {
        let Some(query) = iq.get_child("query", ns::ROSTER) else {
            return Ok(());
        };

        // Pushes are acknowledged no matter whether we apply them.
        self.ctx.send_stanza(
            StanzaBuilder::iq("result")
                .attr("id", iq.attr("id"))
                .attr("to", iq.attr("from")),
        )?;

        if !self.ctx.is_from_own_account(iq) {
            warn!("Ignoring roster push from {:?}", iq.attr("from"));
            return Ok(());
        }

        let items = RosterItem::parse_query(query)?;
        let jids = items.iter().map(|item| item.jid.clone()).collect::<Vec<_>>();

        let store = self.ctx.store();
        let mut removed = vec![];

        store.update_contacts(|contacts| {
            for item in items {
                if item.subscription == ItemSubscription::Remove {
                    removed.extend(contacts.remove(&item.jid));
                    continue;
                }
                let contact = contacts
                    .entry(item.jid.clone())
                    .or_insert_with(|| store.new_contact(&item.jid));
                apply_item(contact, item);
            }
        });

        for contact in removed {
            store.release_contact(contact);
        }

        for jid in jids {
            self.ctx
                .schedule_event(ClientEvent::Roster(Event::ContactChanged { jid }));
        }
        Ok(())
    }

    fn handle_presence(&self, presence: &Element) -> Result<()> {
        if presence.get_child("x", ns::MUC_USER).is_some() {
            return Ok(());
        }

        let Some(from) = presence.attr("from") else {
            return Ok(());
        };
        let from = from.parse::<Jid>()?;
        let bare = from.to_bare();

        match presence.attr("type") {
            None | Some("unavailable") => self.handle_availability(presence, &from, bare),
            Some("subscribe") => self.handle_subscribe(bare),
            Some("subscribed") => self.handle_subscribed(bare),
            Some("unsubscribed") => self.handle_unsubscribed(bare),
            Some("unsubscribe") => self.handle_unsubscribe(bare),
            Some(type_) => {
                debug!("Ignoring presence of type {} from {}", type_, from);
                Ok(())
            }
        }
    }

    fn handle_availability(&self, presence: &Element, from: &Jid, jid: BareJid) -> Result<()> {
        let resource = from
            .resource()
            .map(|resource| resource.to_string())
            .unwrap_or_default();
        let unavailable = presence.attr("type") == Some("unavailable");

        let mut availability = None;
        self.ctx.store().update_contact(&jid, |contact| {
            if unavailable {
                contact.presences.remove(&resource);
            } else {
                contact
                    .presences
                    .insert(resource, Presence::from(presence));
            }
            availability = Some(contact.availability());
        });

        // Presence of JIDs that are not on the roster is not tracked.
        let Some(availability) = availability else {
            return Ok(());
        };

        self.ctx
            .schedule_event(ClientEvent::Roster(Event::PresenceChanged { jid, availability }));
        Ok(())
    }

    fn handle_subscribe(&self, from: BareJid) -> Result<()> {
        let already_approved = self
            .ctx
            .store()
            .contact(&from)
            .map(|contact| contact.subscription.has_from())
            .unwrap_or(false);

        if already_approved {
            return self.send_subscription_presence(&from, "subscribed");
        }

        self.ctx
            .store()
            .upsert_contact(&from, |contact| contact.pending_in = true);
        self.ctx
            .schedule_event(ClientEvent::Roster(Event::PresenceSubscriptionRequest {
                from,
            }));
        Ok(())
    }

    fn handle_subscribed(&self, from: BareJid) -> Result<()> {
        self.ctx.store().upsert_contact(&from, |contact| {
            contact.subscription = contact.subscription.adding_to();
            contact.pending_out = false;
        });
        self.send_subscription_presence(&from, "subscribe")?;
        self.ctx
            .schedule_event(ClientEvent::Roster(Event::SubscriptionApproved { jid: from }));
        Ok(())
    }

    fn handle_unsubscribed(&self, from: BareJid) -> Result<()> {
        self.ctx.store().update_contact(&from, |contact| {
            contact.subscription = contact.subscription.removing_to();
            contact.pending_out = false;
            contact.clear_presences();
        });
        self.send_subscription_presence(&from, "unsubscribe")?;
        self.ctx
            .schedule_event(ClientEvent::Roster(Event::SubscriptionRevoked { jid: from }));
        Ok(())
    }

    fn handle_unsubscribe(&self, from: BareJid) -> Result<()> {
        self.ctx.store().update_contact(&from, |contact| {
            contact.subscription = contact.subscription.removing_from();
            contact.pending_in = false;
        });
        self.send_subscription_presence(&from, "unsubscribed")?;
        self.ctx
            .schedule_event(ClientEvent::Roster(Event::ContactUnsubscribed { jid: from }));
        Ok(())
    }
}

fn apply_item(contact: &mut Contact, item: RosterItem) {
    let ItemSubscription::State(subscription) = item.subscription else {
        return;
    };

    contact.name = item.name;
    contact.groups = item.groups;
    contact.subscription = subscription;
    contact.pending_out = item.ask;
    if !subscription.has_to() {
        contact.clear_presences();
    }
}

/// Whether `iq` is a roster push from our own account that carries an item for `jid`.
fn is_push_for(iq: &Element, own_jid: &BareJid, jid: &BareJid) -> bool {
    let from_own_account = iq
        .attr("from")
        .map(|from| {
            from.parse::<Jid>()
                .map(|from| from.to_bare() == *own_jid)
                .unwrap_or(false)
        })
        .unwrap_or(true);

    from_own_account
        && iq
            .get_child("query", ns::ROSTER)
            .map(|query| {
                query
                    .children()
                    .filter_map(|item| item.attr("jid"))
                    .any(|item_jid| item_jid.parse::<BareJid>().ok().as_ref() == Some(jid))
            })
            .unwrap_or(false)
}

/// Fails if `jid` is our own account, which can't be added to our roster.
fn ensure_not_self(own: &BareJid, jid: &BareJid) -> Result<()> {
    if own == jid {
        bail!("Can not add own account to roster");
    }
    Ok(())
}
