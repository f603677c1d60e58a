// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::{BareJid, Jid};
use minidom::Element;
use tracing::warn;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::models::{ChatMessage, MessageKind};
use crate::mods::Module;
use crate::ns;
use crate::stanza::{Forwarded, StanzaBuilder};

/// 1:1 messaging and XEP-0280: Message Carbons
#[derive(Default, Clone)]
pub struct Chat {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MessageReceived { with: BareJid, message: ChatMessage },
    /// A message one of our other resources sent or received.
    CarbonReceived { with: BareJid, message: ChatMessage },
}

impl Module for Chat {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").type_("chat"),
            |chat, message| chat.handle_message(message),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("message").ns(ns::CARBONS),
            |chat, message| chat.handle_carbon(message),
        );
    }
}

impl Chat {
    /// Sends a chat message to `to` and stores it on the contact. Returns the message id.
    pub fn send_message(&self, to: &BareJid, body: impl Into<String>) -> Result<String> {
        let id = self.ctx.generate_id();
        let body = body.into();

        self.ctx.send_stanza(
            StanzaBuilder::message()
                .attr("id", id.clone())
                .attr("type", "chat")
                .attr("to", to.to_string())
                .text_child("body", body.clone())
                .c_ns("origin-id", ns::SID)
                .attr("id", id.clone()),
        )?;

        let from = self
            .ctx
            .jid()
            .map(Jid::from)
            .unwrap_or_else(|| Jid::from(to.clone()));

        self.ctx.store().add_contact_message(
            to,
            ChatMessage {
                id: id.clone(),
                stanza_id: None,
                kind: MessageKind::Chat,
                from,
                to: Some(Jid::from(to.clone())),
                body,
                timestamp: self.ctx.now(),
                delayed: false,
                from_archive: false,
                outgoing: true,
            },
        );

        Ok(id)
    }

    pub async fn enable_carbons(&self) -> Result<()> {
        self.set_carbons_enabled(true).await
    }

    pub async fn disable_carbons(&self) -> Result<()> {
        self.set_carbons_enabled(false).await
    }

    async fn set_carbons_enabled(&self, enabled: bool) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns(if enabled { "enable" } else { "disable" }, ns::CARBONS),
            )
            .await?;
        Ok(())
    }
}

impl Chat {
    fn handle_message(&self, stanza: &Element) -> Result<()> {
        if stanza.get_child("received", ns::CARBONS).is_some()
            || stanza.get_child("sent", ns::CARBONS).is_some()
        {
            return Ok(());
        }

        let Some(message) = ChatMessage::from_stanza(stanza, self.ctx.now())? else {
            return Ok(());
        };
        let with = message.from.to_bare();

        if self.ctx.store().add_contact_message(&with, message.clone()) {
            self.ctx
                .schedule_event(ClientEvent::Chat(Event::MessageReceived { with, message }));
        }
        Ok(())
    }

    fn handle_carbon(&self, stanza: &Element) -> Result<()> {
        let (wrapper, outgoing) = if let Some(received) = stanza.get_child("received", ns::CARBONS)
        {
            (received, false)
        } else if let Some(sent) = stanza.get_child("sent", ns::CARBONS) {
            (sent, true)
        } else {
            return Ok(());
        };

        // Anybody could send us a message that looks like a carbon.
        if !self.ctx.is_from_own_account(stanza) || stanza.attr("from").is_none() {
            warn!("Ignoring carbon from {:?}", stanza.attr("from"));
            return Ok(());
        }

        let Some(forwarded) = wrapper.get_child("forwarded", ns::FORWARD) else {
            return Ok(());
        };
        let forwarded = Forwarded::try_from(forwarded)?;

        let Some(mut message) = ChatMessage::from_stanza(&forwarded.stanza, self.ctx.now())?
        else {
            return Ok(());
        };
        if let Some(delay) = forwarded.delay {
            message.timestamp = delay.stamp;
            message.delayed = true;
        }
        message.outgoing = outgoing;

        let with = if outgoing {
            let Some(to) = &message.to else {
                return Ok(());
            };
            to.to_bare()
        } else {
            message.from.to_bare()
        };

        if self.ctx.store().add_contact_message(&with, message.clone()) {
            self.ctx
                .schedule_event(ClientEvent::Chat(Event::CarbonReceived { with, message }));
        }
        Ok(())
    }
}
