// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use jid::Jid;
use minidom::Element;
use parking_lot::RwLock;
use tracing::warn;

use crate::client::ModuleContext;
use crate::event::Event as ClientEvent;
use crate::handler::Matcher;
use crate::mods::Module;
use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// XEP-0191: Blocking Command
#[derive(Default, Clone)]
pub struct BlockList {
    ctx: ModuleContext,
    blocked: Arc<RwLock<HashSet<Jid>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    UserBlocked { jid: Jid },
    UserUnblocked { jid: Jid },
    BlockListCleared,
}

impl Module for BlockList {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("set").ns(ns::BLOCKING),
            |block_list, iq| block_list.handle_push(iq),
        );
    }

    fn handle_disconnect(&self) {
        self.blocked.write().clear();
    }
}

/// https://xmpp.org/extensions/xep-0191.html
impl BlockList {
    pub async fn load_block_list(&self) -> Result<Vec<Jid>> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("blocklist", ns::BLOCKING),
            )
            .await?;

        response.expect_is("blocklist", ns::BLOCKING)?;
        let jids = parse_items(&response)?;

        *self.blocked.write() = jids.iter().cloned().collect();
        Ok(jids)
    }

    /// https://xmpp.org/extensions/xep-0191.html#block
    pub async fn block_jid(&self, jid: &Jid) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("block", ns::BLOCKING)
                    .c("item")
                    .attr("jid", jid.to_string()),
            )
            .await?;
        self.blocked.write().insert(jid.clone());
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0191.html#unblock
    pub async fn unblock_jid(&self, jid: &Jid) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("unblock", ns::BLOCKING)
                    .c("item")
                    .attr("jid", jid.to_string()),
            )
            .await?;
        self.blocked.write().remove(jid);
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0191.html#unblockall
    pub async fn unblock_all(&self) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("unblock", ns::BLOCKING),
            )
            .await?;
        self.blocked.write().clear();
        Ok(())
    }

    pub fn blocked_jids(&self) -> Vec<Jid> {
        self.blocked.read().iter().cloned().collect()
    }

    pub fn is_blocked(&self, jid: &Jid) -> bool {
        self.blocked.read().contains(jid)
    }
}

impl BlockList {
    fn handle_push(&self, iq: &Element) -> Result<()> {
        if !self.ctx.is_from_own_account(iq) {
            warn!("Ignoring block list push from {:?}", iq.attr("from"));
            return Ok(());
        }

        let mut events = vec![];

        if let Some(block) = iq.get_child("block", ns::BLOCKING) {
            let jids = parse_items(block)?;
            self.blocked.write().extend(jids.iter().cloned());
            events.extend(jids.into_iter().map(|jid| Event::UserBlocked { jid }));
        } else if let Some(unblock) = iq.get_child("unblock", ns::BLOCKING) {
            let jids = parse_items(unblock)?;
            if jids.is_empty() {
                self.blocked.write().clear();
                events.push(Event::BlockListCleared);
            } else {
                let mut blocked = self.blocked.write();
                for jid in jids.iter() {
                    blocked.remove(jid);
                }
                drop(blocked);
                events.extend(jids.into_iter().map(|jid| Event::UserUnblocked { jid }));
            }
        } else {
            return Ok(());
        }

        self.ctx.send_stanza(
            StanzaBuilder::iq("result")
                .attr("id", iq.attr("id"))
                .attr("to", iq.attr("from")),
        )?;

        for event in events {
            self.ctx.schedule_event(ClientEvent::BlockList(event));
        }
        Ok(())
    }
}

fn parse_items(parent: &Element) -> Result<Vec<Jid>, ParseError> {
    parent
        .children()
        .filter(|child| child.is("item", ns::BLOCKING))
        .map(|item| -> Result<Jid, ParseError> { Ok(Jid::from_str(item.attr_req("jid")?)?) })
        .collect()
}
