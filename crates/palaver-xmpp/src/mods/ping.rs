// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::Jid;
use minidom::Element;
use tracing::{info, warn};

use crate::client::ModuleContext;
use crate::handler::Matcher;
use crate::mods::Module;
use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::RequestError;

/// XEP-0199: XMPP Ping
#[derive(Default, Clone)]
pub struct Ping {
    ctx: ModuleContext,
}

impl Module for Ping {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("get").ns(ns::PING),
            |ping, iq| ping.handle_ping(iq),
        );

        self.ctx
            .add_timed_handler::<Self, _>(self.ctx.config().ping_interval, |ping| {
                let ping = ping.clone();
                tokio::spawn(async move {
                    if let Err(err) = ping.send_ping().await {
                        warn!("Failed to send ping. {}", err);
                    }
                });
                true
            });
    }
}

impl Ping {
    /// Pings `jid` or, without one, our server.
    pub async fn ping(&self, jid: Option<&Jid>) -> Result<(), RequestError> {
        let iq = StanzaBuilder::iq("get")
            .attr("id", self.ctx.generate_id())
            .attr("to", jid.map(ToString::to_string))
            .c_ns("ping", ns::PING);
        self.ctx.send_iq(iq).await?;
        Ok(())
    }

    /// Pings the server and disconnects if it doesn't answer in time.
    pub async fn send_ping(&self) -> Result<()> {
        match self.ping(None).await {
            // An error response still means the server is alive.
            Ok(_) | Err(RequestError::XMPP { .. }) => Ok(()),
            Err(RequestError::TimedOut) => {
                info!("Ping timed out. Disconnecting…");
                self.ctx.disconnect();
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn handle_ping(&self, iq: &Element) -> Result<()> {
        if iq.get_child("ping", ns::PING).is_none() {
            return Ok(());
        }

        self.ctx.send_stanza(
            StanzaBuilder::iq("result")
                .attr("id", iq.attr("id"))
                .attr("to", iq.attr("from")),
        )
    }
}
