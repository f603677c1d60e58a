// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use jid::Jid;
use minidom::Element;
use parking_lot::RwLock;

use crate::client::ModuleContext;
use crate::handler::Matcher;
use crate::mods::Module;
use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// XEP-0202: Entity Time
#[derive(Default, Clone)]
pub struct EntityTime {
    ctx: ModuleContext,
    server_offset: Arc<RwLock<Option<Duration>>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTime {
    /// Offset from UTC, e.g. `-06:00`.
    pub tzo: String,
    pub utc: DateTime<Utc>,
}

impl Module for EntityTime {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("get").ns(ns::TIME),
            |time, iq| time.handle_time_request(iq),
        );
    }

    fn handle_disconnect(&self) {
        self.server_offset.write().take();
    }
}

impl EntityTime {
    pub async fn query_time(&self, jid: &Jid) -> Result<RemoteTime> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", jid.to_string())
                    .c_ns("time", ns::TIME),
            )
            .await?;
        Ok(RemoteTime::try_from(&response)?)
    }

    /// How far the server's clock is ahead of ours. Queried once per session.
    pub async fn server_time_offset(&self) -> Result<Duration> {
        if let Some(offset) = *self.server_offset.read() {
            return Ok(offset);
        }

        let server = Jid::from_str(&self.ctx.bare_jid()?.domain().to_string())?;
        let remote = self.query_time(&server).await?;
        let offset = remote.utc - self.ctx.now();

        self.server_offset.write().replace(offset);
        Ok(offset)
    }

    /// Our clock, corrected by the server offset if it is known.
    pub fn now(&self) -> DateTime<Utc> {
        let offset = self.server_offset.read().unwrap_or_else(Duration::zero);
        self.ctx.now() + offset
    }

    fn handle_time_request(&self, iq: &Element) -> Result<()> {
        if iq.get_child("time", ns::TIME).is_none() {
            return Ok(());
        }

        let response = StanzaBuilder::iq("result")
            .attr("id", iq.attr("id"))
            .attr("to", iq.attr("from"))
            .c_ns("time", ns::TIME)
            .text_child("tzo", "+00:00")
            .text_child(
                "utc",
                self.ctx.now().to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        self.ctx.send_stanza(response)
    }
}

impl TryFrom<&Element> for RemoteTime {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("time", ns::TIME)?;

        let utc = root.child_text("utc", ns::TIME).ok_or(ParseError::Generic {
            msg: "Missing utc in time response".to_string(),
        })?;

        Ok(RemoteTime {
            tzo: root
                .child_text("tzo", ns::TIME)
                .unwrap_or_else(|| "+00:00".to_string()),
            utc: DateTime::parse_from_rfc3339(utc.trim())?.with_timezone(&Utc),
        })
    }
}
