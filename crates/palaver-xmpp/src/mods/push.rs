// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::{anyhow, Result};
use jid::Jid;

use crate::client::ModuleContext;
use crate::mods::{Disco, Module};
use crate::ns;
use crate::stanza::{DataForm, StanzaBuilder};

/// XEP-0357: Push Notifications
/// https://xmpp.org/extensions/xep-0357.html
#[derive(Default, Clone)]
pub struct Push {
    ctx: ModuleContext,
}

impl Module for Push {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl Push {
    /// https://xmpp.org/extensions/xep-0357.html#enabling
    ///
    /// `form` carries publish options for the app server, e.g. a device token.
    pub async fn enable(&self, service: &Jid, node: &str, form: Option<DataForm>) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("enable", ns::PUSH)
                    .attr("jid", service.to_string())
                    .attr("node", node)
                    .cnodes(form.map(Into::into)),
            )
            .await?;
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0357.html#disabling
    ///
    /// Disables all nodes of `service` if `node` is `None`.
    pub async fn disable(&self, service: &Jid, node: Option<&str>) -> Result<()> {
        self.ctx
            .send_iq(
                StanzaBuilder::iq("set")
                    .attr("id", self.ctx.generate_id())
                    .c_ns("disable", ns::PUSH)
                    .attr("jid", service.to_string())
                    .attr("node", node),
            )
            .await?;
        Ok(())
    }

    /// The server's app server component, advertised with the `pubsub/push` identity.
    pub async fn get_push_service(&self) -> Result<Option<Jid>> {
        let disco = self
            .ctx
            .get_mod::<Disco>()
            .ok_or_else(|| anyhow!("The client was built without the Disco module"))?;
        disco.find_service("pubsub", "push").await
    }
}
