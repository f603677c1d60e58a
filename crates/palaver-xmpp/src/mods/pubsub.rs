// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;
use minidom::Element;

use crate::client::ModuleContext;
use crate::mods::Module;
use crate::ns;
use crate::stanza::{DataForm, PubSubItem, PublishOptions, StanzaBuilder};
use crate::util::{ElementExt, RequestError};

/// XEP-0060: Publish-Subscribe
///
/// Every operation targets the pubsub service `to`, or our own PEP service (XEP-0163) if `to` is
/// `None`.
#[derive(Default, Clone)]
pub struct PubSub {
    ctx: ModuleContext,
}

impl Module for PubSub {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl PubSub {
    /// https://xmpp.org/extensions/xep-0060.html#publisher-publish
    pub async fn publish(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        items: impl IntoIterator<Item = PubSubItem>,
        options: Option<PublishOptions>,
    ) -> Result<(), RequestError> {
        let mut pubsub = StanzaBuilder::new("pubsub", ns::PUBSUB)
            .c("publish")
            .attr("node", node.as_ref())
            .cnodes(items.into_iter().map(|item| item.into_element(ns::PUBSUB)))
            .up();

        if let Some(options) = options {
            pubsub = pubsub
                .c("publish-options")
                .cnode(DataForm::from(options))
                .up();
        }

        self.ctx.send_iq(self.iq("set", to).cnode(pubsub)).await?;
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0060.html#subscriber-retrieve
    ///
    /// Returns an empty list if the node doesn't exist.
    pub async fn retrieve_items(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        max_items: Option<u32>,
    ) -> Result<Vec<PubSubItem>, RequestError> {
        let iq = self
            .iq("get", to)
            .c_ns("pubsub", ns::PUBSUB)
            .c("items")
            .attr("node", node.as_ref())
            .attr("max_items", max_items.map(|max| max.to_string()));

        let response = match self.ctx.send_iq(iq).await {
            Ok(iq) => iq,
            Err(e) if e.is_item_not_found_err() => return Ok(vec![]),
            Err(e) => return Err(e),
        }
        .ok_or(RequestError::UnexpectedResponse)?;

        response.expect_is("pubsub", ns::PUBSUB)?;

        let Some(items) = response.get_child("items", ns::PUBSUB) else {
            return Ok(vec![]);
        };

        Ok(items
            .children()
            .filter(|child| child.is("item", ns::PUBSUB))
            .map(PubSubItem::from_element)
            .collect())
    }

    /// https://xmpp.org/extensions/xep-0060.html#publisher-delete
    pub async fn retract<ID: AsRef<str>>(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        item_ids: impl IntoIterator<Item = ID>,
    ) -> Result<(), RequestError> {
        let iq = self
            .iq("set", to)
            .c_ns("pubsub", ns::PUBSUB)
            .c("retract")
            .attr("node", node.as_ref())
            .attr("notify", "true")
            .cnodes(item_ids.into_iter().map(|id| {
                StanzaBuilder::new("item", ns::PUBSUB)
                    .attr("id", id.as_ref())
                    .build()
            }));

        self.ctx.send_iq(iq).await?;
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0060.html#owner-purge
    pub async fn purge_node(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
    ) -> Result<(), RequestError> {
        self.ctx
            .send_iq(self.owner_iq("set", to, "purge", node.as_ref()))
            .await?;
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0060.html#owner-delete
    pub async fn delete_node(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
    ) -> Result<(), RequestError> {
        self.ctx
            .send_iq(self.owner_iq("set", to, "delete", node.as_ref()))
            .await?;
        Ok(())
    }

    /// https://xmpp.org/extensions/xep-0060.html#owner-configure-request
    ///
    /// Returns `None` if the node doesn't exist.
    pub async fn get_node_config(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
    ) -> Result<Option<DataForm>, RequestError> {
        let response = match self
            .ctx
            .send_iq(self.owner_iq("get", to, "configure", node.as_ref()))
            .await
        {
            Ok(iq) => iq,
            Err(e) if e.is_item_not_found_err() => return Ok(None),
            Err(e) => return Err(e),
        }
        .ok_or(RequestError::UnexpectedResponse)?;

        response.expect_is("pubsub", ns::PUBSUB_OWNER)?;

        let form = response
            .get_child("configure", ns::PUBSUB_OWNER)
            .and_then(|configure| configure.get_child("x", ns::DATA_FORMS))
            .ok_or(RequestError::UnexpectedResponse)?;

        Ok(Some(DataForm::try_from(form)?))
    }

    /// https://xmpp.org/extensions/xep-0060.html#owner-configure-submit
    pub async fn set_node_config(
        &self,
        to: Option<&BareJid>,
        node: impl AsRef<str>,
        form: DataForm,
    ) -> Result<(), RequestError> {
        self.ctx
            .send_iq(
                self.owner_iq("set", to, "configure", node.as_ref())
                    .cnode(form.into_submit_form()),
            )
            .await?;
        Ok(())
    }
}

impl PubSub {
    fn iq(&self, type_: &str, to: Option<&BareJid>) -> StanzaBuilder {
        StanzaBuilder::iq(type_)
            .attr("id", self.ctx.generate_id())
            .attr("to", to.map(ToString::to_string))
    }

    /// An iq with `<pubsub xmlns='…#owner'><{action} node='{node}'/></pubsub>`, positioned on the
    /// action element.
    fn owner_iq(
        &self,
        type_: &str,
        to: Option<&BareJid>,
        action: &str,
        node: &str,
    ) -> StanzaBuilder {
        self.iq(type_, to)
            .c_ns("pubsub", ns::PUBSUB_OWNER)
            .c(action)
            .attr("node", node)
    }
}

/// Finds the first published payload named `name` in `namespace`.
pub(crate) fn find_payload<'a>(
    items: impl IntoIterator<Item = &'a PubSubItem>,
    name: &str,
    namespace: &str,
) -> Option<&'a Element> {
    items
        .into_iter()
        .filter_map(|item| item.payload.as_ref())
        .find(|payload| payload.is(name, namespace))
}
