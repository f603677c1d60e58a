// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use jid::Jid;
use minidom::Element;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::client::ModuleContext;
use crate::handler::Matcher;
use crate::mods::Module;
use crate::ns;
use crate::stanza::{DiscoInfo, DiscoItem, Identity, StanzaBuilder};

/// Features we announce in response to `disco#info` queries.
const CLIENT_FEATURES: &[&str] = &[
    ns::DISCO_INFO,
    ns::DISCO_ITEMS,
    ns::PING,
    ns::TIME,
    ns::MUC,
    ns::CONFERENCE,
    ns::CARBONS,
    ns::SID,
    "storage:bookmarks+notify",
    "urn:xmpp:bookmarks:1+notify",
];

/// XEP-0030: Service Discovery
#[derive(Default, Clone)]
pub struct Disco {
    ctx: ModuleContext,
    cache: Arc<RwLock<Cache>>,
}

#[derive(Default)]
struct Cache {
    info: HashMap<Jid, DiscoInfo>,
    items: HashMap<Jid, Vec<DiscoItem>>,
    services: Option<Vec<Service>>,
}

/// An entity hosted by our server, e.g. the MUC or upload service.
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub jid: Jid,
    pub info: DiscoInfo,
}

impl Module for Disco {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }

    fn add_handlers(&self) {
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("get").ns(ns::DISCO_INFO),
            |disco, iq| disco.handle_info_request(iq),
        );
        self.ctx.add_handler::<Self, _>(
            Matcher::new().name("iq").type_("get").ns(ns::DISCO_ITEMS),
            |disco, iq| disco.handle_items_request(iq),
        );
    }

    fn handle_disconnect(&self) {
        *self.cache.write() = Default::default();
    }
}

impl Disco {
    /// The `disco#info` of `jid`. Results are cached for the session.
    pub async fn get_info(&self, jid: &Jid) -> Result<DiscoInfo> {
        if let Some(info) = self.cache.read().info.get(jid) {
            return Ok(info.clone());
        }

        let info = self.query_info(jid, None).await?;
        self.cache.write().info.insert(jid.clone(), info.clone());
        Ok(info)
    }

    /// The `disco#items` of `jid`. Results are cached for the session.
    pub async fn get_items(&self, jid: &Jid) -> Result<Vec<DiscoItem>> {
        if let Some(items) = self.cache.read().items.get(jid) {
            return Ok(items.clone());
        }

        let items = self.query_items(jid, None).await?;
        self.cache.write().items.insert(jid.clone(), items.clone());
        Ok(items)
    }

    /// Queries `disco#info` bypassing the cache.
    pub async fn query_info(&self, jid: &Jid, node: Option<&str>) -> Result<DiscoInfo> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", jid.to_string())
                    .cnode(DiscoInfo::request(node)),
            )
            .await?;
        Ok(DiscoInfo::try_from(&response)?)
    }

    /// Queries `disco#items` bypassing the cache.
    pub async fn query_items(&self, jid: &Jid, node: Option<&str>) -> Result<Vec<DiscoItem>> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", jid.to_string())
                    .cnode(DiscoItem::request(node)),
            )
            .await?;
        Ok(DiscoItem::parse_items(&response)?)
    }

    /// Walks the items of our server and fetches the info of each. Items that fail to answer are
    /// skipped.
    pub async fn discover_services(&self) -> Result<Vec<Service>> {
        if let Some(services) = &self.cache.read().services {
            return Ok(services.clone());
        }

        let server = Jid::from_str(&self.ctx.bare_jid()?.domain().to_string())?;
        let mut services = vec![];

        for item in self.get_items(&server).await? {
            match self.get_info(&item.jid).await {
                Ok(info) => services.push(Service {
                    jid: item.jid,
                    info,
                }),
                Err(err) => warn!("Failed to load info of service {}. {}", item.jid, err),
            }
        }

        info!("Discovered {} services", services.len());
        self.cache.write().services = Some(services.clone());
        Ok(services)
    }

    /// The first service with an identity of `category`/`type_`.
    pub async fn find_service(&self, category: &str, type_: &str) -> Result<Option<Jid>> {
        Ok(self
            .discover_services()
            .await?
            .into_iter()
            .find(|service| service.info.has_identity(category, type_))
            .map(|service| service.jid))
    }

    /// The first service advertising `feature`.
    pub async fn find_service_with_feature(&self, feature: &str) -> Result<Option<Service>> {
        Ok(self
            .discover_services()
            .await?
            .into_iter()
            .find(|service| service.info.has_feature(feature)))
    }

    pub async fn supports_feature(&self, jid: &Jid, feature: &str) -> Result<bool> {
        Ok(self.get_info(jid).await?.has_feature(feature))
    }

    /// What we answer to `disco#info` queries.
    pub fn client_info(&self, node: Option<&str>) -> DiscoInfo {
        DiscoInfo {
            node: node.map(ToString::to_string),
            identities: vec![Identity::new("client", "pc").with_name("palaver")],
            features: CLIENT_FEATURES.iter().map(ToString::to_string).collect(),
            forms: vec![],
        }
    }
}

impl Disco {
    fn handle_info_request(&self, iq: &Element) -> Result<()> {
        let Some(query) = iq.get_child("query", ns::DISCO_INFO) else {
            return Ok(());
        };

        let response = StanzaBuilder::iq("result")
            .attr("id", iq.attr("id"))
            .attr("to", iq.attr("from"))
            .cnode(self.client_info(query.attr("node")));
        self.ctx.send_stanza(response)
    }

    fn handle_items_request(&self, iq: &Element) -> Result<()> {
        let Some(query) = iq.get_child("query", ns::DISCO_ITEMS) else {
            return Ok(());
        };

        let response = StanzaBuilder::iq("result")
            .attr("id", iq.attr("id"))
            .attr("to", iq.attr("from"))
            .cnode(DiscoItem::request(query.attr("node")));
        self.ctx.send_stanza(response)
    }
}
