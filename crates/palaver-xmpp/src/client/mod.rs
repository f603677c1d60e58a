// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::TypeId;
use std::collections::BTreeMap;

pub use builder::ClientBuilder;
pub use client::Client;
pub use module_context::ModuleContext;

use crate::mods::AnyModule;
use crate::util::PinnedFuture;
use crate::Event as ClientEvent;

mod builder;
#[allow(clippy::module_inception)]
mod client;
mod module_context;

pub type EventHandler = Box<dyn Fn(Client, ClientEvent) -> PinnedFuture<()> + Send + Sync>;

pub(super) type ModuleLookup = BTreeMap<TypeId, Box<dyn AnyModule>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connected,
    Disconnected { condition: Option<String> },
}
