// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use client::{Client, ClientBuilder};
pub use connection::{Connection, ConnectionConfig, ConnectionError, ConnectionStatus};
pub use deps::{
    IDProvider, KeyValueStore, MemoryKeyValueStore, SystemTimeProvider, TimeProvider,
    UUIDProvider,
};
pub use event::Event;
pub use stanza::ns;
pub use util::{parse_bool, ElementExt, ParseError, ReplayStream, RequestError};

pub mod client;
pub mod connection;
mod deps;
mod event;
pub mod handler;
pub mod models;
pub mod mods;
pub mod sasl;
pub mod stanza;
pub mod transport;
mod util;

#[cfg(feature = "test")]
pub mod test;
