// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::any::Any;

use anyhow::Result;
use async_trait::async_trait;

pub use block_list::BlockList;
pub use bookmark::Bookmark;
pub use bookmark2::Bookmark2;
pub use chat::Chat;
pub use disco::Disco;
pub use entity_time::EntityTime;
pub use http_upload::HttpUpload;
pub use mam::MAM;
pub use muc::MUC;
pub use ping::Ping;
pub use pubsub::PubSub;
pub use push::Push;
pub use roster::Roster;

use crate::client::ModuleContext;

pub mod block_list;
pub mod bookmark;
pub mod bookmark2;
pub mod chat;
pub mod disco;
pub mod entity_time;
pub mod http_upload;
pub mod mam;
pub mod muc;
pub mod ping;
pub mod pubsub;
pub mod push;
pub mod roster;

#[async_trait]
pub trait Module: Any + Send + Sync {
    fn register_with(&mut self, context: ModuleContext);

    /// Installs the module's stanza handlers. Called before every connection attempt since
    /// handlers don't survive a disconnect.
    fn add_handlers(&self) {}

    async fn handle_connect(&self) -> Result<()> {
        Ok(())
    }

    /// Drops per-session state. Called synchronously when the connection goes down.
    fn handle_disconnect(&self) {}
}

pub trait AnyModule: Module {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Module> AnyModule for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
