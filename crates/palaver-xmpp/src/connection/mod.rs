// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use config::ConnectionConfig;
pub use connection::{Connection, StatusListener};
pub use error::ConnectionError;
pub use status::ConnectionStatus;

mod config;
#[allow(clippy::module_inception)]
mod connection;
mod driver;
mod error;
mod status;
