// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::BareJid;

pub use connected_client::{ClientTestAdditions, ConnectedClient};
pub use constant_id_provider::ConstantIDProvider;
pub use constant_time_provider::ConstantTimeProvider;
pub use element_ext::ElementExt;
pub use incrementing_id_provider::IncrementingIDProvider;
pub use transport::{MockServer, MockTransport, SentStanzaHandler, BOUND_JID};

mod connected_client;
mod constant_id_provider;
mod constant_time_provider;
mod element_ext;
mod transport;

pub trait StrExt {
    fn to_xml_result_string(&self) -> String;
}

impl<T> StrExt for T
where
    T: AsRef<str>,
{
    fn to_xml_result_string(&self) -> String {
        let mut result = self.as_ref().to_string();
        result.retain(|c| c != '\n' && c != '\t');
        result.replace("  ", "")
    }
}

#[macro_export]
macro_rules! jid {
    ($jid:expr) => {
        $jid.parse::<jid::Jid>().unwrap()
    };
}

#[macro_export]
macro_rules! bare {
    ($jid:expr) => {
        $jid.parse::<jid::BareJid>().unwrap()
    };
}

#[macro_export]
macro_rules! full {
    ($jid:expr) => {
        $jid.parse::<jid::FullJid>().unwrap()
    };
}

pub trait BareJidTestAdditions {
    fn ours() -> BareJid;
    fn theirs() -> BareJid;
}

impl BareJidTestAdditions for BareJid {
    fn ours() -> BareJid {
        BareJid::new("test@prose.org").unwrap()
    }

    fn theirs() -> BareJid {
        BareJid::new("friend@prose.org").unwrap()
    }
}

/// Routes `tracing` output through the test harness. Safe to call from every test.
pub fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("palaver_xmpp=debug")),
        )
        .try_init();
}
