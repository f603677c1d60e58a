// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use bookmark::{Conference, ConferenceBookmark};
pub use builder::StanzaBuilder;
pub use data_form::{DataForm, FormField, FormOption};
pub use disco::{DiscoInfo, DiscoItem, Identity};
pub use message::{origin_id, stanza_id, Delay, Forwarded};
pub use pubsub::{PubSubEvent, PubSubItem, PublishOptions};
pub use roster::{ItemSubscription, RosterItem};
pub use rsm::ResultSet;
pub use stanza_error::{DefinedCondition, ErrorType, StanzaError};
pub use stream_error::StreamError;

pub mod bookmark;
mod builder;
mod data_form;
mod disco;
pub mod mam;
pub mod message;
pub mod muc;
pub mod ns;
pub mod pubsub;
mod roster;
mod rsm;
mod stanza_error;
mod stream_error;
