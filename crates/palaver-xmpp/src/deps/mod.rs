// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use id_provider::{IDProvider, UUIDProvider};
pub use key_value_store::{KeyValueStore, MemoryKeyValueStore};
pub use time_provider::{SystemTimeProvider, TimeProvider};

mod id_provider;
mod key_value_store;
mod time_provider;
