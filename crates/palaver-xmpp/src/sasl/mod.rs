// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use anonymous::Anonymous;
pub use engine::{advertised_mechanisms, SaslEngine, SaslExchange, SaslStep};
pub use error::SaslError;
pub use external::External;
pub use mechanism::{Mechanism, SaslSession};
pub use oauth::{OAuthBearer, XOAuth2};
pub use plain::Plain;
pub use scram::{Scram, ScramHash};

mod anonymous;
mod engine;
mod error;
mod external;
mod mechanism;
mod oauth;
mod plain;
mod scram;
