// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::future::Future;
use std::pin::Pin;

pub use element_ext::{bare_jid_string, parse_bool, ElementBuilderExt, ElementExt};
pub use replay_subject::{ReplayStream, ReplaySubject};
pub use request_error::{ParseError, RequestError};

pub mod element_ext;
mod replay_subject;
mod request_error;

pub type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
