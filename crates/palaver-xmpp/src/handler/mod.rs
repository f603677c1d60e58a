// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use dispatch::{
    service_unavailable_reply, AsyncJob, Dispatched, HandlerDispatch, HandlerRef, HandlerScope,
};
pub use matcher::Matcher;

mod dispatch;
mod matcher;
