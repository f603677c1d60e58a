// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

pub use contact::{Contact, Subscription};
pub use invitation::{Invitation, InvitationKind};
pub use message::{ChatMessage, MessageKind, MessageStore};
pub use presence::{Availability, Presence, Show};
pub use room::{Room, RoomOccupant};
pub use store::{Contacts, Conversations, Rooms, SessionStore};

mod contact;
mod invitation;
mod message;
mod presence;
mod room;
mod store;
