// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::{client, mods};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BlockList(mods::block_list::Event),
    Bookmark(mods::bookmark::Event),
    Bookmark2(mods::bookmark2::Event),
    Chat(mods::chat::Event),
    Client(client::Event),
    MUC(mods::muc::Event),
    Roster(mods::roster::Event),
}
