// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;

use jid::BareJid;
use serde::{Deserialize, Serialize};

use crate::models::{Availability, MessageStore, Presence};

/// RFC 6121 subscription state of a roster item.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::Display,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    #[default]
    None,
    /// We receive the contact's presence.
    To,
    /// The contact receives our presence.
    From,
    Both,
}

impl Subscription {
    pub fn has_to(&self) -> bool {
        matches!(self, Subscription::To | Subscription::Both)
    }

    pub fn has_from(&self) -> bool {
        matches!(self, Subscription::From | Subscription::Both)
    }

    pub fn adding_to(self) -> Self {
        match self {
            Subscription::None | Subscription::To => Subscription::To,
            Subscription::From | Subscription::Both => Subscription::Both,
        }
    }

    pub fn adding_from(self) -> Self {
        match self {
            Subscription::None | Subscription::From => Subscription::From,
            Subscription::To | Subscription::Both => Subscription::Both,
        }
    }

    pub fn removing_to(self) -> Self {
        match self {
            Subscription::None | Subscription::To => Subscription::None,
            Subscription::From | Subscription::Both => Subscription::From,
        }
    }

    pub fn removing_from(self) -> Self {
        match self {
            Subscription::None | Subscription::From => Subscription::None,
            Subscription::To | Subscription::Both => Subscription::To,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub jid: BareJid,
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub subscription: Subscription,
    /// We asked for a subscription that hasn't been answered yet.
    pub pending_out: bool,
    /// The contact asked for a subscription that we haven't answered yet.
    pub pending_in: bool,
    /// Last presence per resource.
    pub presences: BTreeMap<String, Presence>,
    pub messages: MessageStore,
}

impl Contact {
    pub fn new(jid: BareJid) -> Self {
        Contact {
            jid,
            name: None,
            groups: vec![],
            subscription: Subscription::None,
            pending_out: false,
            pending_in: false,
            presences: Default::default(),
            messages: Default::default(),
        }
    }

    /// The best availability over all resources.
    pub fn availability(&self) -> Availability {
        self.presences
            .values()
            .map(Presence::availability)
            .max()
            .unwrap_or_default()
    }

    pub fn clear_presences(&mut self) {
        self.presences.clear()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use crate::models::Show;

    use super::*;

    #[test]
    fn test_subscription_transitions() {
        assert_eq!(Subscription::None.adding_to(), Subscription::To);
        assert_eq!(Subscription::From.adding_to(), Subscription::Both);
        assert_eq!(Subscription::To.adding_from(), Subscription::Both);
        assert_eq!(Subscription::Both.removing_to(), Subscription::From);
        assert_eq!(Subscription::Both.removing_from(), Subscription::To);
        assert_eq!(Subscription::From.removing_from(), Subscription::None);
    }

    #[test]
    fn test_aggregates_presence_over_resources() {
        let mut contact = Contact::new(BareJid::from_str("friend@prose.org").unwrap());
        assert_eq!(contact.availability(), Availability::Unavailable);

        contact.presences.insert(
            "phone".to_string(),
            Presence {
                show: Some(Show::Xa),
                ..Default::default()
            },
        );
        assert_eq!(contact.availability(), Availability::Away);

        contact.presences.insert(
            "desktop".to_string(),
            Presence {
                show: Some(Show::Chat),
                ..Default::default()
            },
        );
        assert_eq!(contact.availability(), Availability::Available);

        contact.presences.remove("desktop");
        assert_eq!(contact.availability(), Availability::Away);
    }
}
