// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use minidom::Element;
use serde::{Deserialize, Serialize};

use crate::ns;
use crate::util::ElementExt;

/// The `<show/>` value of a presence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Show {
    Chat,
    Away,
    Dnd,
    Xa,
}

/// Availability of a contact, aggregated over all of its resources.
///
/// Variants are ordered by precedence, i.e. `Available > Away > Unavailable`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Unavailable,
    Away,
    Available,
}

impl From<Option<Show>> for Availability {
    fn from(value: Option<Show>) -> Self {
        match value {
            None | Some(Show::Chat) => Availability::Available,
            Some(Show::Away) | Some(Show::Dnd) | Some(Show::Xa) => Availability::Away,
        }
    }
}

/// The last presence received from a single resource.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Presence {
    pub show: Option<Show>,
    pub status: Option<String>,
    pub priority: i8,
}

impl Presence {
    pub fn availability(&self) -> Availability {
        self.show.into()
    }
}

impl From<&Element> for Presence {
    fn from(stanza: &Element) -> Self {
        Presence {
            show: stanza
                .child_text("show", ns::JABBER_CLIENT)
                .and_then(|show| Show::from_str(show.trim()).ok()),
            status: stanza
                .child_text("status", ns::JABBER_CLIENT)
                .filter(|status| !status.is_empty()),
            priority: stanza
                .child_text("priority", ns::JABBER_CLIENT)
                .and_then(|priority| priority.trim().parse().ok())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_availability_from_show() {
        assert_eq!(Availability::from(None), Availability::Available);
        assert_eq!(Availability::from(Some(Show::Chat)), Availability::Available);
        assert_eq!(Availability::from(Some(Show::Away)), Availability::Away);
        assert_eq!(Availability::from(Some(Show::Dnd)), Availability::Away);
        assert_eq!(Availability::from(Some(Show::Xa)), Availability::Away);
    }

    #[test]
    fn test_availability_precedence() {
        assert!(Availability::Available > Availability::Away);
        assert!(Availability::Away > Availability::Unavailable);
    }

    #[test]
    fn test_parses_presence() -> Result<()> {
        let stanza = Element::from_str(
            r#"<presence xmlns="jabber:client" from="a@prose.org/x"><show>dnd</show><status>Busy</status><priority>5</priority></presence>"#,
        )?;

        assert_eq!(
            Presence::from(&stanza),
            Presence {
                show: Some(Show::Dnd),
                status: Some("Busy".to_string()),
                priority: 5,
            }
        );
        Ok(())
    }
}
