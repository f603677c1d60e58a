// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use minidom::Element;

use crate::ns;
use crate::stanza::StanzaBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorType {
    Auth,
    Cancel,
    Continue,
    Modify,
    Wait,
}

/// RFC 6120 §8.3.3 defined conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum DefinedCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
}

/// The `<error/>` child of a stanza of type `error`.
#[derive(Debug, Clone, PartialEq)]
pub struct StanzaError {
    pub type_: ErrorType,
    pub condition: DefinedCondition,
    pub text: Option<String>,
    pub by: Option<String>,
    /// The `<error/>` element as received.
    pub element: Element,
}

impl StanzaError {
    pub fn new(type_: ErrorType, condition: DefinedCondition) -> Self {
        let element = StanzaBuilder::new("error", ns::JABBER_CLIENT)
            .attr("type", type_.as_ref())
            .c_ns(condition.as_ref(), ns::STANZAS)
            .build();

        StanzaError {
            type_,
            condition,
            text: None,
            by: None,
            element,
        }
    }

    /// Extracts the error from a stanza of type `error`.
    pub fn from_stanza(stanza: &Element) -> Option<Self> {
        stanza
            .children()
            .find(|child| child.name() == "error")
            .map(Self::from_error_element)
    }

    pub fn from_error_element(error: &Element) -> Self {
        let type_ = error
            .attr("type")
            .and_then(|t| ErrorType::from_str(t).ok())
            .unwrap_or(ErrorType::Cancel);

        let condition = error
            .children()
            .filter(|child| child.ns() == ns::STANZAS && child.name() != "text")
            .find_map(|child| DefinedCondition::from_str(child.name()).ok())
            .unwrap_or(DefinedCondition::UndefinedCondition);

        let text = error
            .get_child("text", ns::STANZAS)
            .map(|text| text.text())
            .filter(|text| !text.is_empty());

        StanzaError {
            type_,
            condition,
            text,
            by: error.attr("by").map(ToString::to_string),
            element: error.clone(),
        }
    }
}

impl Display for StanzaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from(&self.element))
    }
}

impl From<StanzaError> for Element {
    fn from(value: StanzaError) -> Self {
        value.element
    }
}
