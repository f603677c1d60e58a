// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use jid::{BareJid, Jid};
use minidom::{Element, ElementBuilder, NSChoice};

use crate::util::ParseError;

pub trait ElementExt {
    fn expect_is<'a>(
        &self,
        name: impl AsRef<str>,
        ns: impl Into<NSChoice<'a>>,
    ) -> Result<(), ParseError>;

    fn attr_req(&self, name: impl AsRef<str>) -> Result<&str, ParseError>;

    fn attr_bool(&self, name: impl AsRef<str>) -> Result<Option<bool>, ParseError>;

    fn attr_jid(&self, name: impl AsRef<str>) -> Result<Option<Jid>, ParseError>;

    fn non_empty_text(&self) -> Option<String>;

    /// Text of the first child named `name` in namespace `ns`.
    fn child_text<'a>(&self, name: &str, ns: impl Into<NSChoice<'a>>) -> Option<String>;

    /// Value of the `from` attribute reduced to a bare JID.
    fn from_bare(&self) -> Option<BareJid>;

    fn is_stanza_of_type(&self, name: &str, type_: &str) -> bool;
}

pub trait ElementBuilderExt {
    fn attr_bool(self, name: impl AsRef<str>, value: bool) -> ElementBuilder;
}

impl ElementExt for Element {
    fn expect_is<'a>(
        &self,
        name: impl AsRef<str>,
        ns: impl Into<NSChoice<'a>>,
    ) -> Result<(), ParseError> {
        let ns = ns.into();
        if !self.is(&name, ns) {
            return Err(ParseError::Generic {
                msg: format!(
                    "Expected element with name {} and namespace {}. Got {} and {} instead.",
                    name.as_ref(),
                    ns_choice_to_string(ns),
                    self.name(),
                    self.ns()
                ),
            });
        }
        Ok(())
    }

    fn attr_req(&self, name: impl AsRef<str>) -> Result<&str, ParseError> {
        self.attr(name.as_ref()).ok_or(ParseError::Generic {
            msg: format!(
                "Missing required attribute {} in element {}.",
                name.as_ref(),
                self.name()
            ),
        })
    }

    fn attr_bool(&self, name: impl AsRef<str>) -> Result<Option<bool>, ParseError> {
        self.attr(name.as_ref()).map(parse_bool).transpose()
    }

    fn attr_jid(&self, name: impl AsRef<str>) -> Result<Option<Jid>, ParseError> {
        Ok(self.attr(name.as_ref()).map(Jid::from_str).transpose()?)
    }

    fn non_empty_text(&self) -> Option<String> {
        let text = self.text();
        (!text.is_empty()).then_some(text)
    }

    fn child_text<'a>(&self, name: &str, ns: impl Into<NSChoice<'a>>) -> Option<String> {
        let ns = ns.into();
        self.children()
            .find(|child| child.is(name, ns))
            .map(|child| child.text())
    }

    fn from_bare(&self) -> Option<BareJid> {
        self.attr("from")
            .and_then(|from| Jid::from_str(from).ok())
            .map(|jid| jid.to_bare())
    }

    fn is_stanza_of_type(&self, name: &str, type_: &str) -> bool {
        self.name() == name && self.attr("type") == Some(type_)
    }
}

impl ElementBuilderExt for ElementBuilder {
    fn attr_bool(self, name: impl AsRef<str>, value: bool) -> ElementBuilder {
        self.attr(name.as_ref(), if value { "true" } else { "false" })
    }
}

pub fn parse_bool(value: impl AsRef<str>) -> Result<bool, ParseError> {
    Ok(match value.as_ref() {
        "true" | "1" => true,
        "false" | "0" => false,
        _ => {
            return Err(ParseError::Generic {
                msg: format!("Unknown boolean value '{}'", value.as_ref()),
            })
        }
    })
}

/// Reduces a JID string to its bare form. Falls back to splitting at the first `/` if the string
/// isn't a valid JID.
pub fn bare_jid_string(jid: &str) -> String {
    match Jid::from_str(jid) {
        Ok(jid) => jid.to_bare().to_string(),
        Err(_) => jid.split('/').next().unwrap_or(jid).to_string(),
    }
}

fn ns_choice_to_string<'a>(ns: impl Into<NSChoice<'a>>) -> String {
    match ns.into() {
        NSChoice::None => "<none>".to_string(),
        NSChoice::OneOf(ns) => ns.to_string(),
        NSChoice::AnyOf(ns_list) => ns_list.join(" or "),
        NSChoice::Any => "<any>".to_string(),
    }
}
