// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::util::bare_jid_string;

/// Describes which stanzas a handler is interested in. Every dimension that is set must match,
/// unset dimensions match anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matcher {
    ns: Option<String>,
    name: Option<String>,
    types: Vec<String>,
    id: Option<String>,
    from: Option<String>,
    match_bare_from: bool,
    ignore_namespace_fragment: bool,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matches if either the stanza itself or one of its immediate children lives in `ns`.
    pub fn ns(mut self, ns: impl Into<String>) -> Self {
        self.ns = Some(ns.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn type_(mut self, type_: impl Into<String>) -> Self {
        self.types = vec![type_.into()];
        self
    }

    /// Matches if the `type` attribute equals any of `types`.
    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        let from = from.into();
        self.from = Some(if self.match_bare_from {
            bare_jid_string(&from)
        } else {
            from
        });
        self
    }

    /// Compares `from` after reducing both sides to their bare JID.
    pub fn match_bare_from(mut self) -> Self {
        self.match_bare_from = true;
        self.from = self.from.map(|from| bare_jid_string(&from));
        self
    }

    /// Strips everything after `#` from the stanza's namespaces before comparing.
    pub fn ignore_namespace_fragment(mut self) -> Self {
        self.ignore_namespace_fragment = true;
        self
    }

    pub fn matches(&self, elem: &Element) -> bool {
        self.matches_name(elem)
            && self.matches_ns(elem)
            && self.matches_type(elem)
            && self.matches_id(elem)
            && self.matches_from(elem)
    }

    fn matches_name(&self, elem: &Element) -> bool {
        self.name.as_deref().map_or(true, |name| elem.name() == name)
    }

    fn matches_ns(&self, elem: &Element) -> bool {
        let Some(ns) = &self.ns else {
            return true;
        };

        if self.namespace_of(elem) == *ns {
            return true;
        }

        elem.children().any(|child| self.namespace_of(child) == *ns)
    }

    fn matches_type(&self, elem: &Element) -> bool {
        if self.types.is_empty() {
            return true;
        }
        elem.attr("type")
            .map_or(false, |type_| self.types.iter().any(|t| t == type_))
    }

    fn matches_id(&self, elem: &Element) -> bool {
        self.id
            .as_deref()
            .map_or(true, |id| elem.attr("id") == Some(id))
    }

    fn matches_from(&self, elem: &Element) -> bool {
        let Some(from) = &self.from else {
            return true;
        };
        let Some(elem_from) = elem.attr("from") else {
            return false;
        };
        if self.match_bare_from {
            bare_jid_string(elem_from) == *from
        } else {
            elem_from == from
        }
    }

    fn namespace_of(&self, elem: &Element) -> String {
        let ns = elem.ns();
        if !self.ignore_namespace_fragment {
            return ns;
        }
        match ns.split_once('#') {
            Some((base, _)) => base.to_string(),
            None => ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;

    use super::*;

    #[test]
    fn test_matches_child_namespace() -> Result<()> {
        let iq = Element::from_str(
            r#"<iq xmlns="jabber:client" type="set" id="1"><query xmlns="jabber:iq:roster"/></iq>"#,
        )?;

        assert!(Matcher::new().ns("jabber:iq:roster").matches(&iq));
        assert!(Matcher::new().ns("jabber:client").matches(&iq));
        assert!(!Matcher::new().ns("urn:xmpp:ping").matches(&iq));
        assert!(Matcher::new()
            .ns("jabber:iq:roster")
            .name("iq")
            .types(["get", "set"])
            .id("1")
            .matches(&iq));
        assert!(!Matcher::new().type_("get").matches(&iq));
        Ok(())
    }

    #[test]
    fn test_ignores_namespace_fragment() -> Result<()> {
        let iq = Element::from_str(
            r#"<iq xmlns="jabber:client" type="get"><query xmlns="http://jabber.org/protocol/disco#info"/></iq>"#,
        )?;

        assert!(!Matcher::new()
            .ns("http://jabber.org/protocol/disco")
            .matches(&iq));
        assert!(Matcher::new()
            .ns("http://jabber.org/protocol/disco")
            .ignore_namespace_fragment()
            .matches(&iq));
        Ok(())
    }

    #[test]
    fn test_matches_bare_from() -> Result<()> {
        let presence =
            Element::from_str(r#"<presence xmlns="jabber:client" from="a@b/res"/>"#)?;

        assert!(!Matcher::new().from("a@b").matches(&presence));
        assert!(Matcher::new().from("a@b/res").matches(&presence));
        assert!(Matcher::new()
            .match_bare_from()
            .from("a@b/other")
            .matches(&presence));
        assert!(Matcher::new()
            .from("a@b")
            .match_bare_from()
            .matches(&presence));
        Ok(())
    }
}
