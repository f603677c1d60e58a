// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::Jid;
use minidom::Element;

use crate::ns;
use crate::stanza::{DataForm, StanzaBuilder};
use crate::util::{ElementExt, ParseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub category: String,
    pub type_: String,
    pub name: Option<String>,
}

/// XEP-0030 `disco#info` result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiscoInfo {
    pub node: Option<String>,
    pub identities: Vec<Identity>,
    pub features: Vec<String>,
    /// XEP-0128 extended info.
    pub forms: Vec<DataForm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoItem {
    pub jid: Jid,
    pub node: Option<String>,
    pub name: Option<String>,
}

impl Identity {
    pub fn new(category: impl Into<String>, type_: impl Into<String>) -> Self {
        Identity {
            category: category.into(),
            type_: type_.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl DiscoInfo {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn has_identity(&self, category: &str, type_: &str) -> bool {
        self.identities
            .iter()
            .any(|identity| identity.category == category && identity.type_ == type_)
    }

    /// The extended info form with the given `FORM_TYPE`.
    pub fn form(&self, form_type: &str) -> Option<&DataForm> {
        self.forms
            .iter()
            .find(|form| form.form_type() == Some(form_type))
    }

    pub fn request(node: Option<&str>) -> Element {
        StanzaBuilder::new("query", ns::DISCO_INFO)
            .attr("node", node)
            .build()
    }
}

impl DiscoItem {
    pub fn request(node: Option<&str>) -> Element {
        StanzaBuilder::new("query", ns::DISCO_ITEMS)
            .attr("node", node)
            .build()
    }

    /// Parses the items of a `disco#items` result.
    pub fn parse_items(query: &Element) -> Result<Vec<DiscoItem>, ParseError> {
        query.expect_is("query", ns::DISCO_ITEMS)?;

        query
            .children()
            .filter(|child| child.is("item", ns::DISCO_ITEMS))
            .map(|item| -> Result<DiscoItem, ParseError> {
                Ok(DiscoItem {
                    jid: item.attr_req("jid")?.parse()?,
                    node: item.attr("node").map(ToString::to_string),
                    name: item.attr("name").map(ToString::to_string),
                })
            })
            .collect()
    }
}

impl TryFrom<&Element> for DiscoInfo {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("query", ns::DISCO_INFO)?;

        let mut info = DiscoInfo {
            node: root.attr("node").map(ToString::to_string),
            ..Default::default()
        };

        for child in root.children() {
            match child.name() {
                "identity" => info.identities.push(Identity {
                    category: child.attr_req("category")?.to_string(),
                    type_: child.attr_req("type")?.to_string(),
                    name: child.attr("name").map(ToString::to_string),
                }),
                "feature" => info.features.push(child.attr_req("var")?.to_string()),
                "x" if child.ns() == ns::DATA_FORMS => info.forms.push(DataForm::try_from(child)?),
                _ => (),
            }
        }

        Ok(info)
    }
}

impl From<DiscoInfo> for Element {
    fn from(value: DiscoInfo) -> Self {
        let mut builder = StanzaBuilder::new("query", ns::DISCO_INFO).attr("node", value.node);

        for identity in value.identities {
            builder = builder
                .c("identity")
                .attr("category", identity.category)
                .attr("type", identity.type_)
                .attr("name", identity.name)
                .up();
        }
        for feature in value.features {
            builder = builder.c("feature").attr("var", feature).up();
        }

        builder.cnodes(value.forms.into_iter().map(Element::from)).build()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_info() -> Result<()> {
        let xml = r#"<query xmlns="http://jabber.org/protocol/disco#info">
            <identity category="conference" type="text" name="Chatrooms"/>
            <feature var="http://jabber.org/protocol/muc"/>
            <x xmlns="jabber:x:data" type="result">
              <field var="FORM_TYPE" type="hidden"><value>urn:xmpp:http:upload:0</value></field>
              <field var="max-file-size"><value>1024</value></field>
            </x>
        </query>"#;

        let info = DiscoInfo::try_from(&Element::from_str(xml)?)?;

        assert!(info.has_identity("conference", "text"));
        assert!(info.has_feature(ns::MUC));
        assert_eq!(
            info.form(ns::HTTP_UPLOAD)
                .and_then(|form| form.field_value("max-file-size")),
            Some("1024")
        );
        Ok(())
    }

    #[test]
    fn test_parse_items() -> Result<()> {
        let xml = r#"<query xmlns="http://jabber.org/protocol/disco#items">
            <item jid="conference.prose.org" name="Rooms"/>
            <item jid="upload.prose.org"/>
        </query>"#;

        let items = DiscoItem::parse_items(&Element::from_str(xml)?)?;

        assert_eq!(
            items
                .iter()
                .map(|item| item.jid.to_string())
                .collect::<Vec<_>>(),
            vec!["conference.prose.org", "upload.prose.org"]
        );
        assert_eq!(items[0].name.as_deref(), Some("Rooms"));
        Ok(())
    }
}
