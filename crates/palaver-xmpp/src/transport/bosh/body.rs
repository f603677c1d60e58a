// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Write};

use minidom::Element;

use crate::ns;

/// A BOSH `<body/>` wrapper.
///
/// Bodies are serialized by hand so that the `xmpp:`-prefixed attributes are written verbatim and
/// attributes always appear in sorted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    attrs: BTreeMap<String, String>,
    children: Vec<Element>,
}

impl Body {
    pub fn new(rid: u32, sid: Option<&str>) -> Self {
        let mut body = Body {
            attrs: BTreeMap::new(),
            children: vec![],
        };
        body.set_attr("xmlns", ns::HTTPBIND);
        body.set_rid(rid);
        if let Some(sid) = sid {
            body.set_attr("sid", sid);
        }
        body
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attrs.insert(name.to_string(), value.into());
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn set_rid(&mut self, rid: u32) {
        self.set_attr("rid", rid.to_string())
    }

    pub fn rid(&self) -> Option<u32> {
        self.get_attr("rid").and_then(|rid| rid.parse().ok())
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(child)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("<body")?;
        for (name, value) in self.attrs.iter() {
            write!(f, " {}='{}'", name, escape(value))?;
        }
        if self.children.is_empty() {
            return f.write_str("/>");
        }
        f.write_char('>')?;
        for child in self.children.iter() {
            f.write_str(&String::from(child))?;
        }
        f.write_str("</body>")
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '\'' => escaped.push_str("&apos;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_serializes_sorted_attributes() {
        let body = Body::new(42, Some("abc"))
            .attr("xmpp:restart", "true")
            .attr("to", "prose.org<");
        assert_eq!(
            body.to_string(),
            "<body rid='42' sid='abc' to='prose.org&lt;' xmlns='http://jabber.org/protocol/httpbind' xmpp:restart='true'/>"
        );
    }

    #[test]
    fn test_serializes_children() {
        let mut body = Body::new(1, None);
        body.push(
            Element::builder("presence", ns::JABBER_CLIENT)
                .attr("type", "unavailable")
                .build(),
        );

        let serialized = body.to_string();
        assert!(serialized.starts_with("<body rid='1' xmlns='http://jabber.org/protocol/httpbind'><presence"));
        assert!(serialized.ends_with("</body>"));
        assert!(serialized.contains("jabber:client"));
    }
}
