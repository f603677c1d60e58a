// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::fmt::{Display, Formatter};

use minidom::{Element, IntoAttributeValue};

use crate::ns;

/// A cursor-based builder for nested XML trees.
///
/// `c` descends into a freshly appended child, `up` returns to its parent and `t` appends a text
/// node to the current element. Children inherit the namespace of their parent unless one is
/// given explicitly via `c_ns`.
///
/// ```
/// # use palaver_xmpp::stanza::StanzaBuilder;
/// let iq = StanzaBuilder::iq("get")
///     .attr("id", "1")
///     .c_ns("query", "jabber:iq:roster")
///     .build();
/// assert_eq!(iq.attr("type"), Some("get"));
/// ```
#[derive(Debug, Clone)]
pub struct StanzaBuilder {
    stack: Vec<Element>,
}

impl StanzaBuilder {
    pub fn new(name: impl AsRef<str>, namespace: impl Into<String>) -> Self {
        StanzaBuilder {
            stack: vec![Element::builder(name.as_ref(), namespace).build()],
        }
    }

    pub fn iq(type_: &str) -> Self {
        Self::new("iq", ns::JABBER_CLIENT).attr("type", type_)
    }

    pub fn message() -> Self {
        Self::new("message", ns::JABBER_CLIENT)
    }

    pub fn presence() -> Self {
        Self::new("presence", ns::JABBER_CLIENT)
    }

    /// Sets an attribute on the current element. `None` values are skipped.
    pub fn attr(mut self, name: impl Into<String>, value: impl IntoAttributeValue) -> Self {
        if let Some(current) = self.stack.last_mut() {
            current.set_attr(name, value);
        }
        self
    }

    /// Appends a child with the namespace of the current element and descends into it.
    pub fn c(self, name: impl AsRef<str>) -> Self {
        let namespace = self.current_ns();
        self.c_ns(name, namespace)
    }

    /// Appends a child with an explicit namespace and descends into it.
    pub fn c_ns(mut self, name: impl AsRef<str>, namespace: impl Into<String>) -> Self {
        self.stack
            .push(Element::builder(name.as_ref(), namespace).build());
        self
    }

    /// Appends a text node to the current element.
    pub fn t(mut self, text: impl Into<String>) -> Self {
        if let Some(current) = self.stack.last_mut() {
            current.append_text_node(text);
        }
        self
    }

    /// Appends a complete element to the current element without descending into it.
    pub fn cnode(mut self, element: impl Into<Element>) -> Self {
        if let Some(current) = self.stack.last_mut() {
            current.append_child(element.into());
        }
        self
    }

    pub fn cnodes(self, elements: impl IntoIterator<Item = Element>) -> Self {
        elements
            .into_iter()
            .fold(self, |builder, element| builder.cnode(element))
    }

    /// Appends `<name>text</name>` to the current element.
    pub fn text_child(self, name: impl AsRef<str>, text: impl Into<String>) -> Self {
        self.c(name).t(text).up()
    }

    /// Returns to the parent of the current element.
    pub fn up(mut self) -> Self {
        if self.stack.len() > 1 {
            if let Some(child) = self.stack.pop() {
                if let Some(parent) = self.stack.last_mut() {
                    parent.append_child(child);
                }
            }
        }
        self
    }

    /// Returns to the root element.
    pub fn root(mut self) -> Self {
        while self.stack.len() > 1 {
            self = self.up();
        }
        self
    }

    pub fn build(self) -> Element {
        let mut root = self.root();
        root.stack.pop().unwrap_or_else(|| Element::builder("empty", ns::JABBER_CLIENT).build())
    }

    fn current_ns(&self) -> String {
        self.stack
            .last()
            .map(|elem| elem.ns())
            .unwrap_or_else(|| ns::JABBER_CLIENT.to_string())
    }
}

impl From<StanzaBuilder> for Element {
    fn from(value: StanzaBuilder) -> Self {
        value.build()
    }
}

impl Display for StanzaBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from(&self.clone().build()))
    }
}
