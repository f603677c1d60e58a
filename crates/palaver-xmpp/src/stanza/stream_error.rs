// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::ns;

/// A `<stream:error/>`. Receiving one means the server is about to close the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamError {
    pub condition: String,
    pub text: Option<String>,
}

impl StreamError {
    pub fn from_element(elem: &Element) -> Option<Self> {
        if !elem.is("error", ns::STREAM) {
            return None;
        }

        let condition = elem
            .children()
            .find(|child| child.ns() == ns::XMPP_STREAMS && child.name() != "text")
            .map(|child| child.name().to_string())
            .unwrap_or_else(|| "undefined-condition".to_string());

        let text = elem
            .get_child("text", ns::XMPP_STREAMS)
            .map(|text| text.text())
            .filter(|text| !text.is_empty());

        Some(StreamError { condition, text })
    }
}
