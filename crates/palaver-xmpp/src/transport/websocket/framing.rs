// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

//! RFC 7395 framing. Every WebSocket message carries exactly one `<open/>`, `<close/>` or stanza.

use std::str::FromStr;

use minidom::Element;

use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::transport::TransportError;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Open(Element),
    Close { see_other_uri: Option<String> },
    Element(Element),
    /// An XML declaration or whitespace keepalive.
    Empty,
}

pub fn open_frame(domain: &str) -> Element {
    StanzaBuilder::new("open", ns::FRAMING)
        .attr("to", domain)
        .attr("version", "1.0")
        .build()
}

pub fn close_frame() -> Element {
    StanzaBuilder::new("close", ns::FRAMING).build()
}

/// Parses a single frame. Frames are parsed inside a wrapper that declares `jabber:client` as
/// default namespace and the `stream` prefix, since servers rely on both being in scope.
pub fn parse_frame(text: &str) -> Result<Frame, TransportError> {
    let text = strip_xml_declarations(text).trim();
    if text.is_empty() {
        return Ok(Frame::Empty);
    }

    let wrapped = format!(
        r#"<wrapper xmlns="{}" xmlns:stream="{}">{}</wrapper>"#,
        ns::JABBER_CLIENT,
        ns::STREAM,
        text
    );
    let wrapper = Element::from_str(&wrapped)?;

    let Some(elem) = wrapper.children().next() else {
        return Ok(Frame::Empty);
    };

    Ok(match elem.name() {
        "open" => Frame::Open(elem.clone()),
        "close" if elem.ns() == ns::FRAMING => Frame::Close {
            see_other_uri: elem.attr("see-other-uri").map(ToString::to_string),
        },
        _ => Frame::Element(elem.clone()),
    })
}

/// Validates the server's `<open/>`.
pub fn check_stream_start(open: &Element) -> Result<(), String> {
    let mut error = None;

    if open.ns() != ns::FRAMING {
        error = Some(format!("Wrong xmlns in <open />: {}", open.ns()));
    }

    match open.attr("version") {
        None => error = Some("Missing version in <open />".to_string()),
        Some("1.0") => (),
        Some(version) => error = Some(format!("Wrong version in <open />: {}", version)),
    }

    match error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Whether following a `see-other-uri` from `service` to `target` keeps the security level.
/// `ws:` services may go anywhere, `wss:` services only to other `wss:` URLs.
pub fn is_secure_redirect(service: &str, target: &str) -> bool {
    service.starts_with("ws:") || (service.starts_with("wss:") && target.starts_with("wss:"))
}

fn strip_xml_declarations(mut text: &str) -> &str {
    loop {
        let trimmed = text.trim_start();
        if !trimmed.starts_with("<?") {
            return trimmed;
        }
        match trimmed.find("?>") {
            Some(end) => text = &trimmed[end + 2..],
            None => return trimmed,
        }
    }
}
