// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::io::Write;
use std::str::FromStr as _;

use anyhow::Result;
use minidom::Element;
use xml::reader::XmlEvent;
use xml::{EmitterConfig, ParserConfig};

/// Converts between elements and indented XML so that expectations in tests stay readable.
pub trait ElementExt {
    fn from_pretty_printed_xml(xml: &str) -> Result<Element>;
    fn to_pretty_printed_xml(&self) -> Result<String>;
}

impl ElementExt for Element {
    fn from_pretty_printed_xml(xml: &str) -> Result<Element> {
        let mut buf = Vec::new();
        reformat(&mut buf, xml.as_bytes(), false)?;
        Ok(Element::from_str(&String::from_utf8(buf)?)?)
    }

    fn to_pretty_printed_xml(&self) -> Result<String> {
        let xml = String::from(self);
        let mut buf = Vec::new();
        reformat(&mut buf, xml.as_bytes(), true)?;
        Ok(String::from_utf8(buf)?)
    }
}

fn reformat(writer: &mut impl Write, xml: &[u8], pretty: bool) -> Result<()> {
    let reader = ParserConfig::new()
        .trim_whitespace(true)
        .ignore_comments(!pretty)
        .create_reader(xml);

    let mut writer = EmitterConfig::new()
        .perform_indent(pretty)
        .normalize_empty_elements(true)
        .autopad_comments(false)
        .write_document_declaration(false)
        .create_writer(writer);

    for event in reader {
        let event = event?;
        if let XmlEvent::StartDocument { .. } = event {
            continue;
        }
        if let Some(event) = event.as_writer_event() {
            writer.write(event)?;
        }
    }
    Ok(())
}
