// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use chrono::{DateTime, SecondsFormat, Utc};
use jid::Jid;
use minidom::Element;

use crate::ns;
use crate::stanza::{DataForm, FormField, Forwarded, ResultSet, StanzaBuilder};
use crate::util::{ElementExt, ParseError};

// https://xmpp.org/extensions/xep-0313.html

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MamQuery {
    pub with: Option<Jid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub rsm: Option<ResultSet>,
}

/// A `<result/>` of a running query.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedMessage {
    pub query_id: Option<String>,
    /// The archive id, identical to the server-assigned stanza-id.
    pub id: String,
    pub forwarded: Forwarded,
}

/// The `<fin/>` that completes a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fin {
    pub complete: bool,
    pub set: ResultSet,
}

impl MamQuery {
    pub fn with_rsm(mut self, rsm: ResultSet) -> Self {
        self.rsm = Some(rsm);
        self
    }

    pub fn into_element(self, query_id: impl Into<String>) -> Element {
        let mut form = DataForm::submit(ns::MAM);

        if let Some(with) = self.with {
            form = form.with_field(FormField::new("with", "jid-single").with_value(with.to_string()));
        }
        if let Some(start) = self.start {
            form = form.with_field(
                FormField::new("start", "text-single")
                    .with_value(start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        if let Some(end) = self.end {
            form = form.with_field(
                FormField::new("end", "text-single")
                    .with_value(end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }

        StanzaBuilder::new("query", ns::MAM)
            .attr("queryid", query_id.into())
            .cnode(form)
            .cnodes(self.rsm.map(Element::from))
            .build()
    }
}

impl ArchivedMessage {
    /// Extracts the archived message from a result `<message/>`. Returns `None` for other messages.
    pub fn from_message(message: &Element) -> Result<Option<Self>, ParseError> {
        let Some(result) = message.get_child("result", ns::MAM) else {
            return Ok(None);
        };

        let forwarded = result
            .get_child("forwarded", ns::FORWARD)
            .ok_or(ParseError::Generic {
                msg: "Missing forwarded in archived message".to_string(),
            })?;

        Ok(Some(ArchivedMessage {
            query_id: result.attr("queryid").map(ToString::to_string),
            id: result.attr_req("id")?.to_string(),
            forwarded: Forwarded::try_from(forwarded)?,
        }))
    }
}

impl TryFrom<&Element> for Fin {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("fin", ns::MAM)?;

        Ok(Fin {
            complete: root.attr_bool("complete")?.unwrap_or(false),
            set: root
                .get_child("set", ns::RSM)
                .map(ResultSet::try_from)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}
