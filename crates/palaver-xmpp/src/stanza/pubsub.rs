// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::Jid;
use minidom::Element;

use crate::ns;
use crate::stanza::{DataForm, FormField};
use crate::util::{ElementExt, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub struct PubSubItem {
    pub id: Option<String>,
    pub payload: Option<Element>,
}

/// XEP-0060 §7.1.5 publish options.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishOptions {
    pub persist_items: Option<bool>,
    pub access_model: Option<AccessModel>,
    /// `max` or a number.
    pub max_items: Option<String>,
    pub send_last_published_item: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum AccessModel {
    Open,
    Presence,
    Roster,
    Authorize,
    Whitelist,
}

/// The `<event/>` of a pubsub notification (XEP-0060 §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubEvent {
    pub from: Jid,
    pub node: String,
    pub published: Vec<PubSubItem>,
    pub retracted: Vec<String>,
    pub purged: bool,
    pub deleted: bool,
}

impl PubSubItem {
    pub fn new(id: Option<String>, payload: Element) -> Self {
        PubSubItem {
            id,
            payload: Some(payload),
        }
    }

    /// Parses an `<item/>` of any of the pubsub namespaces.
    pub fn from_element(item: &Element) -> Self {
        PubSubItem {
            id: item.attr("id").map(ToString::to_string),
            payload: item.children().next().cloned(),
        }
    }

    pub(crate) fn into_element(self, namespace: &str) -> Element {
        let mut builder = Element::builder("item", namespace);
        if let Some(id) = self.id {
            builder = builder.attr("id", id);
        }
        if let Some(payload) = self.payload {
            builder = builder.append(payload);
        }
        builder.build()
    }
}

impl PublishOptions {
    /// Options for data only we may read, e.g. bookmarks.
    pub fn private() -> Self {
        PublishOptions {
            persist_items: Some(true),
            access_model: Some(AccessModel::Whitelist),
            ..Default::default()
        }
    }

    pub fn with_max_items(mut self, max_items: impl Into<String>) -> Self {
        self.max_items = Some(max_items.into());
        self
    }

    pub fn with_send_last_published_item(mut self, value: impl Into<String>) -> Self {
        self.send_last_published_item = Some(value.into());
        self
    }
}

impl From<PublishOptions> for DataForm {
    fn from(value: PublishOptions) -> Self {
        let mut form = DataForm::submit(ns::PUBSUB_PUBLISH_OPTIONS);

        if let Some(persist_items) = value.persist_items {
            form = form.with_field(
                FormField::new("pubsub#persist_items", "boolean")
                    .with_value(if persist_items { "true" } else { "false" }),
            );
        }
        if let Some(access_model) = value.access_model {
            form = form.with_field(
                FormField::new("pubsub#access_model", "list-single")
                    .with_value(access_model.as_ref()),
            );
        }
        if let Some(max_items) = value.max_items {
            form = form.with_field(FormField::new("pubsub#max_items", "text-single").with_value(max_items));
        }
        if let Some(send_last) = value.send_last_published_item {
            form = form.with_field(
                FormField::new("pubsub#send_last_published_item", "list-single")
                    .with_value(send_last),
            );
        }

        form
    }
}

impl PubSubEvent {
    /// Extracts the pubsub events of a `<message/>`. Returns an empty list for other messages.
    pub fn from_message(message: &Element) -> Result<Vec<Self>, ParseError> {
        let events = message
            .children()
            .filter(|child| child.is("event", ns::PUBSUB_EVENT))
            .collect::<Vec<_>>();

        if events.is_empty() {
            return Ok(vec![]);
        }

        let from = message.attr_jid("from")?.ok_or(ParseError::Generic {
            msg: "Missing from in PubSub message".to_string(),
        })?;

        let mut result = vec![];

        for event in events {
            for child in event.children() {
                let node = child.attr("node").unwrap_or_default().to_string();
                let mut parsed = PubSubEvent {
                    from: from.clone(),
                    node,
                    published: vec![],
                    retracted: vec![],
                    purged: false,
                    deleted: false,
                };

                match child.name() {
                    "items" => {
                        for item in child.children() {
                            match item.name() {
                                "item" => parsed.published.push(PubSubItem::from_element(item)),
                                "retract" => parsed.retracted.push(item.attr_req("id")?.to_string()),
                                _ => (),
                            }
                        }
                    }
                    "purge" => parsed.purged = true,
                    "delete" => parsed.deleted = true,
                    _ => continue,
                }

                result.push(parsed);
            }
        }

        Ok(result)
    }
}
