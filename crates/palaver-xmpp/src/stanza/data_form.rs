// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// XEP-0004: Data Forms
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataForm {
    pub type_: String,
    pub title: Option<String>,
    pub instructions: Option<String>,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormField {
    pub var: String,
    pub type_: Option<String>,
    pub label: Option<String>,
    pub values: Vec<String>,
    pub options: Vec<FormOption>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormOption {
    pub label: Option<String>,
    pub value: String,
}

impl DataForm {
    pub fn new(type_: impl Into<String>) -> Self {
        DataForm {
            type_: type_.into(),
            ..Default::default()
        }
    }

    /// A submit form with a hidden `FORM_TYPE` field.
    pub fn submit(form_type: impl Into<String>) -> Self {
        Self::new("submit").with_field(FormField::hidden("FORM_TYPE", form_type))
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, var: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.var == var)
    }

    pub fn field_value(&self, var: &str) -> Option<&str> {
        self.field(var)
            .and_then(|f| f.values.first())
            .map(String::as_str)
    }

    pub fn form_type(&self) -> Option<&str> {
        self.field_value("FORM_TYPE")
    }

    /// Sets the value of a field, adding the field if the form doesn't contain it yet. Fails if the
    /// field exists with a different type.
    pub fn set_field_value(
        &mut self,
        type_: &str,
        var: &str,
        value: impl Into<String>,
    ) -> Result<(), ParseError> {
        let value = value.into();

        if let Some(field) = self.fields.iter_mut().find(|f| f.var == var) {
            if let Some(existing_type) = &field.type_ {
                if existing_type != type_ {
                    return Err(ParseError::Generic {
                        msg: format!(
                            "Field '{}' has type {} but {} was requested.",
                            var, existing_type, type_
                        ),
                    });
                }
            }
            field.values = vec![value];
            return Ok(());
        }

        self.fields.push(FormField {
            var: var.to_string(),
            type_: Some(type_.to_string()),
            values: vec![value],
            ..Default::default()
        });
        Ok(())
    }

    pub fn set_bool(&mut self, var: &str, value: bool) -> Result<(), ParseError> {
        self.set_field_value("boolean", var, if value { "true" } else { "false" })
    }

    /// Converts the form into one that can be submitted: type becomes `submit`, only vars and
    /// values survive.
    pub fn into_submit_form(self) -> DataForm {
        DataForm {
            type_: "submit".to_string(),
            title: None,
            instructions: None,
            fields: self
                .fields
                .into_iter()
                .filter(|f| f.type_.as_deref() != Some("fixed") && !f.var.is_empty())
                .map(|f| FormField {
                    var: f.var,
                    type_: f.type_,
                    label: None,
                    values: f.values,
                    options: vec![],
                })
                .collect(),
        }
    }
}

impl FormField {
    pub fn new(var: impl Into<String>, type_: impl Into<String>) -> Self {
        FormField {
            var: var.into(),
            type_: Some(type_.into()),
            ..Default::default()
        }
    }

    pub fn hidden(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(var, "hidden").with_value(value)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }
}

impl TryFrom<&Element> for DataForm {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("x", ns::DATA_FORMS)?;

        let mut form = DataForm::new(root.attr_req("type")?);

        for child in root.children() {
            match child.name() {
                "title" => form.title = child.non_empty_text(),
                "instructions" => form.instructions = child.non_empty_text(),
                "field" => form.fields.push(FormField::try_from(child)?),
                _ => (),
            }
        }

        Ok(form)
    }
}

impl TryFrom<&Element> for FormField {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        let mut field = FormField {
            var: root.attr("var").unwrap_or_default().to_string(),
            type_: root.attr("type").map(ToString::to_string),
            label: root.attr("label").map(ToString::to_string),
            ..Default::default()
        };

        for child in root.children() {
            match child.name() {
                "value" => field.values.push(child.text()),
                "option" => field.options.push(FormOption {
                    label: child.attr("label").map(ToString::to_string),
                    value: child
                        .get_child("value", ns::DATA_FORMS)
                        .map(|v| v.text())
                        .unwrap_or_default(),
                }),
                _ => (),
            }
        }

        Ok(field)
    }
}

impl From<DataForm> for Element {
    fn from(value: DataForm) -> Self {
        let mut builder = StanzaBuilder::new("x", ns::DATA_FORMS).attr("type", value.type_);

        if let Some(title) = value.title {
            builder = builder.text_child("title", title);
        }
        if let Some(instructions) = value.instructions {
            builder = builder.text_child("instructions", instructions);
        }

        for field in value.fields {
            builder = builder
                .c("field")
                .attr("var", field.var)
                .attr("type", field.type_)
                .attr("label", field.label);
            for value in field.values {
                builder = builder.text_child("value", value);
            }
            builder = builder.up();
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_and_modify_form() -> Result<()> {
        let elem = Element::from_str(
            r#"<x xmlns="jabber:x:data" type="form">
                <title>Configuration</title>
                <field var="FORM_TYPE" type="hidden"><value>http://jabber.org/protocol/muc#roomconfig</value></field>
                <field var="muc#roomconfig_roomname" type="text-single" label="Name"><value/></field>
                <field var="muc#roomconfig_whois" type="list-single">
                    <value>moderators</value>
                    <option label="Anyone"><value>anyone</value></option>
                </field>
                <field type="fixed"><value>Info</value></field>
            </x>"#,
        )?;

        let mut form = DataForm::try_from(&elem)?;
        assert_eq!(form.title.as_deref(), Some("Configuration"));
        assert_eq!(form.form_type(), Some(ns::MUC_ROOMCONFIG));
        assert_eq!(form.field("muc#roomconfig_whois").map(|f| f.options.len()), Some(1));

        form.set_field_value("text-single", "muc#roomconfig_roomname", "Room")?;
        form.set_bool("muc#roomconfig_publicroom", true)?;
        assert!(form
            .set_field_value("boolean", "muc#roomconfig_whois", "true")
            .is_err());

        let submit = form.into_submit_form();
        assert_eq!(submit.type_, "submit");
        assert_eq!(submit.field_value("muc#roomconfig_roomname"), Some("Room"));
        assert_eq!(submit.field_value("muc#roomconfig_publicroom"), Some("true"));
        assert_eq!(submit.fields.len(), 4);

        let reparsed = DataForm::try_from(&Element::from(submit.clone()))?;
        assert_eq!(reparsed, submit);
        Ok(())
    }
}
