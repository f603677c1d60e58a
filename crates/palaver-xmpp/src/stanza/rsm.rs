// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;

use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// XEP-0059 result set. `before: Some("")` serializes as an empty `<before/>` which requests the
/// last page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub max: Option<usize>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
    pub count: Option<usize>,
}

impl ResultSet {
    pub fn last_page(max: usize) -> Self {
        ResultSet {
            max: Some(max),
            before: Some(String::new()),
            ..Default::default()
        }
    }

    /// The page preceding the item `before`. An empty id requests the last page.
    pub fn before(max: usize, before: impl Into<String>) -> Self {
        ResultSet {
            max: Some(max),
            before: Some(before.into()),
            ..Default::default()
        }
    }

    pub fn after(max: usize, after: Option<String>) -> Self {
        ResultSet {
            max: Some(max),
            after,
            ..Default::default()
        }
    }
}

impl From<ResultSet> for Element {
    fn from(value: ResultSet) -> Self {
        let mut builder = StanzaBuilder::new("set", ns::RSM);

        if let Some(max) = value.max {
            builder = builder.text_child("max", max.to_string());
        }
        if let Some(after) = value.after {
            builder = builder.text_child("after", after);
        }
        if let Some(before) = value.before {
            builder = if before.is_empty() {
                builder.c("before").up()
            } else {
                builder.text_child("before", before)
            };
        }

        builder.build()
    }
}

impl TryFrom<&Element> for ResultSet {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("set", ns::RSM)?;

        Ok(ResultSet {
            max: root
                .child_text("max", ns::RSM)
                .map(|max| max.parse())
                .transpose()?,
            before: root.child_text("before", ns::RSM),
            after: root.child_text("after", ns::RSM),
            first: root.child_text("first", ns::RSM),
            last: root.child_text("last", ns::RSM),
            count: root
                .child_text("count", ns::RSM)
                .map(|count| count.parse())
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_before_requests_last_page() -> Result<()> {
        let set = Element::from(ResultSet::last_page(250));
        assert_eq!(
            set,
            Element::from_str(
                r#"<set xmlns="http://jabber.org/protocol/rsm"><max>250</max><before/></set>"#
            )?
        );
        Ok(())
    }

    #[test]
    fn test_parses_fin_set() -> Result<()> {
        let set = Element::from_str(
            r#"<set xmlns="http://jabber.org/protocol/rsm"><first index="0">28482-98726-73623</first><last>09af3-cc343-b409f</last><count>20</count></set>"#,
        )?;
        let set = ResultSet::try_from(&set)?;
        assert_eq!(set.first.as_deref(), Some("28482-98726-73623"));
        assert_eq!(set.last.as_deref(), Some("09af3-cc343-b409f"));
        assert_eq!(set.count, Some(20));
        Ok(())
    }
}
