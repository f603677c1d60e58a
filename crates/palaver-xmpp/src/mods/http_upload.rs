// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::{anyhow, Result};
use jid::Jid;
use minidom::Element;
use url::Url;

use crate::client::ModuleContext;
use crate::mods::{Disco, Module};
use crate::ns;
use crate::stanza::StanzaBuilder;
use crate::util::{ElementExt, ParseError};

/// Headers a slot may ask us to send along with the PUT. Others are dropped.
const ALLOWED_HEADERS: &[&str] = &["authorization", "cookie", "expires"];

// XEP-0363: HTTP File Upload
// https://xmpp.org/extensions/xep-0363.html#upload

#[derive(Default, Clone)]
pub struct HttpUpload {
    ctx: ModuleContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadSlot {
    pub put_url: Url,
    pub put_headers: Vec<(String, String)>,
    pub get_url: Url,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadService {
    pub jid: Jid,
    pub max_file_size: Option<u64>,
}

impl Module for HttpUpload {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl HttpUpload {
    pub async fn request_slot(
        &self,
        service: &Jid,
        file_name: &str,
        file_size: u64,
        content_type: Option<&str>,
    ) -> Result<UploadSlot> {
        let response = self
            .ctx
            .send_iq_expecting_payload(
                StanzaBuilder::iq("get")
                    .attr("id", self.ctx.generate_id())
                    .attr("to", service.to_string())
                    .c_ns("request", ns::HTTP_UPLOAD)
                    .attr("filename", file_name)
                    .attr("size", file_size.to_string())
                    .attr("content-type", content_type),
            )
            .await?;

        Ok(UploadSlot::try_from(&response)?)
    }

    /// The upload service of our server and the largest file it accepts.
    pub async fn upload_service(&self) -> Result<Option<UploadService>> {
        let disco = self
            .ctx
            .get_mod::<Disco>()
            .ok_or_else(|| anyhow!("The client was built without the Disco module"))?;

        let Some(service) = disco.find_service_with_feature(ns::HTTP_UPLOAD).await? else {
            return Ok(None);
        };

        let max_file_size = service
            .info
            .form(ns::HTTP_UPLOAD)
            .and_then(|form| form.field_value("max-file-size"))
            .and_then(|size| size.parse().ok());

        Ok(Some(UploadService {
            jid: service.jid,
            max_file_size,
        }))
    }
}

impl TryFrom<&Element> for UploadSlot {
    type Error = ParseError;

    fn try_from(root: &Element) -> Result<Self, Self::Error> {
        root.expect_is("slot", ns::HTTP_UPLOAD)?;

        let missing = |name: &str| ParseError::Generic {
            msg: format!("Missing {} in upload slot", name),
        };

        let put = root
            .get_child("put", ns::HTTP_UPLOAD)
            .ok_or_else(|| missing("put"))?;
        let get = root
            .get_child("get", ns::HTTP_UPLOAD)
            .ok_or_else(|| missing("get"))?;

        let put_headers = put
            .children()
            .filter(|child| child.is("header", ns::HTTP_UPLOAD))
            .filter_map(|header| {
                let name = header.attr("name")?;
                ALLOWED_HEADERS
                    .contains(&name.to_lowercase().as_str())
                    .then(|| (name.to_string(), header.text().replace('\n', "")))
            })
            .collect();

        Ok(UploadSlot {
            put_url: parse_url(put.attr_req("url")?)?,
            put_headers,
            get_url: parse_url(get.attr_req("url")?)?,
        })
    }
}

fn parse_url(url: &str) -> Result<Url, ParseError> {
    Url::parse(url).map_err(|err| ParseError::Generic {
        msg: format!("Invalid url '{}'. {}", url, err),
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_slot() -> Result<()> {
        let slot = UploadSlot::try_from(&Element::from_str(
            r#"<slot xmlns="urn:xmpp:http:upload:0">
                <put url="https://upload.montague.tld/4a771ac1/tr%C3%A8s%20cool.jpg">
                    <header name="Authorization">Basic Base64String==</header>
                    <header name="Cookie">foo=bar; user=romeo</header>
                    <header name="X-Custom">dropped</header>
                </put>
                <get url="https://download.montague.tld/4a771ac1/tr%C3%A8s%20cool.jpg"/>
            </slot>"#,
        )?)?;

        assert_eq!(
            slot.put_url.as_str(),
            "https://upload.montague.tld/4a771ac1/tr%C3%A8s%20cool.jpg"
        );
        assert_eq!(
            slot.put_headers,
            vec![
                (
                    "Authorization".to_string(),
                    "Basic Base64String==".to_string()
                ),
                ("Cookie".to_string(), "foo=bar; user=romeo".to_string()),
            ]
        );
        assert_eq!(
            slot.get_url.as_str(),
            "https://download.montague.tld/4a771ac1/tr%C3%A8s%20cool.jpg"
        );
        Ok(())
    }
}
