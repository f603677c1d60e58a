// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::transport::TransportError;

/// The HTTP client BOSH requests are sent with.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POSTs `body` to `url`. Returns the status code and the response body.
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: String,
    ) -> Result<(u16, String), TransportError>;
}

#[derive(Default, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(client: reqwest::Client) -> Self {
        ReqwestHttpClient { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: String,
    ) -> Result<(u16, String), TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| TransportError::Socket {
                msg: err.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| TransportError::Socket {
            msg: err.to_string(),
        })?;

        Ok((status, body))
    }
}
