// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::cmp::Reverse;
use std::sync::Arc;

use base64::prelude::*;
use itertools::Itertools;
use minidom::Element;
use tracing::{info, warn};

use crate::ns;
use crate::sasl::{
    Anonymous, External, Mechanism, OAuthBearer, Plain, SaslError, SaslSession, Scram, ScramHash,
    XOAuth2,
};
use crate::stanza::StanzaBuilder;

/// The set of mechanisms the client is willing to use.
#[derive(Clone)]
pub struct SaslEngine {
    mechanisms: Vec<Arc<dyn Mechanism>>,
}

impl Default for SaslEngine {
    fn default() -> Self {
        let mut engine = SaslEngine::empty();
        engine.register(Scram::new(ScramHash::Sha512));
        engine.register(Scram::new(ScramHash::Sha384));
        engine.register(Scram::new(ScramHash::Sha256));
        engine.register(Scram::new(ScramHash::Sha1));
        engine.register(Plain);
        engine.register(OAuthBearer);
        engine.register(XOAuth2);
        engine.register(Anonymous);
        engine.register(External);
        engine
    }
}

impl SaslEngine {
    pub fn empty() -> Self {
        SaslEngine { mechanisms: vec![] }
    }

    /// Registers `mechanism`, replacing a previously registered one with the same name.
    pub fn register(&mut self, mechanism: impl Mechanism + 'static) {
        self.mechanisms.retain(|m| m.name() != mechanism.name());
        self.mechanisms.push(Arc::new(mechanism));
    }

    /// Whether any of the `advertised` mechanisms is registered, regardless of the credentials.
    pub fn supports_any(&self, advertised: &[String]) -> bool {
        self.mechanisms
            .iter()
            .any(|m| advertised.iter().any(|name| name == m.name()))
    }

    /// Picks the mechanism with the highest priority that the server advertised and that can be
    /// used with the credentials in `session`.
    pub fn select(
        &self,
        advertised: &[String],
        session: &SaslSession,
    ) -> Option<Arc<dyn Mechanism>> {
        self.mechanisms
            .iter()
            .filter(|m| advertised.iter().any(|name| name == m.name()))
            .sorted_by_key(|m| Reverse(m.priority()))
            .find(|m| m.test(session))
            .cloned()
    }
}

/// Reads the mechanism names from `<stream:features/>`.
pub fn advertised_mechanisms(features: &Element) -> Vec<String> {
    features
        .get_child("mechanisms", ns::SASL)
        .map(|mechanisms| {
            mechanisms
                .children()
                .filter(|child| child.is("mechanism", ns::SASL))
                .map(|child| child.text().trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, PartialEq)]
pub enum SaslStep {
    /// Send this element and wait for the next server element.
    Respond(Element),
    Success,
    /// The server rejected the exchange with the given condition.
    Failure(String),
}

/// Drives a single SASL exchange with a chosen mechanism.
pub struct SaslExchange {
    mechanism: Arc<dyn Mechanism>,
    session: SaslSession,
}

impl SaslExchange {
    pub fn new(mechanism: Arc<dyn Mechanism>, session: SaslSession) -> Self {
        info!("Authenticating with SASL mechanism {}", mechanism.name());
        SaslExchange { mechanism, session }
    }

    pub fn mechanism_name(&self) -> &'static str {
        self.mechanism.name()
    }

    /// Builds the `<auth/>` element that starts the exchange.
    pub fn start(&mut self) -> Result<Element, SaslError> {
        let mut auth =
            StanzaBuilder::new("auth", ns::SASL).attr("mechanism", self.mechanism.name());

        if self.mechanism.is_client_first() {
            let payload = self.mechanism.client_first(&mut self.session)?;
            auth = auth.t(encode_payload(&payload));
        }

        Ok(auth.build())
    }

    /// Handles `<challenge/>`, `<success/>` and `<failure/>`.
    pub fn handle(&mut self, elem: &Element) -> Result<SaslStep, SaslError> {
        if elem.ns() != ns::SASL {
            return Err(SaslError::UnexpectedElement {
                name: elem.name().to_string(),
            });
        }

        match elem.name() {
            "challenge" => {
                let challenge = decode_payload(&elem.text())?;
                let response = self
                    .mechanism
                    .on_challenge(&mut self.session, &challenge)
                    .map_err(|err| {
                        self.session.clear();
                        err
                    })?;
                Ok(SaslStep::Respond(
                    StanzaBuilder::new("response", ns::SASL)
                        .t(encode_payload(&response))
                        .build(),
                ))
            }
            "success" => {
                let data = decode_payload(&elem.text())?;
                let result = self.mechanism.on_success(&mut self.session, &data);
                self.session.clear();
                result?;
                Ok(SaslStep::Success)
            }
            "failure" => {
                self.session.clear();
                let condition = elem
                    .children()
                    .find(|child| child.name() != "text")
                    .map(|child| child.name().to_string())
                    .unwrap_or_else(|| "not-authorized".to_string());
                warn!("SASL authentication failed with condition {}", condition);
                Ok(SaslStep::Failure(condition))
            }
            name => Err(SaslError::UnexpectedElement {
                name: name.to_string(),
            }),
        }
    }
}

fn encode_payload(payload: &[u8]) -> String {
    if payload.is_empty() {
        return "=".to_string();
    }
    BASE64_STANDARD.encode(payload)
}

fn decode_payload(text: &str) -> Result<Vec<u8>, SaslError> {
    let text = text.trim();
    if text.is_empty() || text == "=" {
        return Ok(vec![]);
    }
    Ok(BASE64_STANDARD.decode(text)?)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    fn session() -> SaslSession {
        SaslSession::new(
            "user@example.com",
            Some("user".to_string()),
            Some(SecretString::new("pencil".to_string())),
            "example.com",
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_selects_by_priority() {
        let engine = SaslEngine::default();

        let selected = engine.select(&names(&["PLAIN", "SCRAM-SHA-1", "SCRAM-SHA-256"]), &session());
        assert_eq!(selected.map(|m| m.name()), Some("SCRAM-SHA-256"));

        let selected = engine.select(&names(&["PLAIN", "ANONYMOUS"]), &session());
        assert_eq!(selected.map(|m| m.name()), Some("PLAIN"));

        let selected = engine.select(&names(&["DIGEST-MD5"]), &session());
        assert!(selected.is_none());
    }

    #[test]
    fn test_selects_anonymous_without_authcid() {
        let engine = SaslEngine::default();
        let session = SaslSession::new("example.com", None, None, "example.com");

        let selected = engine.select(&names(&["SCRAM-SHA-1", "PLAIN", "ANONYMOUS"]), &session);
        assert_eq!(selected.map(|m| m.name()), Some("ANONYMOUS"));
    }

    #[test]
    fn test_reads_advertised_mechanisms() -> Result<()> {
        let features = Element::from_str(
            r#"<stream:features xmlns:stream="http://etherx.jabber.org/streams"><mechanisms xmlns="urn:ietf:params:xml:ns:xmpp-sasl"><mechanism>SCRAM-SHA-1</mechanism><mechanism>PLAIN</mechanism></mechanisms></stream:features>"#,
        )?;
        assert_eq!(
            advertised_mechanisms(&features),
            names(&["SCRAM-SHA-1", "PLAIN"])
        );
        Ok(())
    }

    #[test]
    fn test_scram_exchange() -> Result<()> {
        let mut exchange = SaslExchange::new(
            Arc::new(Scram::new(ScramHash::Sha1)),
            session().with_cnonce("fyko+d2lbbFgONRv9qkxdawL"),
        );

        assert_eq!(
            exchange.start()?,
            Element::from_str(&format!(
                r#"<auth xmlns="urn:ietf:params:xml:ns:xmpp-sasl" mechanism="SCRAM-SHA-1">{}</auth>"#,
                BASE64_STANDARD.encode("n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL")
            ))?
        );

        let challenge = Element::from_str(&format!(
            r#"<challenge xmlns="urn:ietf:params:xml:ns:xmpp-sasl">{}</challenge>"#,
            BASE64_STANDARD
                .encode("r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096")
        ))?;
        let SaslStep::Respond(response) = exchange.handle(&challenge)? else {
            panic!("Expected response")
        };
        assert_eq!(response.name(), "response");

        let success = Element::from_str(&format!(
            r#"<success xmlns="urn:ietf:params:xml:ns:xmpp-sasl">{}</success>"#,
            BASE64_STANDARD.encode("v=rmF9pqV8S7suAoZWja4dJRkFsKQ=")
        ))?;
        assert_eq!(exchange.handle(&success)?, SaslStep::Success);
        Ok(())
    }

    #[test]
    fn test_failure_condition() -> Result<()> {
        let mut exchange = SaslExchange::new(Arc::new(Plain), session());
        exchange.start()?;

        let failure = Element::from_str(
            r#"<failure xmlns="urn:ietf:params:xml:ns:xmpp-sasl"><not-authorized/><text>Invalid credentials</text></failure>"#,
        )?;
        assert_eq!(
            exchange.handle(&failure)?,
            SaslStep::Failure("not-authorized".to_string())
        );
        Ok(())
    }
}
