// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use secrecy::SecretString;

use crate::sasl::SaslError;

/// Credentials and per-exchange state of a SASL authentication.
pub struct SaslSession {
    /// The identity to act as, usually the bare JID.
    pub authzid: String,
    /// The identity whose password is used, usually the local part of the JID. `None` for
    /// anonymous logins.
    pub authcid: Option<String>,
    pub password: Option<SecretString>,
    pub domain: String,
    pub(crate) cnonce: Option<String>,
    pub(crate) client_first_bare: Option<String>,
    pub(crate) server_signature: Option<String>,
}

impl SaslSession {
    pub fn new(
        authzid: impl Into<String>,
        authcid: Option<String>,
        password: Option<SecretString>,
        domain: impl Into<String>,
    ) -> Self {
        SaslSession {
            authzid: authzid.into(),
            authcid,
            password,
            domain: domain.into(),
            cnonce: None,
            client_first_bare: None,
            server_signature: None,
        }
    }

    /// Uses a fixed client nonce instead of a random one.
    pub fn with_cnonce(mut self, cnonce: impl Into<String>) -> Self {
        self.cnonce = Some(cnonce.into());
        self
    }

    /// Forgets everything derived during an exchange.
    pub fn clear(&mut self) {
        self.cnonce = None;
        self.client_first_bare = None;
        self.server_signature = None;
    }

    pub(crate) fn has_server_signature(&self) -> bool {
        self.server_signature.is_some()
    }
}

/// A SASL mechanism. Implementations are stateless, everything that needs to survive between
/// steps of an exchange lives in the `SaslSession`.
pub trait Mechanism: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mechanisms with a higher priority are preferred.
    fn priority(&self) -> u8;

    /// Whether the mechanism can be used with the given credentials.
    fn test(&self, _session: &SaslSession) -> bool {
        true
    }

    /// Whether the `<auth/>` element carries an initial response.
    fn is_client_first(&self) -> bool {
        false
    }

    fn client_first(&self, session: &mut SaslSession) -> Result<Vec<u8>, SaslError> {
        self.on_challenge(session, &[])
    }

    fn on_challenge(
        &self,
        _session: &mut SaslSession,
        _challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        Ok(vec![])
    }

    /// Called with the decoded content of `<success/>`.
    fn on_success(&self, _session: &mut SaslSession, _data: &[u8]) -> Result<(), SaslError> {
        Ok(())
    }
}
