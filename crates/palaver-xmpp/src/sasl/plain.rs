// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use secrecy::ExposeSecret;

use crate::sasl::{Mechanism, SaslError, SaslSession};

/// RFC 4616
pub struct Plain;

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn priority(&self) -> u8 {
        50
    }

    fn test(&self, session: &SaslSession) -> bool {
        session.authcid.is_some()
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn on_challenge(
        &self,
        session: &mut SaslSession,
        _challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        let authcid = session
            .authcid
            .as_deref()
            .ok_or(SaslError::MissingCredentials)?;
        let password = session
            .password
            .as_ref()
            .ok_or(SaslError::MissingCredentials)?;

        // The authzid is only sent if it differs from the identity derived from authcid.
        let authzid = if session.authzid != format!("{}@{}", authcid, session.domain) {
            session.authzid.as_str()
        } else {
            ""
        };

        Ok(format!("{}\0{}\0{}", authzid, authcid, password.expose_secret()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_omits_default_authzid() {
        let mut session = SaslSession::new(
            "user@prose.org",
            Some("user".to_string()),
            Some(SecretString::new("pencil".to_string())),
            "prose.org",
        );
        assert_eq!(Plain.client_first(&mut session).unwrap(), b"\0user\0pencil");

        session.authzid = "admin@prose.org".to_string();
        assert_eq!(
            Plain.client_first(&mut session).unwrap(),
            b"admin@prose.org\0user\0pencil"
        );
    }
}
