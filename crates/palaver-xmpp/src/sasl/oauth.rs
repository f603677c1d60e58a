// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use secrecy::ExposeSecret;

use crate::sasl::{Mechanism, SaslError, SaslSession};

/// RFC 7628. The password is used as the bearer token.
pub struct OAuthBearer;

/// Google's pre-standard token mechanism.
pub struct XOAuth2;

impl Mechanism for OAuthBearer {
    fn name(&self) -> &'static str {
        "OAUTHBEARER"
    }

    fn priority(&self) -> u8 {
        40
    }

    fn test(&self, session: &SaslSession) -> bool {
        session.password.is_some()
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn on_challenge(
        &self,
        session: &mut SaslSession,
        _challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        let token = session
            .password
            .as_ref()
            .ok_or(SaslError::MissingCredentials)?;

        let mut payload = "n,".to_string();
        if session.authcid.is_some() {
            payload.push_str("a=");
            payload.push_str(&session.authzid);
        }
        payload.push_str(",\u{1}auth=Bearer ");
        payload.push_str(token.expose_secret());
        payload.push_str("\u{1}\u{1}");

        Ok(payload.into_bytes())
    }
}

impl Mechanism for XOAuth2 {
    fn name(&self) -> &'static str {
        "X-OAUTH2"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn test(&self, session: &SaslSession) -> bool {
        session.password.is_some()
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn on_challenge(
        &self,
        session: &mut SaslSession,
        _challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        let token = session
            .password
            .as_ref()
            .ok_or(SaslError::MissingCredentials)?;

        let authzid = if session.authcid.is_some() {
            session.authzid.as_str()
        } else {
            ""
        };

        Ok(format!("\0{}\0{}", authzid, token.expose_secret()).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    fn session() -> SaslSession {
        SaslSession::new(
            "user@prose.org",
            Some("user".to_string()),
            Some(SecretString::new("token".to_string())),
            "prose.org",
        )
    }

    #[test]
    fn test_oauthbearer_payload() {
        assert_eq!(
            OAuthBearer.client_first(&mut session()).unwrap(),
            b"n,a=user@prose.org,\x01auth=Bearer token\x01\x01"
        );
    }

    #[test]
    fn test_xoauth2_payload() {
        assert_eq!(
            XOAuth2.client_first(&mut session()).unwrap(),
            b"\0user@prose.org\0token"
        );
    }
}
