// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::sasl::{Mechanism, SaslError, SaslSession};

/// RFC 4422 Appendix A. Credentials are established outside of SASL, e.g. by a client
/// certificate.
pub struct External;

impl Mechanism for External {
    fn name(&self) -> &'static str {
        "EXTERNAL"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn on_challenge(
        &self,
        session: &mut SaslSession,
        _challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        if session.authcid.as_deref() == Some(session.authzid.as_str()) {
            return Ok(vec![]);
        }
        Ok(session.authzid.clone().into_bytes())
    }
}
