// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use crate::sasl::{Mechanism, SaslSession};

/// RFC 4505. Only offered if no authcid is configured.
pub struct Anonymous;

impl Mechanism for Anonymous {
    fn name(&self) -> &'static str {
        "ANONYMOUS"
    }

    fn priority(&self) -> u8 {
        20
    }

    fn test(&self, session: &SaslSession) -> bool {
        session.authcid.is_none()
    }
}
