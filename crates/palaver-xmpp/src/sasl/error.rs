// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

#[derive(Debug, thiserror::Error)]
pub enum SaslError {
    #[error("Invalid SASL challenge: {msg}")]
    InvalidChallenge { msg: String },
    #[error("Server supplied iteration count {iterations} which is below the minimum of 4096")]
    IterationCount { iterations: u32 },
    #[error("Server nonce does not start with the client nonce")]
    NonceMismatch,
    #[error("Server signature does not match")]
    ServerSignatureMismatch,
    #[error("Server requires an unsupported SCRAM extension")]
    MandatoryExtension,
    #[error("Mechanism requires credentials that were not provided")]
    MissingCredentials,
    #[error("Invalid HMAC key")]
    InvalidKey,
    #[error("Unexpected element <{name}/> during SASL exchange")]
    UnexpectedElement { name: String },
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
}
