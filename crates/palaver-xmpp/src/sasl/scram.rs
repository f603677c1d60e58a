// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use base64::prelude::*;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::ExposeSecret;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use tracing::warn;

use crate::sasl::{Mechanism, SaslError, SaslSession};

const MIN_ITERATIONS: u32 = 4096;
const CNONCE_LENGTH: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScramHash {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl ScramHash {
    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, SaslError> {
        fn mac<M: Mac + hmac::digest::KeyInit>(
            key: &[u8],
            data: &[u8],
        ) -> Result<Vec<u8>, SaslError> {
            let mut mac = <M as Mac>::new_from_slice(key).map_err(|_| SaslError::InvalidKey)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }

        match self {
            ScramHash::Sha1 => mac::<Hmac<Sha1>>(key, data),
            ScramHash::Sha256 => mac::<Hmac<Sha256>>(key, data),
            ScramHash::Sha384 => mac::<Hmac<Sha384>>(key, data),
            ScramHash::Sha512 => mac::<Hmac<Sha512>>(key, data),
        }
    }

    fn hash(&self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramHash::Sha1 => Sha1::digest(data).to_vec(),
            ScramHash::Sha256 => Sha256::digest(data).to_vec(),
            ScramHash::Sha384 => Sha384::digest(data).to_vec(),
            ScramHash::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn salted_password(&self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        let mut output = vec![0u8; self.output_len()];
        match self {
            ScramHash::Sha1 => pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut output),
            ScramHash::Sha256 => pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut output),
            ScramHash::Sha384 => pbkdf2_hmac::<Sha384>(password, salt, iterations, &mut output),
            ScramHash::Sha512 => pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut output),
        }
        output
    }

    fn output_len(&self) -> usize {
        match self {
            ScramHash::Sha1 => 20,
            ScramHash::Sha256 => 32,
            ScramHash::Sha384 => 48,
            ScramHash::Sha512 => 64,
        }
    }
}

/// RFC 5802 / RFC 7677 without channel binding.
pub struct Scram {
    hash: ScramHash,
}

impl Scram {
    pub fn new(hash: ScramHash) -> Self {
        Scram { hash }
    }
}

impl Mechanism for Scram {
    fn name(&self) -> &'static str {
        match self.hash {
            ScramHash::Sha1 => "SCRAM-SHA-1",
            ScramHash::Sha256 => "SCRAM-SHA-256",
            ScramHash::Sha384 => "SCRAM-SHA-384",
            ScramHash::Sha512 => "SCRAM-SHA-512",
        }
    }

    fn priority(&self) -> u8 {
        match self.hash {
            ScramHash::Sha1 => 60,
            ScramHash::Sha256 => 70,
            ScramHash::Sha384 => 71,
            ScramHash::Sha512 => 72,
        }
    }

    fn test(&self, session: &SaslSession) -> bool {
        session.authcid.is_some()
    }

    fn is_client_first(&self) -> bool {
        true
    }

    fn client_first(&self, session: &mut SaslSession) -> Result<Vec<u8>, SaslError> {
        let authcid = session
            .authcid
            .as_deref()
            .ok_or(SaslError::MissingCredentials)?;

        let cnonce = session.cnonce.get_or_insert_with(generate_cnonce).clone();
        let bare = format!("n={},r={}", escape_username(authcid), cnonce);
        session.client_first_bare = Some(bare.clone());

        Ok(format!("n,,{}", bare).into_bytes())
    }

    fn on_challenge(
        &self,
        session: &mut SaslSession,
        challenge: &[u8],
    ) -> Result<Vec<u8>, SaslError> {
        let server_first = std::str::from_utf8(challenge).map_err(|_| SaslError::InvalidChallenge {
            msg: "Challenge is not valid UTF-8".to_string(),
        })?;
        let challenge = ServerFirst::parse(server_first)?;

        let cnonce = session.cnonce.as_deref().ok_or(SaslError::InvalidChallenge {
            msg: "Received challenge before client-first message".to_string(),
        })?;
        if !challenge.nonce.starts_with(cnonce) {
            warn!("Failing SCRAM authentication because server supplied incorrect nonce.");
            return Err(SaslError::NonceMismatch);
        }

        let client_first_bare =
            session
                .client_first_bare
                .as_deref()
                .ok_or(SaslError::InvalidChallenge {
                    msg: "Received challenge before client-first message".to_string(),
                })?;
        let password = session
            .password
            .as_ref()
            .ok_or(SaslError::MissingCredentials)?;

        let client_final_without_proof = format!("c=biws,r={}", challenge.nonce);
        let auth_message = format!(
            "{},{},{}",
            client_first_bare, server_first, client_final_without_proof
        );

        let salted_password = self.hash.salted_password(
            password.expose_secret().as_bytes(),
            &challenge.salt,
            challenge.iterations,
        );
        let client_key = self.hash.hmac(&salted_password, b"Client Key")?;
        let server_key = self.hash.hmac(&salted_password, b"Server Key")?;
        let stored_key = self.hash.hash(&client_key);
        let client_signature = self.hash.hmac(&stored_key, auth_message.as_bytes())?;
        let server_signature = self.hash.hmac(&server_key, auth_message.as_bytes())?;

        let client_proof = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(key, signature)| key ^ signature)
            .collect::<Vec<_>>();

        session.server_signature = Some(BASE64_STANDARD.encode(server_signature));

        Ok(format!(
            "{},p={}",
            client_final_without_proof,
            BASE64_STANDARD.encode(client_proof)
        )
        .into_bytes())
    }

    fn on_success(&self, session: &mut SaslSession, data: &[u8]) -> Result<(), SaslError> {
        let Some(expected) = session.server_signature.as_deref() else {
            return Ok(());
        };

        let data = String::from_utf8_lossy(data);
        let signature = parse_attributes(&data)
            .find(|(key, _)| *key == "v")
            .map(|(_, value)| value);

        if signature != Some(expected) {
            warn!("Failing SCRAM authentication because server signature did not match.");
            return Err(SaslError::ServerSignatureMismatch);
        }
        Ok(())
    }
}

struct ServerFirst {
    nonce: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl ServerFirst {
    fn parse(challenge: &str) -> Result<Self, SaslError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for (key, value) in parse_attributes(challenge) {
            match key {
                "r" => nonce = Some(value.to_string()),
                "s" => salt = Some(BASE64_STANDARD.decode(value)?),
                "i" => {
                    iterations = Some(value.parse::<u32>().map_err(|_| {
                        SaslError::InvalidChallenge {
                            msg: format!("Invalid iteration count '{}'", value),
                        }
                    })?)
                }
                "m" => return Err(SaslError::MandatoryExtension),
                _ => (),
            }
        }

        let iterations = iterations.unwrap_or(0);
        if iterations < MIN_ITERATIONS {
            warn!("Failing SCRAM authentication because server supplied iteration count < 4096.");
            return Err(SaslError::IterationCount { iterations });
        }

        let Some(salt) = salt.filter(|salt| !salt.is_empty()) else {
            warn!("Failing SCRAM authentication because server supplied incorrect salt.");
            return Err(SaslError::InvalidChallenge {
                msg: "Missing salt".to_string(),
            });
        };

        Ok(ServerFirst {
            nonce: nonce.ok_or(SaslError::InvalidChallenge {
                msg: "Missing nonce".to_string(),
            })?,
            salt,
            iterations,
        })
    }
}

fn parse_attributes(message: &str) -> impl Iterator<Item = (&str, &str)> {
    message
        .split(',')
        .filter_map(|attribute| attribute.split_once('='))
}

fn escape_username(username: &str) -> String {
    username.replace('=', "=3D").replace(',', "=2C")
}

fn generate_cnonce() -> String {
    let mut bytes = [0u8; CNONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;

    use super::*;

    fn session(cnonce: &str) -> SaslSession {
        SaslSession::new(
            "user@example.com",
            Some("user".to_string()),
            Some(SecretString::new("pencil".to_string())),
            "example.com",
        )
        .with_cnonce(cnonce)
    }

    #[test]
    fn test_rfc5802_sha1_vector() {
        let scram = Scram::new(ScramHash::Sha1);
        let mut session = session("fyko+d2lbbFgONRv9qkxdawL");

        assert_eq!(
            scram.client_first(&mut session).unwrap(),
            b"n,,n=user,r=fyko+d2lbbFgONRv9qkxdawL"
        );

        let response = scram
            .on_challenge(
                &mut session,
                b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096",
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(response).unwrap(),
            "c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,p=v0X8v3Bz2T0CJGbJQyF0X+HI4Ts="
        );
        assert!(scram
            .on_success(&mut session, b"v=rmF9pqV8S7suAoZWja4dJRkFsKQ=")
            .is_ok());
    }

    #[test]
    fn test_rfc7677_sha256_vector() {
        let scram = Scram::new(ScramHash::Sha256);
        let mut session = session("rOprNGfwEbeRWgbNEkqO");

        scram.client_first(&mut session).unwrap();
        let response = scram
            .on_challenge(
                &mut session,
                b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096",
            )
            .unwrap();

        assert_eq!(
            String::from_utf8(response).unwrap(),
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );
        assert!(scram
            .on_success(
                &mut session,
                b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4="
            )
            .is_ok());
    }

    #[test]
    fn test_rejects_wrong_server_signature() {
        let scram = Scram::new(ScramHash::Sha1);
        let mut session = session("fyko+d2lbbFgONRv9qkxdawL");

        scram.client_first(&mut session).unwrap();
        scram
            .on_challenge(
                &mut session,
                b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096",
            )
            .unwrap();

        assert!(matches!(
            scram.on_success(&mut session, b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAA="),
            Err(SaslError::ServerSignatureMismatch)
        ));
        assert!(matches!(
            scram.on_success(&mut session, b""),
            Err(SaslError::ServerSignatureMismatch)
        ));
    }

    #[test]
    fn test_rejects_low_iteration_count_before_deriving_keys() {
        let scram = Scram::new(ScramHash::Sha1);
        let mut session = session("fyko+d2lbbFgONRv9qkxdawL");

        scram.client_first(&mut session).unwrap();
        let result = scram.on_challenge(
            &mut session,
            b"r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4095",
        );

        assert!(matches!(
            result,
            Err(SaslError::IterationCount { iterations: 4095 })
        ));
        assert!(!session.has_server_signature());
    }

    #[test]
    fn test_rejects_foreign_nonce_and_mandatory_extensions() {
        let scram = Scram::new(ScramHash::Sha1);
        let mut session = session("fyko+d2lbbFgONRv9qkxdawL");
        scram.client_first(&mut session).unwrap();

        assert!(matches!(
            scram.on_challenge(&mut session, b"r=other3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096"),
            Err(SaslError::NonceMismatch)
        ));
        assert!(matches!(
            scram.on_challenge(
                &mut session,
                b"m=ext,r=fyko+d2lbbFgONRv9qkxdawL3rfc,s=QSXCR+Q6sek8bf92,i=4096"
            ),
            Err(SaslError::MandatoryExtension)
        ));
    }

    #[test]
    fn test_escapes_username() {
        let scram = Scram::new(ScramHash::Sha256);
        let mut session = session("abc");
        session.authcid = Some("a=b,c".to_string());

        assert_eq!(
            scram.client_first(&mut session).unwrap(),
            b"n,,n=a=3Db=2Cc,r=abc"
        );
    }

    #[test]
    fn test_priorities() {
        let priorities = [
            ScramHash::Sha512,
            ScramHash::Sha384,
            ScramHash::Sha256,
            ScramHash::Sha1,
        ]
        .map(|hash| Scram::new(hash).priority());
        assert_eq!(priorities, [72, 71, 70, 60]);
    }
}
