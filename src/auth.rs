use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CredentialError, TokenError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    HmacSha256,
}

impl Algorithm {
    pub fn jwt_name(&self) -> &'static str {
        match self {
            Algorithm::HmacSha256 => "HS256",
        }
    }
}

#[derive(Clone)]
pub struct Credential {
    key: Vec<u8>,
    pub algorithm: Algorithm,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl Credential {
    pub fn from_access_key(access_key: &str) -> Result<Self, CredentialError> {
        if access_key.trim().is_empty() {
            return Err(CredentialError::EmptyKey);
        }

        let credential = Self {
            key: access_key.as_bytes().to_vec(),
            algorithm: Algorithm::HmacSha256,
        };

        // Fail at startup rather than on the first connection attempt.
        credential.mac()?;

        Ok(credential)
    }

    fn mac(&self) -> Result<HmacSha256, CredentialError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| CredentialError::InvalidKey(e.to_string()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8]) -> Result<bool, CredentialError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.verify_slice(signature).is_ok())
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct Header {
    alg: String,
    typ: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

#[derive(Debug, Clone)]
pub struct TokenProvider {
    credential: Credential,
    ttl: chrono::Duration,
}

impl TokenProvider {
    pub fn new(credential: Credential, ttl: chrono::Duration) -> Self {
        Self { credential, ttl }
    }

    pub fn generate_token(&self, audience: &str) -> Result<String, CredentialError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            aud: audience.to_string(),
            exp: now + self.ttl.num_seconds(),
            iat: now,
            nbf: now,
        };

        self.encode(&claims)
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, CredentialError> {
        let header = Header {
            alg: self.credential.algorithm.jwt_name().to_string(),
            typ: "JWT".to_string(),
        };

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
        );

        let signature = self.credential.sign(signing_input.as_bytes())?;

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks signature, expiry and audience of a token minted with the same credential.
    pub fn verify(&self, token: &str, audience: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (header_segment, claims_segment, signature) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed),
            };

        let header: Header = decode_segment(header_segment)?;
        if header.alg != self.credential.algorithm.jwt_name() {
            return Err(TokenError::Algorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let signing_input = format!("{}.{}", header_segment, claims_segment);
        match self.credential.verify(signing_input.as_bytes(), &signature) {
            Ok(true) => {}
            _ => return Err(TokenError::BadSignature),
        }

        let claims: Claims = decode_segment(claims_segment)?;

        if claims.exp <= chrono::Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        if claims.aud != audience {
            return Err(TokenError::WrongAudience(claims.aud));
        }

        Ok(claims)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}
