//! Token encoding, signing, and verification.
//!
//! The codec is a pure transform over [`Claims`]: no storage access, safe to
//! share across request-handling tasks. Revocation and kind checks live in
//! the token service, not here.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::JwtSettings;
use crate::error::{AuthError, Result};
use crate::security::claims::Claims;

pub struct TokenCodec {
    header: Header,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Build a codec from key material. Fails only on misconfiguration
    /// (unknown algorithm, unparsable PEM, missing public key).
    pub fn new(settings: &JwtSettings) -> Result<Self> {
        let algorithm: Algorithm = settings
            .algorithm
            .parse()
            .map_err(|_| AuthError::SigningFailure(format!(
                "unsupported JWT algorithm {:?}",
                settings.algorithm
            )))?;

        let (encoding_key, decoding_key) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => (
                EncodingKey::from_secret(settings.signing_key.as_bytes()),
                DecodingKey::from_secret(settings.signing_key.as_bytes()),
            ),
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                let public_pem = settings.validation_key.as_ref().ok_or_else(|| {
                    AuthError::SigningFailure(
                        "JWT_PUBLIC_KEY is required for RSA algorithms".to_string(),
                    )
                })?;
                (
                    EncodingKey::from_rsa_pem(settings.signing_key.as_bytes())
                        .map_err(|e| AuthError::SigningFailure(e.to_string()))?,
                    DecodingKey::from_rsa_pem(public_pem.as_bytes())
                        .map_err(|e| AuthError::SigningFailure(e.to_string()))?,
                )
            }
            other => {
                return Err(AuthError::SigningFailure(format!(
                    "unsupported JWT algorithm {other:?}"
                )))
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = settings.leeway_secs;
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);

        Ok(Self {
            header: Header::new(algorithm),
            encoding_key,
            decoding_key,
            validation,
        })
    }

    /// Serialize and sign a claims payload.
    pub fn issue(&self, claims: &Claims) -> Result<String> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| AuthError::SigningFailure(e.to_string()))
    }

    /// Verify signature and structural validity, returning the payload.
    ///
    /// Expiry is checked against the configured leeway; issuer and audience
    /// are matched against the expected values.
    pub fn parse(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}
