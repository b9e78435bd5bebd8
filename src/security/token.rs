//! Bearer token issuance and verification.
//!
//! Tokens are compact JWS documents signed with HMAC-SHA512 using one
//! process-wide secret. The gateway keeps no session state: every request
//! is re-verified from the token alone.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::AuthConfig;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const ALGORITHM: Algorithm = Algorithm::HS512;

/// Claim names owned by the token service; extra claims may not override them.
const RESERVED_CLAIMS: [&str; 5] = ["sub", "roles", "iat", "exp", "type"];

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret is {len} bytes, at least {MIN_SECRET_LEN} required")]
    WeakSecret { len: usize },

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),

    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("token subject is not a UUID: {0}")]
    Subject(#[from] uuid::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Build the service from configuration. An unusable secret is fatal.
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        Self::from_secret(
            config.jwt_secret.as_bytes(),
            Duration::seconds(config.access_token_ttl_secs),
            Duration::seconds(config.refresh_token_ttl_secs),
        )
    }

    pub fn from_secret(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret { len: secret.len() });
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        })
    }

    /// Configured lifetime for access tokens.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Configured lifetime for refresh tokens.
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Issue an access token carrying `roles` (duplicates dropped, order kept)
    /// and any non-reserved `extra_claims`.
    pub fn issue_access_token(
        &self,
        subject: Uuid,
        roles: &[String],
        mut extra_claims: Map<String, Value>,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        for reserved in RESERVED_CLAIMS {
            extra_claims.remove(reserved);
        }

        let mut unique_roles: Vec<String> = Vec::with_capacity(roles.len());
        for role in roles {
            if !unique_roles.contains(role) {
                unique_roles.push(role.clone());
            }
        }

        let now = Utc::now();
        self.sign(&Claims {
            sub: subject.to_string(),
            roles: unique_roles,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            kind: TokenKind::Access,
            extra: extra_claims,
        })
    }

    /// Issue a refresh token. Refresh tokens carry no roles.
    pub fn issue_refresh_token(&self, subject: Uuid, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        self.sign(&Claims {
            sub: subject.to_string(),
            roles: Vec::new(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            kind: TokenKind::Refresh,
            extra: Map::new(),
        })
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key).map_err(TokenError::Signing)
    }

    /// Decode a token after checking its signature, structure and expiry.
    pub fn decode_verified(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }

    /// Fails closed: any decoding problem yields `false`.
    pub fn verify(&self, token: &str) -> bool {
        match self.decode_verified(token) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Token rejected");
                false
            }
        }
    }

    pub fn extract_subject(&self, token: &str) -> Result<Uuid, TokenError> {
        let claims = self.decode_verified(token)?;
        Ok(Uuid::parse_str(&claims.sub)?)
    }

    pub fn extract_roles(&self, token: &str) -> Result<Vec<String>, TokenError> {
        Ok(self.decode_verified(token)?.roles)
    }

    /// Compare the embedded expiry with the current time.
    ///
    /// The signature is still checked so a forged `exp` cannot extend a
    /// session; any parse error counts as expired.
    pub fn is_expired(&self, token: &str) -> bool {
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims.exp < Utc::now().timestamp(),
            Err(e) => {
                tracing::debug!(error = %e, "Treating unparseable token as expired");
                true
            }
        }
    }
}
