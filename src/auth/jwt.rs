//! JWT token generation and validation
//! Implements the access token + refresh token pair, HS256 only

use crate::{config::AppConfig, error::AppError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The only algorithm tokens may be signed with.
pub const PINNED_ALGORITHM: Algorithm = Algorithm::HS256;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// JWT claims carried by both halves of a token pair
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Identity ID
    pub user_id: Uuid,

    /// Tenant the identity belongs to
    pub organization_id: Uuid,

    /// Opaque role ID, passed through for downstream authorization
    pub role_id: Uuid,

    pub email: String,

    /// Token type (access or refresh)
    pub token_type: String,

    /// Issuer
    pub iss: String,

    /// Subject (identity ID)
    pub sub: String,

    /// Issued at
    pub iat: i64,

    /// Not before
    pub nbf: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

impl Claims {
    pub fn is_access(&self) -> bool {
        self.token_type == TOKEN_TYPE_ACCESS
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Token pair response
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// seconds until access token expires
    pub expires_in: u64,
    pub token_type: String,
    /// Expiry claimed by the access token
    #[serde(skip)]
    pub access_expires_at: DateTime<Utc>,
    /// Expiry claimed by the refresh token; the stored session uses the same instant
    #[serde(skip)]
    pub refresh_expires_at: DateTime<Utc>,
}

/// Identity data embedded into newly minted tokens
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role_id: Uuid,
    pub email: &'a str,
}

impl<'a> From<&'a Claims> for TokenSubject<'a> {
    fn from(claims: &'a Claims) -> Self {
        Self {
            user_id: claims.user_id,
            organization_id: claims.organization_id,
            role_id: claims.role_id,
            email: &claims.email,
        }
    }
}

/// Signs and verifies bearer tokens
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_token_exp_secs: u64,
    refresh_token_exp_secs: u64,
}

impl TokenIssuer {
    /// Create token issuer from config
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        Self::new(
            config.security.jwt_secret.expose_secret(),
            &config.security.jwt_issuer,
            config.security.access_token_exp_secs,
            config.security.refresh_token_exp_secs,
        )
    }

    pub fn new(
        secret: &str,
        issuer: &str,
        access_token_exp_secs: u64,
        refresh_token_exp_secs: u64,
    ) -> Result<Self, AppError> {
        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        // Validation::new pins the accepted algorithm list to exactly one entry,
        // so a header declaring anything else fails before the signature is checked.
        let mut validation = Validation::new(PINNED_ALGORITHM);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            access_token_exp_secs,
            refresh_token_exp_secs,
        })
    }

    fn sign(
        &self,
        subject: TokenSubject<'_>,
        token_type: &str,
        ttl_secs: u64,
    ) -> Result<(String, DateTime<Utc>), AppError> {
        let now = Utc::now();
        let expiration = now + Duration::seconds(ttl_secs as i64);

        let claims = Claims {
            user_id: subject.user_id,
            organization_id: subject.organization_id,
            role_id: subject.role_id,
            email: subject.email.to_string(),
            token_type: token_type.to_string(),
            iss: self.issuer.clone(),
            sub: subject.user_id.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expiration.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(PINNED_ALGORITHM), &claims, &self.encoding_key).map_err(
            |e| {
                tracing::error!("Failed to encode {} token: {:?}", token_type, e);
                AppError::internal("Failed to encode token", e)
            },
        )?;

        Ok((token, claims.expires_at()))
    }

    /// Generate access token
    pub fn generate_access_token(&self, subject: TokenSubject<'_>) -> Result<String, AppError> {
        self.sign(subject, TOKEN_TYPE_ACCESS, self.access_token_exp_secs)
            .map(|(token, _)| token)
    }

    /// Generate token pair
    pub fn generate_token_pair(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        role_id: Uuid,
        email: &str,
    ) -> Result<TokenPair, AppError> {
        let subject = TokenSubject {
            user_id,
            organization_id,
            role_id,
            email,
        };

        let (access_token, access_expires_at) =
            self.sign(subject, TOKEN_TYPE_ACCESS, self.access_token_exp_secs)?;
        let (refresh_token, refresh_expires_at) =
            self.sign(subject, TOKEN_TYPE_REFRESH, self.refresh_token_exp_secs)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_token_exp_secs,
            token_type: "Bearer".to_string(),
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Validate signature, algorithm, issuer and time window; returns the claims.
    ///
    /// Expiry is reported as `TokenExpired`, every other failure as `InvalidToken`.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        if token.is_empty() {
            return Err(AppError::InvalidToken);
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AppError::TokenExpired,
                other => {
                    tracing::debug!("Token validation failed: {:?}", other);
                    AppError::InvalidToken
                }
            })
    }

    /// Mint a fresh access token from a valid refresh token.
    ///
    /// This does not touch the session store; callers that need single-use
    /// refresh semantics must rotate the stored session as well.
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AppError> {
        let claims = self.validate_token(refresh_token)?;

        if claims.token_type != TOKEN_TYPE_REFRESH {
            tracing::debug!("Token type mismatch: expected 'refresh', got '{}'", claims.token_type);
            return Err(AppError::InvalidToken);
        }

        self.generate_access_token(TokenSubject::from(&claims))
    }
}
