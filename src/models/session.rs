//! Session model: the authoritative record of an issued token pair

use crate::auth::jwt::TokenPair;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stored session. Tokens are kept as SHA-256 digests, never verbatim.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub identity_id: Uuid,
    #[serde(skip_serializing)]
    pub access_token_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token_hash: String,
    /// Access token expiry; a revoked row is kept at least this long
    pub access_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build the session for a freshly issued pair. Expiry follows the refresh token.
    pub fn new(identity_id: Uuid, pair: &TokenPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            access_token_hash: hash_token(&pair.access_token),
            refresh_token_hash: hash_token(&pair.refresh_token),
            access_expires_at: pair.access_expires_at,
            expires_at: pair.refresh_expires_at,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// valid ⇔ not revoked and not yet expired
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }

    /// Whether the row can be deleted without changing any validation outcome.
    ///
    /// A revoked row stays until its access token has expired on its own, since
    /// a missing row lets a signature-valid access token through.
    pub fn is_purgeable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired_at(now) || (self.revoked && now >= self.access_expires_at)
    }

    /// Whether `token` is the access half of this session
    pub fn matches_access_token(&self, token: &str) -> bool {
        hash_token(token) == self.access_token_hash
    }
}

/// Hash token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration, revoked: bool) -> Session {
        Session {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            access_token_hash: hash_token("a"),
            refresh_token_hash: hash_token("r"),
            access_expires_at: Utc::now() + expires_in.min(Duration::minutes(15)),
            expires_at: Utc::now() + expires_in,
            revoked,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_validity() {
        assert!(session(Duration::hours(1), false).is_valid());
        assert!(!session(Duration::hours(1), true).is_valid());

        let expired = session(Duration::seconds(-1), false);
        assert!(expired.is_expired());
        assert!(!expired.is_valid());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let s = session(Duration::hours(1), false);
        assert!(s.is_valid_at(s.expires_at - Duration::seconds(1)));
        assert!(!s.is_valid_at(s.expires_at));
    }

    #[test]
    fn test_revoked_row_outlives_its_access_token() {
        let s = session(Duration::hours(1), true);
        assert!(!s.is_purgeable_at(s.access_expires_at - Duration::seconds(1)));
        assert!(s.is_purgeable_at(s.access_expires_at));

        let live = session(Duration::hours(1), false);
        assert!(!live.is_purgeable_at(live.access_expires_at));
        assert!(live.is_purgeable_at(live.expires_at));
    }

    #[test]
    fn test_hash_token() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
        assert_eq!(hash_token("abc").len(), 64);

        let s = session(Duration::hours(1), false);
        assert!(s.matches_access_token("a"));
        assert!(!s.matches_access_token("r"));
    }
}
