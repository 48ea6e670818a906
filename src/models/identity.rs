//! Identity domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity record as owned by the identity repository
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub role_id: Uuid,
    pub name: String,
    pub username: String,
    pub employee_id: Option<String>,
    pub position: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub thumbnail: Option<String>,

    // Account state
    pub status: String, // active, disabled, suspended

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    pub fn status(&self) -> IdentityStatus {
        IdentityStatus::from(self.status.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status() == IdentityStatus::Active
    }
}

/// Identity status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdentityStatus {
    Active,
    Disabled,
    Suspended,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "active",
            IdentityStatus::Disabled => "disabled",
            IdentityStatus::Suspended => "suspended",
        }
    }
}

// Unknown values fall back to Disabled so a bad row can never log in
impl From<String> for IdentityStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "active" => IdentityStatus::Active,
            "suspended" => IdentityStatus::Suspended,
            _ => IdentityStatus::Disabled,
        }
    }
}

impl From<IdentityStatus> for String {
    fn from(status: IdentityStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Fields needed to create an identity; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub organization_id: Uuid,
    pub role_id: Uuid,
    pub name: String,
    pub username: String,
    pub employee_id: Option<String>,
    pub position: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl NewIdentity {
    /// Materialize the record a store would persist, with status = active
    pub fn into_identity(self) -> Identity {
        let now = Utc::now();
        Identity {
            id: Uuid::new_v4(),
            organization_id: self.organization_id,
            role_id: self.role_id,
            name: self.name,
            username: self.username,
            employee_id: self.employee_id,
            position: self.position,
            email: self.email,
            password_hash: self.password_hash,
            address: self.address,
            phone: self.phone,
            thumbnail: None,
            status: IdentityStatus::Active.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public profile (without sensitive data)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityProfile {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub role_id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl From<Identity> for IdentityProfile {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            organization_id: identity.organization_id,
            role_id: identity.role_id,
            name: identity.name,
            username: identity.username,
            email: identity.email,
            thumbnail: identity.thumbnail,
        }
    }
}
