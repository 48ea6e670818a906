//! Identity repository (PostgreSQL 身份数据访问)

use super::{map_sqlx, IdentityRepository, StoreError};
use crate::models::{Identity, NewIdentity};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

const IDENTITY_COLUMNS: &str = "id, organization_id, role_id, name, username, employee_id, \
     position, email, password_hash, address, phone, thumbnail, status, created_at, updated_at";

pub struct PgIdentityRepository {
    db: PgPool,
}

impl PgIdentityRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Identity, StoreError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE {column} = $1");

        sqlx::query_as::<_, Identity>(&query)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::NotFound)
    }

    async fn exists(&self, column: &str, value: &str) -> Result<bool, StoreError> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM users WHERE {column} = $1)");

        sqlx::query_scalar::<_, bool>(&query)
            .bind(value)
            .fetch_one(&self.db)
            .await
            .map_err(map_sqlx)
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Identity, StoreError> {
        let query = format!("SELECT {IDENTITY_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, Identity>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        self.find_one("email", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError> {
        self.find_one("username", username).await
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let query = format!(
            r#"
            INSERT INTO users (
                organization_id, role_id, name, username, employee_id, position,
                email, password_hash, address, phone, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active')
            RETURNING {IDENTITY_COLUMNS}
            "#
        );

        let created = sqlx::query_as::<_, Identity>(&query)
            .bind(identity.organization_id)
            .bind(identity.role_id)
            .bind(&identity.name)
            .bind(&identity.username)
            .bind(&identity.employee_id)
            .bind(&identity.position)
            .bind(&identity.email)
            .bind(&identity.password_hash)
            .bind(&identity.address)
            .bind(&identity.phone)
            .fetch_one(&self.db)
            .await
            .map_err(map_sqlx)?;

        tracing::debug!(identity_id = %created.id, "Identity created");

        Ok(created)
    }

    async fn is_email_exists(&self, email: &str) -> Result<bool, StoreError> {
        self.exists("email", email).await
    }

    async fn is_username_exists(&self, username: &str) -> Result<bool, StoreError> {
        self.exists("username", username).await
    }
}
