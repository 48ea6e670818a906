//! Session store (PostgreSQL 会话数据访问)

use super::{map_sqlx, SessionStore, StoreError};
use crate::models::{session::hash_token, Session};
use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, identity_id, access_token_hash, refresh_token_hash, \
     access_expires_at, expires_at, revoked, created_at";

pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_by_hash(&self, column: &str, token_hash: &str) -> Result<Session, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM auth_sessions WHERE {column} = $1");

        sqlx::query_as::<_, Session>(&query)
            .bind(token_hash)
            .fetch_optional(&self.db)
            .await
            .map_err(map_sqlx)?
            .ok_or(StoreError::NotFound)
    }
}

async fn insert_session<'e, E>(executor: E, session: &Session) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO auth_sessions (
            id, identity_id, access_token_hash, refresh_token_hash,
            access_expires_at, expires_at, revoked, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(session.id)
    .bind(session.identity_id)
    .bind(&session.access_token_hash)
    .bind(&session.refresh_token_hash)
    .bind(session.access_expires_at)
    .bind(session.expires_at)
    .bind(session.revoked)
    .bind(session.created_at)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;

    Ok(())
}

/// 条件撤销：只有仍有效的会话会被更新
async fn conditional_revoke<'e, E>(executor: E, id: Uuid) -> Result<bool, StoreError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE auth_sessions SET revoked = TRUE WHERE id = $1 AND revoked = FALSE AND expires_at > NOW()",
    )
    .bind(id)
    .execute(executor)
    .await
    .map_err(map_sqlx)?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        insert_session(&self.db, session).await
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, StoreError> {
        self.find_by_hash("refresh_token_hash", &hash_token(refresh_token))
            .await
    }

    async fn get_by_access_token(&self, access_token: &str) -> Result<Session, StoreError> {
        self.find_by_hash("access_token_hash", &hash_token(access_token))
            .await
    }

    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError> {
        // 已撤销的行同样会被匹配，保证幂等
        let result = sqlx::query("UPDATE auth_sessions SET revoked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn rotate(&self, old_id: Uuid, new_session: &Session) -> Result<bool, StoreError> {
        let mut tx = self.db.begin().await.map_err(map_sqlx)?;

        if !conditional_revoke(&mut *tx, old_id).await? {
            // 未提交的事务在 drop 时回滚
            return Ok(false);
        }

        insert_session(&mut *tx, new_session).await?;
        tx.commit().await.map_err(map_sqlx)?;

        Ok(true)
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked = TRUE WHERE identity_id = $1 AND revoked = FALSE",
        )
        .bind(identity_id)
        .execute(&self.db)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_or_revoked(&self) -> Result<u64, StoreError> {
        // 已撤销的行要等访问令牌自身过期后才删除，否则该令牌会因查不到记录而被放行
        let result = sqlx::query(
            r#"
            DELETE FROM auth_sessions
            WHERE expires_at <= NOW()
               OR (revoked = TRUE AND access_expires_at <= NOW())
            "#,
        )
        .execute(&self.db)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}
