//! Storage layer
//! 身份仓库与会话存储的抽象，以及 PostgreSQL / 内存两种实现

pub mod identity_repo;
pub mod memory;
pub mod session_repo;

pub use identity_repo::PgIdentityRepository;
pub use memory::{InMemoryIdentityRepository, InMemorySessionStore};
pub use session_repo::PgSessionStore;

use crate::models::{Identity, NewIdentity, Session};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// 存储层错误，不直接暴露给 HTTP 调用方
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突，携带冲突字段名
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// 将 sqlx 错误归类，唯一约束冲突按约束名映射到字段
pub(crate) fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some("users_email_key") => "email",
                Some("users_username_key") => "username",
                Some(other) => other,
                None => "unknown",
            };
            return StoreError::Conflict(field.to_string());
        }
    }

    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Database(other),
    }
}

/// 身份仓库（外部协作方，认证子系统只读写这里定义的字段）
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Identity, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError>;

    async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError>;

    /// 创建身份，邮箱/用户名冲突返回 `Conflict`
    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError>;

    async fn is_email_exists(&self, email: &str) -> Result<bool, StoreError>;

    async fn is_username_exists(&self, username: &str) -> Result<bool, StoreError>;
}

/// 会话存储：令牌对的权威记录
///
/// 查询接口接收原始令牌，实现内部按摘要查找。
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, StoreError>;

    async fn get_by_access_token(&self, access_token: &str) -> Result<Session, StoreError>;

    /// 标记撤销；幂等，会话不存在时返回 `NotFound`
    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError>;

    /// 原子轮换：条件撤销旧会话并写入新会话。
    /// 旧会话已失效时返回 `false`，且不会写入新会话。
    async fn rotate(&self, old_id: Uuid, new_session: &Session) -> Result<bool, StoreError>;

    /// 撤销某身份下所有仍未撤销的会话，返回受影响数量
    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64, StoreError>;

    /// 清理已过期的会话，以及访问令牌也已过期的已撤销会话，返回删除数量。
    /// 删除不能改变任何令牌的校验结果。
    async fn delete_expired_or_revoked(&self) -> Result<u64, StoreError>;
}
