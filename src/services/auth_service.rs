//! 认证服务：注册、登录、令牌刷新、登出、撤销与令牌校验
//! 协调身份仓库、密码哈希、令牌签发与会话存储

use crate::{
    auth::{
        jwt::{Claims, TokenIssuer, TokenPair},
        password::CredentialHasher,
    },
    config::AppConfig,
    error::AppError,
    models::{auth::*, Identity, IdentityProfile, NewIdentity, Session},
    repository::{IdentityRepository, SessionStore, StoreError},
};
use std::{future::Future, sync::Arc, time::Duration};
use uuid::Uuid;
use validator::Validate;

pub struct AuthService {
    identities: Arc<dyn IdentityRepository>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<TokenIssuer>,
    hasher: Arc<CredentialHasher>,
    store_timeout: Duration,
}

impl AuthService {
    pub fn new(
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<TokenIssuer>,
        hasher: Arc<CredentialHasher>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            identities,
            sessions,
            tokens,
            hasher,
            store_timeout,
        }
    }

    /// 按配置构建令牌签发器和密码哈希器
    pub fn from_config(
        config: &AppConfig,
        identities: Arc<dyn IdentityRepository>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        Ok(Self::new(
            identities,
            sessions,
            Arc::new(TokenIssuer::from_config(config)?),
            Arc::new(CredentialHasher::from_config(config)?),
            Duration::from_secs(config.session.store_timeout_secs),
        ))
    }

    /// 注册新身份并直接签发会话
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AppError> {
        req.validate()?;

        if self
            .bounded("is_email_exists", self.identities.is_email_exists(&req.email))
            .await?
            .map_err(|e| store_failure("is_email_exists", e))?
        {
            return Err(AppError::EmailTaken);
        }

        if self
            .bounded(
                "is_username_exists",
                self.identities.is_username_exists(&req.username),
            )
            .await?
            .map_err(|e| store_failure("is_username_exists", e))?
        {
            return Err(AppError::UsernameTaken);
        }

        let password = req.password;
        let hasher = self.hasher.clone();
        let password_hash = blocking(move || hasher.hash(&password)).await??;

        let new_identity = NewIdentity {
            organization_id: req.organization_id,
            role_id: req.role_id,
            name: req.name,
            username: req.username,
            employee_id: req.employee_id,
            position: req.position,
            email: req.email,
            password_hash,
            address: req.address,
            phone: req.phone,
        };

        // 存在性检查与插入之间的竞争由唯一约束兜底，映射为 EmailTaken / UsernameTaken
        let identity = self
            .bounded("create_identity", self.identities.create(new_identity))
            .await?
            .map_err(|e| store_failure("create_identity", e))?;

        tracing::info!(identity_id = %identity.id, "Identity registered");

        let pair = self.start_session(&identity).await?;

        Ok(AuthResponse::new(IdentityProfile::from(identity), pair))
    }

    /// 登录；未知邮箱与密码错误返回同一个错误
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AppError> {
        req.validate()?;

        let identity = match self
            .bounded("get_by_email", self.identities.get_by_email(&req.email))
            .await?
        {
            Ok(identity) => identity,
            Err(StoreError::NotFound) => {
                // 与密码校验耗时一致，避免通过响应时间探测邮箱
                let hasher = self.hasher.clone();
                let password = req.password;
                blocking(move || hasher.verify_dummy(&password)).await?;
                return Err(login_failure());
            }
            Err(e) => return Err(store_failure("get_by_email", e)),
        };

        let hasher = self.hasher.clone();
        let password = req.password;
        let password_hash = identity.password_hash.clone();
        let verified = blocking(move || hasher.verify(&password, &password_hash)).await?;

        if !verified {
            return Err(login_failure());
        }

        if !identity.is_active() {
            tracing::info!(identity_id = %identity.id, status = %identity.status, "Login refused for inactive identity");
            return Err(AppError::UserDisabled);
        }

        let pair = self.start_session(&identity).await?;

        tracing::info!(identity_id = %identity.id, "Login succeeded");

        Ok(AuthResponse::new(IdentityProfile::from(identity), pair))
    }

    /// 刷新令牌：旧会话条件撤销与新会话写入在存储层原子完成，刷新令牌只能使用一次
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AppError> {
        let claims = self.tokens.validate_token(refresh_token)?;
        if claims.is_access() {
            return Err(AppError::InvalidToken);
        }

        let session = match self
            .bounded(
                "get_by_refresh_token",
                self.sessions.get_by_refresh_token(refresh_token),
            )
            .await?
        {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AppError::InvalidToken),
            Err(e) => return Err(store_failure("get_by_refresh_token", e)),
        };

        if !session.is_valid() {
            tracing::debug!(session_id = %session.id, revoked = session.revoked, "Refresh with inactive session");
            return Err(AppError::TokenExpired);
        }

        let identity = match self
            .bounded("get_by_id", self.identities.get_by_id(session.identity_id))
            .await?
        {
            Ok(identity) => identity,
            Err(StoreError::NotFound) => return Err(AppError::InvalidToken),
            Err(e) => return Err(store_failure("get_by_id", e)),
        };

        if !identity.is_active() {
            return Err(AppError::UserDisabled);
        }

        let pair = self.issue_pair(&identity)?;
        let new_session = Session::new(identity.id, &pair);

        let rotated = self
            .bounded("rotate", self.sessions.rotate(session.id, &new_session))
            .await?
            .map_err(|e| store_failure("rotate", e))?;

        if !rotated {
            // 并发刷新中落败的一方
            tracing::warn!(session_id = %session.id, "Refresh token already consumed");
            return Err(AppError::TokenRevoked);
        }

        metrics::counter!("auth_sessions_revoked_total").increment(1);
        metrics::counter!("auth_sessions_created_total").increment(1);

        tracing::info!(
            identity_id = %identity.id,
            old_session_id = %session.id,
            session_id = %new_session.id,
            "Session rotated"
        );

        Ok(AuthResponse::new(IdentityProfile::from(identity), pair))
    }

    /// 登出：访问令牌必须属于刷新令牌所在的会话
    pub async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), AppError> {
        let session = match self
            .bounded(
                "get_by_refresh_token",
                self.sessions.get_by_refresh_token(refresh_token),
            )
            .await?
        {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(AppError::InvalidToken),
            Err(e) => return Err(store_failure("get_by_refresh_token", e)),
        };

        if !session.matches_access_token(access_token) {
            tracing::debug!(session_id = %session.id, "Logout with mismatched token pair");
            return Err(AppError::InvalidToken);
        }

        match self
            .bounded("revoke_session", self.sessions.revoke_session(session.id))
            .await?
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(AppError::InvalidToken),
            Err(e) => return Err(store_failure("revoke_session", e)),
        }

        metrics::counter!("auth_sessions_revoked_total").increment(1);
        tracing::info!(identity_id = %session.identity_id, session_id = %session.id, "Session revoked");

        Ok(())
    }

    /// 撤销某身份的全部会话
    pub async fn revoke_all_sessions(&self, identity_id: Uuid) -> Result<u64, AppError> {
        let revoked = self
            .bounded(
                "revoke_all_for_identity",
                self.sessions.revoke_all_for_identity(identity_id),
            )
            .await?
            .map_err(|e| store_failure("revoke_all_for_identity", e))?;

        metrics::counter!("auth_sessions_revoked_total").increment(revoked);
        tracing::info!(identity_id = %identity_id, revoked, "All sessions revoked");

        Ok(revoked)
    }

    /// 校验访问令牌：签名/有效期通过后再检查会话状态。
    /// 找不到会话记录时按签名结果放行。
    pub async fn validate_token(&self, token: &str) -> Result<Claims, AppError> {
        let claims = self.tokens.validate_token(token)?;

        if !claims.is_access() {
            return Err(AppError::InvalidToken);
        }

        match self
            .bounded("get_by_access_token", self.sessions.get_by_access_token(token))
            .await?
        {
            Ok(session) if !session.is_valid() => Err(AppError::TokenRevoked),
            Ok(_) | Err(StoreError::NotFound) => Ok(claims),
            Err(e) => Err(store_failure("get_by_access_token", e)),
        }
    }

    /// 当前身份的公开资料
    pub async fn get_current_user(&self, identity_id: Uuid) -> Result<IdentityProfile, AppError> {
        match self
            .bounded("get_by_id", self.identities.get_by_id(identity_id))
            .await?
        {
            Ok(identity) => Ok(IdentityProfile::from(identity)),
            Err(StoreError::NotFound) => Err(AppError::NotFound("identity".to_string())),
            Err(e) => Err(store_failure("get_by_id", e)),
        }
    }

    fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        self.tokens.generate_token_pair(
            identity.id,
            identity.organization_id,
            identity.role_id,
            &identity.email,
        )
    }

    /// 签发令牌对并持久化会话；会话写入失败则不返回令牌
    async fn start_session(&self, identity: &Identity) -> Result<TokenPair, AppError> {
        let pair = self.issue_pair(identity)?;
        let session = Session::new(identity.id, &pair);

        self.bounded("create_session", self.sessions.create_session(&session))
            .await?
            .map_err(|e| store_failure("create_session", e))?;

        metrics::counter!("auth_sessions_created_total").increment(1);
        tracing::debug!(identity_id = %identity.id, session_id = %session.id, "Session created");

        Ok(pair)
    }

    /// 为单次存储调用加上超时；外层错误为超时，内层为存储错误
    async fn bounded<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<Result<T, StoreError>, AppError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| {
                tracing::warn!(operation, timeout = ?self.store_timeout, "Store call timed out");
                AppError::Timeout(operation.to_string())
            })
    }
}

/// 存储错误归类并附上操作上下文
fn store_failure(operation: &str, err: StoreError) -> AppError {
    match err {
        StoreError::Database(e) => {
            tracing::error!(operation, error = %e, "Store operation failed");
            AppError::internal(operation, e)
        }
        other => AppError::from(other),
    }
}

fn login_failure() -> AppError {
    metrics::counter!("auth_login_failures_total").increment(1);
    AppError::InvalidCredentials
}

/// 在阻塞线程池上执行 CPU 密集型任务（密码哈希）
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("blocking task failed", e))
}
