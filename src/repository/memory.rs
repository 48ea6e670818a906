//! 内存存储实现
//! 与 PostgreSQL 实现语义一致，用于 memory 后端和测试

use super::{IdentityRepository, SessionStore, StoreError};
use crate::models::{session::hash_token, Identity, IdentityStatus, NewIdentity, Session};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

/// 内存身份仓库
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    identities: DashMap<Uuid, Identity>,
    by_email: DashMap<String, Uuid>,
    by_username: DashMap<String, Uuid>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 修改身份状态（管理操作，不属于认证流程）
    pub fn set_status(&self, id: Uuid, status: IdentityStatus) -> Result<(), StoreError> {
        let mut identity = self.identities.get_mut(&id).ok_or(StoreError::NotFound)?;
        identity.status = status.into();
        identity.updated_at = Utc::now();
        Ok(())
    }

    fn lookup(&self, index: &DashMap<String, Uuid>, key: &str) -> Result<Identity, StoreError> {
        let id = index.get(key).map(|entry| *entry).ok_or(StoreError::NotFound)?;
        self.identities
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl IdentityRepository for InMemoryIdentityRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Identity, StoreError> {
        self.identities
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> Result<Identity, StoreError> {
        self.lookup(&self.by_email, email)
    }

    async fn get_by_username(&self, username: &str) -> Result<Identity, StoreError> {
        self.lookup(&self.by_username, username)
    }

    async fn create(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let identity = identity.into_identity();

        // 先占用邮箱，再占用用户名；后者冲突时释放前者
        match self.by_email.entry(identity.email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Conflict("email".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(identity.id);
            }
        }

        match self.by_username.entry(identity.username.clone()) {
            Entry::Occupied(_) => {
                self.by_email.remove(&identity.email);
                return Err(StoreError::Conflict("username".to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(identity.id);
            }
        }

        self.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn is_email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.by_email.contains_key(email))
    }

    async fn is_username_exists(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.by_username.contains_key(username))
    }
}

/// 内存会话存储
///
/// 条件撤销在持有会话条目写锁时完成，并发轮换只会有一方成功。
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<Uuid, Session>,
    by_access: DashMap<String, Uuid>,
    by_refresh: DashMap<String, Uuid>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn lookup(&self, index: &DashMap<String, Uuid>, token: &str) -> Result<Session, StoreError> {
        let id = index
            .get(&hash_token(token))
            .map(|entry| *entry)
            .ok_or(StoreError::NotFound)?;
        self.sessions
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound)
    }

    fn insert(&self, session: &Session) -> Result<(), StoreError> {
        match self.by_access.entry(session.access_token_hash.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict("access_token_hash".to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }

        match self.by_refresh.entry(session.refresh_token_hash.clone()) {
            Entry::Occupied(_) => {
                self.by_access.remove(&session.access_token_hash);
                return Err(StoreError::Conflict("refresh_token_hash".to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }

        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn remove(&self, session: &Session) {
        if self.sessions.remove(&session.id).is_some() {
            self.by_access.remove(&session.access_token_hash);
            self.by_refresh.remove(&session.refresh_token_hash);
        }
    }

    fn conditional_revoke(&self, id: Uuid) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut session) if session.is_valid() => {
                session.revoked = true;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.insert(session)
    }

    async fn get_by_refresh_token(&self, refresh_token: &str) -> Result<Session, StoreError> {
        self.lookup(&self.by_refresh, refresh_token)
    }

    async fn get_by_access_token(&self, access_token: &str) -> Result<Session, StoreError> {
        self.lookup(&self.by_access, access_token)
    }

    async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError> {
        let mut session = self.sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        session.revoked = true;
        Ok(())
    }

    async fn rotate(&self, old_id: Uuid, new_session: &Session) -> Result<bool, StoreError> {
        // 先写入新会话：写入失败时旧会话保持原状
        self.insert(new_session)?;

        if !self.conditional_revoke(old_id) {
            self.remove(new_session);
            return Ok(false);
        }

        Ok(true)
    }

    async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64, StoreError> {
        let mut revoked = 0;
        for mut session in self.sessions.iter_mut() {
            if session.identity_id == identity_id && !session.revoked {
                session.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_expired_or_revoked(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let stale: Vec<Session> = self
            .sessions
            .iter()
            .filter(|entry| entry.is_purgeable_at(now))
            .map(|entry| entry.clone())
            .collect();

        let mut purged = 0;
        for session in stale {
            // 收集与删除之间状态可能变化，删除时再确认一次
            if self
                .sessions
                .remove_if(&session.id, |_, current| current.is_purgeable_at(now))
                .is_some()
            {
                self.by_access.remove(&session.access_token_hash);
                self.by_refresh.remove(&session.refresh_token_hash);
                purged += 1;
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_identity(email: &str, username: &str) -> NewIdentity {
        NewIdentity {
            organization_id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            name: "Alice".to_string(),
            username: username.to_string(),
            employee_id: None,
            position: None,
            email: email.to_string(),
            password_hash: "hash".to_string(),
            address: None,
            phone: None,
        }
    }

    fn session_for(identity_id: Uuid, access: &str, refresh: &str) -> Session {
        Session {
            id: Uuid::new_v4(),
            identity_id,
            access_token_hash: hash_token(access),
            refresh_token_hash: hash_token(refresh),
            access_expires_at: Utc::now() + Duration::minutes(15),
            expires_at: Utc::now() + Duration::hours(1),
            revoked: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_identity_uniqueness() {
        let repo = InMemoryIdentityRepository::new();
        repo.create(new_identity("a@x.com", "alice")).await.unwrap();

        assert!(matches!(
            repo.create(new_identity("a@x.com", "other")).await,
            Err(StoreError::Conflict(field)) if field == "email"
        ));
        assert!(matches!(
            repo.create(new_identity("b@x.com", "alice")).await,
            Err(StoreError::Conflict(field)) if field == "username"
        ));

        // 用户名冲突不会残留邮箱占用
        assert!(!repo.is_email_exists("b@x.com").await.unwrap());
        assert!(repo.is_username_exists("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_lookup() {
        let repo = InMemoryIdentityRepository::new();
        let created = repo.create(new_identity("a@x.com", "alice")).await.unwrap();

        assert_eq!(repo.get_by_email("a@x.com").await.unwrap().id, created.id);
        assert_eq!(repo.get_by_username("alice").await.unwrap().id, created.id);
        assert_eq!(repo.get_by_id(created.id).await.unwrap().email, "a@x.com");
        assert!(matches!(repo.get_by_email("z@x.com").await, Err(StoreError::NotFound)));

        repo.set_status(created.id, IdentityStatus::Disabled).unwrap();
        assert!(!repo.get_by_id(created.id).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_rotate_only_once() {
        let store = InMemorySessionStore::new();
        let identity_id = Uuid::new_v4();
        let old = session_for(identity_id, "a1", "r1");
        store.create_session(&old).await.unwrap();

        let first = session_for(identity_id, "a2", "r2");
        let second = session_for(identity_id, "a3", "r3");
        assert!(store.rotate(old.id, &first).await.unwrap());
        assert!(!store.rotate(old.id, &second).await.unwrap());

        assert!(store.get_by_refresh_token("r2").await.is_ok());
        assert!(matches!(store.get_by_refresh_token("r3").await, Err(StoreError::NotFound)));
        assert!(store.get_by_refresh_token("r1").await.unwrap().revoked);
    }

    #[tokio::test]
    async fn test_failed_rotate_leaves_old_session_untouched() {
        let store = InMemorySessionStore::new();
        let identity_id = Uuid::new_v4();
        let old = session_for(identity_id, "a1", "r1");
        let other = session_for(identity_id, "a2", "r2");
        store.create_session(&old).await.unwrap();
        store.create_session(&other).await.unwrap();

        // 新会话的刷新令牌摘要与已有会话冲突
        let clash = session_for(identity_id, "a3", "r2");
        assert!(matches!(
            store.rotate(old.id, &clash).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(store.get_by_refresh_token("r1").await.unwrap().is_valid());
        assert!(matches!(store.get_by_access_token("a3").await, Err(StoreError::NotFound)));

        // 旧会话已失效时，新会话不会留下
        store.revoke_session(old.id).await.unwrap();
        let late = session_for(identity_id, "a4", "r4");
        assert!(!store.rotate(old.id, &late).await.unwrap());
        assert!(matches!(store.get_by_refresh_token("r4").await, Err(StoreError::NotFound)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_revoke_session_is_idempotent() {
        let store = InMemorySessionStore::new();
        let session = session_for(Uuid::new_v4(), "a", "r");
        store.create_session(&session).await.unwrap();

        store.revoke_session(session.id).await.unwrap();
        store.revoke_session(session.id).await.unwrap();
        assert!(matches!(store.revoke_session(Uuid::new_v4()).await, Err(StoreError::NotFound)));
    }
}
