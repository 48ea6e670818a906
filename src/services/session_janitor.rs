//! 会话清理任务
//! 定期删除已过期或已撤销的会话，与请求处理相互独立

use crate::repository::{SessionStore, StoreError};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

/// 在作用域结束时清除运行标记，run_once 被取消或 panic 时同样生效
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionJanitor {
    store: Arc<dyn SessionStore>,
    running: AtomicBool,
}

/// 后台清理任务句柄
pub struct JanitorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl JanitorHandle {
    /// 通知任务退出并等待其结束
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Session janitor task ended abnormally");
        }
    }
}

impl SessionJanitor {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            running: AtomicBool::new(false),
        }
    }

    /// 执行一次清理。已有清理在进行时直接跳过并返回 `None`。
    pub async fn run_once(&self) -> Result<Option<u64>, StoreError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Session cleanup already in progress, skipping");
            return Ok(None);
        }
        let _guard = RunningGuard(&self.running);

        let purged = self.store.delete_expired_or_revoked().await?;
        if purged > 0 {
            metrics::counter!("auth_sessions_purged_total").increment(purged);
        }
        tracing::info!(purged, "Session cleanup completed");

        Ok(Some(purged))
    }

    /// 启动周期清理任务
    pub fn spawn(self: Arc<Self>, every: Duration) -> JanitorHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Session cleanup failed");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Session janitor stopped");
        });

        JanitorHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{session::hash_token, Session};
    use crate::repository::InMemorySessionStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    fn session(token: &str, expires_in: ChronoDuration, revoked: bool) -> Session {
        session_with(token, expires_in, expires_in, revoked)
    }

    fn session_with(
        token: &str,
        access_expires_in: ChronoDuration,
        expires_in: ChronoDuration,
        revoked: bool,
    ) -> Session {
        Session {
            id: Uuid::new_v4(),
            identity_id: Uuid::new_v4(),
            access_token_hash: hash_token(&format!("a-{token}")),
            refresh_token_hash: hash_token(&format!("r-{token}")),
            access_expires_at: Utc::now() + access_expires_in,
            expires_at: Utc::now() + expires_in,
            revoked,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_run_once_purges_only_inactive() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .create_session(&session("live", ChronoDuration::hours(1), false))
            .await
            .unwrap();
        store
            .create_session(&session_with(
                "revoked",
                ChronoDuration::seconds(-5),
                ChronoDuration::hours(1),
                true,
            ))
            .await
            .unwrap();
        store
            .create_session(&session("expired", ChronoDuration::seconds(-5), false))
            .await
            .unwrap();
        // 访问令牌未过期的撤销会话必须保留
        store
            .create_session(&session("recent", ChronoDuration::hours(1), true))
            .await
            .unwrap();

        let janitor = SessionJanitor::new(store.clone());
        assert_eq!(janitor.run_once().await.unwrap(), Some(2));
        assert_eq!(store.len(), 2);
        assert!(store.get_by_refresh_token("r-live").await.is_ok());
        assert!(store.get_by_access_token("a-recent").await.unwrap().revoked);

        // 再次执行是幂等的
        assert_eq!(janitor.run_once().await.unwrap(), Some(0));
    }

    /// 清理调用可被挂起的存储
    struct StallingStore {
        inner: InMemorySessionStore,
        stall: AtomicBool,
    }

    #[async_trait::async_trait]
    impl SessionStore for StallingStore {
        async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
            self.inner.create_session(session).await
        }

        async fn get_by_refresh_token(&self, token: &str) -> Result<Session, StoreError> {
            self.inner.get_by_refresh_token(token).await
        }

        async fn get_by_access_token(&self, token: &str) -> Result<Session, StoreError> {
            self.inner.get_by_access_token(token).await
        }

        async fn revoke_session(&self, id: Uuid) -> Result<(), StoreError> {
            self.inner.revoke_session(id).await
        }

        async fn rotate(&self, old_id: Uuid, new_session: &Session) -> Result<bool, StoreError> {
            self.inner.rotate(old_id, new_session).await
        }

        async fn revoke_all_for_identity(&self, identity_id: Uuid) -> Result<u64, StoreError> {
            self.inner.revoke_all_for_identity(identity_id).await
        }

        async fn delete_expired_or_revoked(&self) -> Result<u64, StoreError> {
            if self.stall.load(Ordering::Acquire) {
                std::future::pending::<()>().await;
            }
            self.inner.delete_expired_or_revoked().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_does_not_block_later_runs() {
        let store = Arc::new(StallingStore {
            inner: InMemorySessionStore::new(),
            stall: AtomicBool::new(true),
        });
        let janitor = SessionJanitor::new(store.clone());

        let cancelled = tokio::time::timeout(Duration::from_millis(20), janitor.run_once()).await;
        assert!(cancelled.is_err());

        store.stall.store(false, Ordering::Release);
        assert_eq!(janitor.run_once().await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .create_session(&session("expired", ChronoDuration::seconds(-5), false))
            .await
            .unwrap();

        let handle = Arc::new(SessionJanitor::new(store.clone())).spawn(Duration::from_secs(3600));

        // interval 的第一次 tick 立即触发
        for _ in 0..50 {
            if store.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty());

        handle.shutdown().await;
    }
}
