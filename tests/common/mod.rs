//! 测试公共模块
//! 提供测试配置、内存后端的认证服务和路由

#![allow(dead_code)]

use catalog_auth::{
    auth::{jwt::TokenIssuer, password::CredentialHasher},
    config::{
        AppConfig, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig, SessionConfig,
        StorageBackend, StorageConfig,
    },
    middleware::AppState,
    models::auth::{LoginRequest, RegisterRequest},
    repository::{InMemoryIdentityRepository, InMemorySessionStore},
    services::AuthService,
};
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";
pub const TEST_ISSUER: &str = "catalog-auth";
pub const TEST_PASSWORD: &str = "longenough1";

/// 创建测试配置（memory 后端，低成本 Argon2 参数）
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
            max_body_bytes: 64 * 1024,
        },
        database: DatabaseConfig {
            url: std::env::var("TEST_DATABASE_URL").ok().map(Secret::new),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new(TEST_SECRET.to_string()),
            jwt_issuer: TEST_ISSUER.to_string(),
            access_token_exp_secs: 900,
            refresh_token_exp_secs: 604800,
            password_hash_memory_kib: 1024,
            password_hash_iterations: 1,
            password_hash_parallelism: 1,
        },
        session: SessionConfig {
            cleanup_interval_secs: 3600,
            store_timeout_secs: 5,
        },
    }
}

/// 内存后端的测试上下文
pub struct TestContext {
    pub service: Arc<AuthService>,
    pub identities: Arc<InMemoryIdentityRepository>,
    pub sessions: Arc<InMemorySessionStore>,
    pub issuer: Arc<TokenIssuer>,
}

pub fn create_test_context() -> TestContext {
    let config = create_test_config();
    let identities = Arc::new(InMemoryIdentityRepository::new());
    let sessions = Arc::new(InMemorySessionStore::new());
    let issuer = Arc::new(TokenIssuer::from_config(&config).expect("token issuer"));
    let hasher = Arc::new(CredentialHasher::from_config(&config).expect("hasher"));

    let service = Arc::new(AuthService::new(
        identities.clone(),
        sessions.clone(),
        issuer.clone(),
        hasher,
        Duration::from_secs(config.session.store_timeout_secs),
    ));

    TestContext {
        service,
        identities,
        sessions,
        issuer,
    }
}

/// 创建测试应用（路由 + 上下文）
pub fn create_test_app() -> (axum::Router, TestContext) {
    let ctx = create_test_context();
    let state = Arc::new(AppState {
        config: create_test_config(),
        auth_service: ctx.service.clone(),
        db: None,
    });

    (catalog_auth::routes::create_router(state), ctx)
}

pub fn register_request(email: &str, username: &str) -> RegisterRequest {
    RegisterRequest {
        organization_id: Uuid::new_v4(),
        role_id: Uuid::new_v4(),
        name: "Test User".to_string(),
        username: username.to_string(),
        employee_id: Some("E-001".to_string()),
        position: None,
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        address: None,
        phone: None,
    }
}

pub fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}
