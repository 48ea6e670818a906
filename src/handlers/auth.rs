//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::{extract_token, AuthContext},
    error::AppError,
    middleware::AppState,
    models::auth::*,
};
use axum::{extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

/// 注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth_service.register(req).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.auth_service.login(req).await?;

    Ok(Json(response))
}

/// 刷新令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let response = state.auth_service.refresh(&req.refresh_token).await?;

    Ok(Json(response))
}

/// 登出：访问令牌取自 Authorization 头，刷新令牌取自请求体
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let access_token = extract_token(&headers)?;

    state
        .auth_service
        .logout(&access_token, &req.refresh_token)
        .await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// 撤销当前身份的全部会话
pub async fn revoke_all(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let revoked_count = state
        .auth_service
        .revoke_all_sessions(auth_context.identity_id)
        .await?;

    Ok(Json(json!({
        "message": "All sessions revoked",
        "revoked_count": revoked_count,
    })))
}

/// 获取当前身份信息
pub async fn me(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    let profile = state
        .auth_service
        .get_current_user(auth_context.identity_id)
        .await?;

    Ok(Json(profile))
}
