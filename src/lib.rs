//! 数据目录平台的认证与会话子系统
//! 签发、校验、轮换和撤销访问凭证

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;
pub mod telemetry;
