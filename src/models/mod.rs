//! 数据模型模块
//! 身份、会话以及认证接口的请求/响应结构

pub mod auth;
pub mod identity;
pub mod session;

pub use identity::{Identity, IdentityProfile, IdentityStatus, NewIdentity};
pub use session::Session;
