//! Authentication module: credential hashing, bearer tokens, request guard

pub mod jwt;
pub mod middleware;
pub mod password;

pub use jwt::{Claims, TokenIssuer, TokenPair};
pub use middleware::{auth_middleware, extract_token, AuthContext};
pub use password::CredentialHasher;
