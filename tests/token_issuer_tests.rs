//! 令牌签发与校验测试
//!
//! 覆盖过期、错误密钥、非固定算法以及篡改令牌

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use catalog_auth::{
    auth::jwt::{Claims, TokenIssuer, TOKEN_TYPE_ACCESS},
    error::AppError,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use uuid::Uuid;

mod common;
use common::{TEST_ISSUER, TEST_SECRET};

fn issuer() -> TokenIssuer {
    TokenIssuer::new(TEST_SECRET, TEST_ISSUER, 900, 604800).unwrap()
}

fn claims_with_window(issued_offset: Duration, ttl: Duration) -> Claims {
    let iat = Utc::now() + issued_offset;
    let id = Uuid::new_v4();
    Claims {
        user_id: id,
        organization_id: Uuid::new_v4(),
        role_id: Uuid::new_v4(),
        email: "a@x.com".to_string(),
        token_type: TOKEN_TYPE_ACCESS.to_string(),
        iss: TEST_ISSUER.to_string(),
        sub: id.to_string(),
        iat: iat.timestamp(),
        nbf: iat.timestamp(),
        exp: (iat + ttl).timestamp(),
        jti: Uuid::new_v4().to_string(),
    }
}

fn sign(claims: &Claims, alg: Algorithm, secret: &str) -> String {
    encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[test]
fn test_valid_token_returns_matching_claims() {
    let service = issuer();
    let (id, org, role) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

    let pair = service.generate_token_pair(id, org, role, "a@x.com").unwrap();
    let claims = service.validate_token(&pair.access_token).unwrap();

    assert_eq!(claims.user_id, id);
    assert_eq!(claims.organization_id, org);
    assert_eq!(claims.role_id, role);
    assert_eq!(claims.email, "a@x.com");
}

#[test]
fn test_token_format_has_three_segments() {
    let pair = issuer()
        .generate_token_pair(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "a@x.com")
        .unwrap();

    for token in [&pair.access_token, &pair.refresh_token] {
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        let header = URL_SAFE_NO_PAD.decode(segments[0]).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        assert_eq!(header["alg"], "HS256");
    }
}

#[test]
fn test_past_expiry_is_token_expired() {
    let claims = claims_with_window(Duration::hours(-2), Duration::hours(1));
    let token = sign(&claims, Algorithm::HS256, TEST_SECRET);

    assert!(matches!(issuer().validate_token(&token), Err(AppError::TokenExpired)));
}

#[test]
fn test_wrong_key_is_invalid() {
    let claims = claims_with_window(Duration::zero(), Duration::hours(1));
    let token = sign(&claims, Algorithm::HS256, "another-secret-that-is-also-32-chars-long");

    assert!(matches!(issuer().validate_token(&token), Err(AppError::InvalidToken)));
}

#[test]
fn test_other_algorithm_is_invalid() {
    let claims = claims_with_window(Duration::zero(), Duration::hours(1));

    for alg in [Algorithm::HS384, Algorithm::HS512] {
        let token = sign(&claims, alg, TEST_SECRET);
        assert!(matches!(issuer().validate_token(&token), Err(AppError::InvalidToken)));
    }
}

#[test]
fn test_expired_token_with_other_algorithm_is_invalid_not_expired() {
    // 算法检查先于过期检查
    let claims = claims_with_window(Duration::hours(-2), Duration::hours(1));
    let token = sign(&claims, Algorithm::HS512, TEST_SECRET);

    assert!(matches!(issuer().validate_token(&token), Err(AppError::InvalidToken)));
}

#[test]
fn test_none_algorithm_is_invalid() {
    let claims = claims_with_window(Duration::zero(), Duration::hours(1));
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

    let unsigned = format!("{header}.{payload}.");
    assert!(matches!(issuer().validate_token(&unsigned), Err(AppError::InvalidToken)));

    // 借用一个合法签名同样无效
    let valid = sign(&claims, Algorithm::HS256, TEST_SECRET);
    let signature = valid.rsplit('.').next().unwrap();
    let forged = format!("{header}.{payload}.{signature}");
    assert!(matches!(issuer().validate_token(&forged), Err(AppError::InvalidToken)));
}

#[test]
fn test_tampered_payload_is_invalid() {
    let service = issuer();
    let pair = service
        .generate_token_pair(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), "a@x.com")
        .unwrap();

    let mut segments: Vec<String> = pair.access_token.split('.').map(str::to_string).collect();
    let mut claims: serde_json::Value =
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(&segments[1]).unwrap()).unwrap();
    claims["role_id"] = serde_json::json!(Uuid::new_v4());
    segments[1] = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());

    assert!(matches!(service.validate_token(&segments.join(".")), Err(AppError::InvalidToken)));
}

#[test]
fn test_not_yet_valid_is_invalid() {
    let claims = claims_with_window(Duration::hours(1), Duration::hours(1));
    let token = sign(&claims, Algorithm::HS256, TEST_SECRET);

    assert!(matches!(issuer().validate_token(&token), Err(AppError::InvalidToken)));
}

#[test]
fn test_garbage_is_invalid() {
    let service = issuer();
    for token in ["", "abc", "a.b", "a.b.c", "....."] {
        assert!(matches!(service.validate_token(token), Err(AppError::InvalidToken)));
    }
}
