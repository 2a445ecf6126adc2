use crate::auth::types::Claims;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, info};

/// 签发与校验 HS256 令牌，不保存任何服务端状态
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        info!("初始化令牌服务，有效期 {} 秒", ttl.num_seconds());
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str, roles: &[String]) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(subject, roles, Utc::now())
    }

    fn issue_at(
        &self,
        subject: &str,
        roles: &[String],
        issued_at: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        debug!("为用户 {} 生成 JWT token", subject);
        let claims = Claims {
            sub: subject.to_string(),
            roles: roles.to_vec(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!("为用户 {} 生成 token 失败: {}", subject, e);
            e
        })
    }

    /// 解析失败、签名不符或已过期一律返回 false
    pub fn validate(&self, token: &str) -> bool {
        self.claims_of(token).is_some()
    }

    pub fn claims_of(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.strict_validation())
            .map(|data| data.claims)
            .map_err(|e| debug!("Token 验证失败: {}", e))
            .ok()
    }

    /// 只校验签名、不校验有效期；调用方应先用 `validate` 或 `claims_of` 校验
    pub fn subject_of(&self, token: &str) -> Option<String> {
        let mut validation = self.strict_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims.sub)
            .ok()
    }

    fn strict_validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-unit-test-secret!!";

    fn service() -> TokenService {
        TokenService::new(SECRET, Duration::hours(24))
    }

    fn roles() -> Vec<String> {
        vec!["user".to_string()]
    }

    #[test]
    fn freshly_issued_token_is_valid() {
        let tokens = service();
        let token = tokens.issue("user-1", &roles()).unwrap();
        assert!(tokens.validate(&token));

        let claims = tokens.claims_of(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.roles, roles());
        assert_eq!(claims.exp - claims.iat, 86_400);
        assert_eq!(tokens.subject_of(&token).as_deref(), Some("user-1"));
    }

    #[test]
    fn token_is_invalid_after_ttl() {
        let tokens = service();
        let token = tokens
            .issue_at("user-1", &roles(), Utc::now() - Duration::hours(25))
            .unwrap();
        assert!(!tokens.validate(&token));
        // 过期令牌仍可读出主体
        assert_eq!(tokens.subject_of(&token).as_deref(), Some("user-1"));
    }

    #[test]
    fn garbage_and_foreign_tokens_fail_closed() {
        let tokens = service();
        assert!(!tokens.validate(""));
        assert!(!tokens.validate("not.a.jwt"));

        let other = TokenService::new("another-secret-another-secret-xxxx", Duration::hours(1));
        let foreign = other.issue("user-1", &roles()).unwrap();
        assert!(!tokens.validate(&foreign));
        assert!(tokens.subject_of(&foreign).is_none());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tokens = service();
        let token = tokens.issue("user-1", &roles()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = tokens.issue("admin", &["admin".to_string()]).unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap().to_string();
        parts[1] = forged_payload.as_str();
        assert!(!tokens.validate(&parts.join(".")));
    }
}
