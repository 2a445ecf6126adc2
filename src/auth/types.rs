use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{DateTime, Utc};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::store::ROLE_ADMIN;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}

pub struct AttemptCounter {
    pub count: u32,
    pub last_attempt: DateTime<Utc>,
}

/// 需要登录的处理器使用的提取器，匿名请求返回 401
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<Claims>().cloned();
        ready(
            claims
                .map(AuthUser)
                .ok_or_else(|| ApiError::Authentication("请先登录".to_string())),
        )
    }
}
