use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::debug;
use std::sync::Arc;

use crate::auth::TokenService;

/// 校验 Bearer 令牌并把身份写入请求扩展。
/// 无令牌或令牌无效时按匿名请求继续，由具体路由决定是否拒绝。
#[derive(Clone)]
pub struct TokenAuth {
    tokens: Arc<TokenService>,
}

impl TokenAuth {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for TokenAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = TokenAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TokenAuthService {
            service: Arc::new(service),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct TokenAuthService<S> {
    service: Arc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for TokenAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = token {
            match self.tokens.claims_of(token) {
                Some(claims) => {
                    debug!("用户 {} 认证成功", claims.sub);
                    req.extensions_mut().insert(claims);
                }
                None => match self.tokens.subject_of(token) {
                    Some(subject) => debug!("用户 {} 的 token 已过期，按匿名处理", subject),
                    None => debug!("无效的 token，按匿名处理"),
                },
            }
        }

        let service = self.service.clone();
        Box::pin(async move { service.call(req).await })
    }
}
