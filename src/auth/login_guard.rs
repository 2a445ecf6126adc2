use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::warn;
use std::sync::Arc;

use crate::auth::AttemptTracker;
use crate::error::ApiError;
use crate::security::client_ip;

/// 只挂在登录路由上：被封禁的 IP 无论凭据如何都直接返回 429
#[derive(Clone)]
pub struct LoginGuard {
    tracker: Arc<AttemptTracker>,
}

impl LoginGuard {
    pub fn new(tracker: Arc<AttemptTracker>) -> Self {
        Self { tracker }
    }
}

impl<S, B> Transform<S, ServiceRequest> for LoginGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = LoginGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(LoginGuardService {
            service: Arc::new(service),
            tracker: self.tracker.clone(),
        }))
    }
}

pub struct LoginGuardService<S> {
    service: Arc<S>,
    tracker: Arc<AttemptTracker>,
}

impl<S, B> Service<ServiceRequest> for LoginGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let ip = client_ip::of_service_request(&req);
        if self.tracker.is_blocked(&ip) {
            let remaining = self.tracker.remaining_block_seconds(&ip).max(1);
            warn!("IP {} 登录已被封禁，剩余 {} 秒", ip, remaining);
            let response = ApiError::rate_limited(
                format!("登录尝试次数过多，请在 {} 秒后重试", remaining),
                remaining,
            )
            .error_response();
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let service = self.service.clone();
        Box::pin(async move { Ok(service.call(req).await?.map_into_left_body()) })
    }
}
