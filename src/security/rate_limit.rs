use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, ResponseError,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, info, warn};
use std::sync::Arc;

use super::blocklist::BlockList;
use super::client_ip;
use crate::config::RateLimitConfig;
use crate::error::ApiError;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";

struct RequestCounter {
    count: u32,
    window_started: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateDecision {
    Allowed { limit: u32, remaining: u32 },
    Blocked { remaining_seconds: i64 },
    Disabled,
}

/// 全局按 IP 限流：窗口内请求数超过突发上限即封禁固定时长
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: DashMap<String, RequestCounter>,
    blocks: BlockList,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            "初始化全局限流: 突发上限 {} / {} 秒, 封禁 {} 秒, 每秒速率 {} (仅配置, 不强制)",
            config.burst,
            config.window.num_seconds(),
            config.block_duration.num_seconds(),
            config.requests_per_second
        );
        Self {
            config,
            counters: DashMap::new(),
            blocks: BlockList::new(),
        }
    }

    pub fn check(&self, ip: &str) -> RateDecision {
        self.check_at(ip, Utc::now())
    }

    pub fn check_at(&self, ip: &str, now: DateTime<Utc>) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::Disabled;
        }

        let limit = self.config.burst;
        let mut counter = self
            .counters
            .entry(ip.to_string())
            .or_insert_with(|| RequestCounter {
                count: 0,
                window_started: now,
            });

        // 封禁优先于计数；必须持有计数条目时检查，封禁也是在持有条目时写入的
        if let Some(expires_at) = self.blocks.active_until(ip, now) {
            return RateDecision::Blocked {
                remaining_seconds: super::blocklist::ceil_seconds(expires_at - now),
            };
        }

        if now - counter.window_started >= self.config.window {
            counter.count = 0;
            counter.window_started = now;
        }
        counter.count += 1;

        if counter.count > limit {
            // 持有计数条目的锁时写入封禁，避免并发请求重复封禁
            let expires_at = self.blocks.block(ip, self.config.block_duration, now);
            counter.count = 0;
            counter.window_started = expires_at;
            warn!("IP {} 请求过于频繁，封禁 {} 秒", ip, self.config.block_duration.num_seconds());
            return RateDecision::Blocked {
                remaining_seconds: super::blocklist::ceil_seconds(expires_at - now),
            };
        }

        RateDecision::Allowed {
            limit,
            remaining: limit - counter.count,
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let window = self.config.window;
        let before = self.counters.len();
        self.counters.retain(|_, c| now - c.window_started < window);
        let purged = before - self.counters.len() + self.blocks.purge_expired(now);
        debug!("全局限流清理了 {} 个过期条目", purged);
        purged
    }
}

#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitService {
            service: Arc::new(service),
            limiter: self.limiter.clone(),
        }))
    }
}

pub struct RateLimitService<S> {
    service: Arc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitService<S>
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
        let decision = self.limiter.check(&ip);

        if let RateDecision::Blocked { remaining_seconds } = decision {
            debug!("拒绝被封禁 IP {} 的请求: {}", ip, req.path());
            let response = ApiError::rate_limited(
                format!("请求过于频繁，请在 {} 秒后重试", remaining_seconds),
                remaining_seconds,
            )
            .error_response();
            return Box::pin(async move { Ok(req.into_response(response).map_into_right_body()) });
        }

        let service = self.service.clone();
        Box::pin(async move {
            let mut res = service.call(req).await?;
            if let RateDecision::Allowed { limit, remaining } = decision {
                let headers = res.headers_mut();
                headers.insert(HeaderName::from_static(HEADER_LIMIT), HeaderValue::from(limit));
                headers.insert(
                    HeaderName::from_static(HEADER_REMAINING),
                    HeaderValue::from(remaining),
                );
            }
            Ok(res.map_into_left_body())
        })
    }
}
