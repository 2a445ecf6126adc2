use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        Uri,
    },
    web::{Bytes, BytesMut},
    Error, HttpMessage, ResponseError,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use futures::StreamExt;
use log::{debug, warn};
use std::sync::Arc;

use super::sanitizer::HtmlSanitizer;
use crate::config::AppConfig;
use crate::error::ApiError;

/// 需要清洗的请求体上限，与 JSON 提取器的限制一致
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// 这些请求头保持原样，清洗会破坏协议语义
pub const EXCLUDED_HEADERS: &[&str] = &[
    "authorization",
    "content-type",
    "content-length",
    "user-agent",
    "host",
    "connection",
    "accept-encoding",
    "accept-language",
];

const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// 响应加固头，启动时按配置生成一次
#[derive(Clone)]
pub struct SecurityHeaders {
    content_security_policy: HeaderValue,
    hsts: bool,
}

impl SecurityHeaders {
    pub fn from_config(config: &AppConfig) -> Self {
        let img_hosts = config.csp_img_hosts.join(" ");
        let connect_hosts = config.csp_connect_hosts.join(" ");
        let policy = format!(
            "default-src 'self'; script-src 'self'; style-src 'self'; font-src 'self'; \
             img-src 'self' data: {}; connect-src 'self' {}; object-src 'none'; \
             frame-ancestors 'none'; base-uri 'self'",
            img_hosts, connect_hosts
        );
        let content_security_policy = HeaderValue::from_str(&policy).unwrap_or_else(|e| {
            warn!("CSP 配置包含非法字符，退回默认策略: {}", e);
            HeaderValue::from_static("default-src 'self'; object-src 'none'; frame-ancestors 'none'")
        });

        Self {
            content_security_policy,
            hsts: !config.is_development(),
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(header::CONTENT_SECURITY_POLICY, self.content_security_policy.clone());
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block"));
        headers.insert(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        if self.hsts {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE));
        }
    }
}

#[derive(Clone)]
pub struct SanitizingFilter {
    sanitizer: Arc<HtmlSanitizer>,
    headers: SecurityHeaders,
}

impl SanitizingFilter {
    pub fn new(sanitizer: Arc<HtmlSanitizer>, headers: SecurityHeaders) -> Self {
        Self { sanitizer, headers }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SanitizingFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SanitizingFilterService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SanitizingFilterService {
            service: Arc::new(service),
            sanitizer: self.sanitizer.clone(),
            headers: self.headers.clone(),
        }))
    }
}

pub struct SanitizingFilterService<S> {
    service: Arc<S>,
    sanitizer: Arc<HtmlSanitizer>,
    headers: SecurityHeaders,
}

impl<S, B> Service<ServiceRequest> for SanitizingFilterService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let sanitizer = self.sanitizer.clone();
        let security_headers = self.headers.clone();

        Box::pin(async move {
            sanitize_headers(&sanitizer, req.headers_mut());
            sanitize_query(&sanitizer, &mut req);
            if let Err(e) = sanitize_body(&sanitizer, &mut req).await {
                warn!("拒绝请求体 {}: {}", req.path(), e);
                let mut res = req.into_response(e.error_response()).map_into_right_body();
                security_headers.apply(res.headers_mut());
                return Ok(res);
            }

            let mut res = service.call(req).await?;
            security_headers.apply(res.headers_mut());
            Ok(res.map_into_left_body())
        })
    }
}

pub fn sanitize_headers(sanitizer: &HtmlSanitizer, headers: &mut HeaderMap) {
    let names: Vec<HeaderName> = headers
        .keys()
        .filter(|name| !EXCLUDED_HEADERS.contains(&name.as_str()))
        .cloned()
        .collect();

    for name in names {
        let values: Vec<HeaderValue> = headers.get_all(&name).cloned().collect();
        let mut changed = false;
        let cleaned: Vec<HeaderValue> = values
            .into_iter()
            .map(|value| match value.to_str() {
                Ok(raw) => {
                    let clean = sanitizer.clean(raw);
                    if clean == raw {
                        return value;
                    }
                    changed = true;
                    HeaderValue::from_str(&clean).unwrap_or_else(|_| HeaderValue::from_static(""))
                }
                Err(_) => value,
            })
            .collect();

        if changed {
            debug!("清洗请求头 {}", name);
            headers.remove(&name);
            for value in cleaned {
                headers.append(name.clone(), value);
            }
        }
    }
}

fn sanitize_query(sanitizer: &HtmlSanitizer, req: &mut ServiceRequest) {
    let Some(query) = req.uri().query().filter(|q| !q.is_empty()) else {
        return;
    };
    let Some(cleaned) = sanitizer.clean_form(query) else {
        return;
    };

    let path = req.uri().path().to_string();
    let mut parts = req.uri().clone().into_parts();
    let path_and_query = format!("{}?{}", path, cleaned);
    match path_and_query.parse() {
        Ok(pq) => {
            parts.path_and_query = Some(pq);
            match Uri::from_parts(parts) {
                Ok(uri) => {
                    debug!("清洗查询参数: {}", path);
                    req.match_info_mut().get_mut().update(&uri);
                    req.head_mut().uri = uri;
                }
                Err(e) => warn!("重建 URI 失败: {}", e),
            }
        }
        Err(e) => warn!("重建查询串失败: {}", e),
    }
}

async fn sanitize_body(sanitizer: &HtmlSanitizer, req: &mut ServiceRequest) -> Result<(), ApiError> {
    let content_type = req.content_type().to_ascii_lowercase();
    let is_json = content_type == "application/json" || content_type.ends_with("+json");
    let is_form = content_type == "application/x-www-form-urlencoded";
    if !is_json && !is_form {
        return Ok(());
    }

    let too_large = || ApiError::Validation(format!("请求体超过 {} 字节上限", MAX_BODY_BYTES));
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.map_or(false, |len| len > MAX_BODY_BYTES) {
        return Err(too_large());
    }

    // 分块读取，超过上限立即停止
    let mut payload = req.take_payload();
    let mut body = BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| ApiError::Validation(format!("读取请求体失败: {}", e)))?;
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    let original = body.freeze();

    let cleaned = if is_json {
        match serde_json::from_slice::<serde_json::Value>(&original) {
            Ok(mut value) => {
                sanitizer.clean_value(&mut value);
                serde_json::to_vec(&value).ok().map(Bytes::from)
            }
            // 非法 JSON 原样交给提取器报 400
            Err(_) => None,
        }
    } else {
        std::str::from_utf8(&original)
            .ok()
            .and_then(|form| sanitizer.clean_form(form))
            .map(Bytes::from)
    };

    let body = match cleaned {
        Some(cleaned) if cleaned != original => {
            debug!("清洗请求体: {}", req.path());
            req.headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(cleaned.len()));
            cleaned
        }
        _ => original,
    };

    req.set_payload(Payload::from(body));
    Ok(())
}
