use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::middleware::ErrorHandlerResponse;
use actix_web::{HttpResponse, ResponseError};
use chrono::Utc;
use log::error;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

const INTERNAL_MESSAGE: &str = "服务器内部错误";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("认证失败: {0}")]
    Authentication(String),

    #[error("请求过于频繁: {message}")]
    RateLimited {
        message: String,
        remaining_seconds: i64,
    },

    #[error("请求参数无效: {0}")]
    Validation(String),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("无权访问: {0}")]
    AccessDenied(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(rename = "remainingSeconds", skip_serializing_if = "Option::is_none")]
    remaining_seconds: Option<i64>,
}

/// 500 响应的统一结构
#[derive(Debug, Serialize)]
pub struct InternalErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ApiError {
    pub fn rate_limited(message: impl Into<String>, remaining_seconds: i64) -> Self {
        ApiError::RateLimited {
            message: message.into(),
            remaining_seconds,
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let reason = status.canonical_reason().unwrap_or("Error");

        let (message, remaining_seconds) = match self {
            ApiError::Authentication(m)
            | ApiError::Validation(m)
            | ApiError::NotFound(m)
            | ApiError::AccessDenied(m) => (m.as_str(), None),
            ApiError::RateLimited {
                message,
                remaining_seconds,
            } => (message.as_str(), Some(*remaining_seconds)),
            ApiError::Internal(detail) => {
                // 内部细节只写日志，不返回给客户端
                error!("内部错误: {}", detail);
                (INTERNAL_MESSAGE, None)
            }
        };

        let mut builder = HttpResponse::build(status);
        if let Some(seconds) = remaining_seconds {
            builder.insert_header((header::RETRY_AFTER, HeaderValue::from(seconds.max(0) as u64)));
        }
        builder.json(ErrorBody {
            error: reason,
            message,
            remaining_seconds,
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Duplicate(what) => ApiError::Validation(format!("{} 已存在", what)),
            StoreError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(format!("阻塞任务执行失败: {}", e))
    }
}

/// 顶层 500 处理：统一改写为带路径的通用错误结构
pub fn render_internal_error<B: MessageBody>(
    res: ServiceResponse<B>,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let path = res.request().path().to_string();
    error!("请求 {} 返回 500", path);

    let body = InternalErrorBody {
        timestamp: Utc::now().to_rfc3339(),
        status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        error: "Internal Server Error".to_string(),
        message: INTERNAL_MESSAGE.to_string(),
        path,
    };

    let (req, _) = res.into_parts();
    let response = HttpResponse::InternalServerError().json(body);
    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, response).map_into_right_body(),
    ))
}
