use actix_web::{error, web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;
use validator::ValidationErrors;

use crate::auth::{AttemptTracker, LoginGuard};
use crate::error::ApiError;
use crate::security::MAX_BODY_BYTES;

mod auth;
mod documents;

pub fn configure(cfg: &mut web::ServiceConfig, attempts: Arc<AttemptTracker>) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/auth")
                .service(
                    web::resource("/login")
                        .wrap(LoginGuard::new(attempts))
                        .route(web::post().to(auth::login)),
                )
                .route("/register", web::post().to(auth::register))
                .route("/me", web::get().to(auth::me)),
        )
        .service(
            web::scope("/documents")
                .route("", web::get().to(documents::list))
                .route("", web::post().to(documents::create))
                .route("/{id}", web::get().to(documents::get))
                .route("/{id}", web::delete().to(documents::delete)),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound(format!("路径 {} 不存在", req.path())))
}

pub fn validation_error(errors: ValidationErrors) -> ApiError {
    ApiError::Validation(errors.to_string())
}

// 提取器错误统一转成 400
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| ApiError::Validation(format!("请求体格式错误: {}", err)).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(format!("查询参数错误: {}", err)).into())
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err: error::PathError, _req| {
        ApiError::Validation(format!("路径参数错误: {}", err)).into()
    })
}
