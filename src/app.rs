use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    http::{header, StatusCode},
    middleware::{ErrorHandlers, Logger},
    web, App, Error,
};
use log::warn;

use crate::api;
use crate::auth::TokenAuth;
use crate::error::render_internal_error;
use crate::security::{RateLimit, SanitizingFilter, SecurityHeaders, HEADER_LIMIT, HEADER_REMAINING};
use crate::AppState;

/// 组装应用。actix 中后注册的 wrap 先执行，因此请求依次经过：
/// 清洗过滤 -> 全局限流 -> 令牌校验 -> (登录路由) 登录尝试检查 -> 处理器
pub fn build_app(
    state: web::Data<AppState>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let attempts = state.attempts.clone();
    let cors = build_cors(&state.config.cors_allowed_origins);
    let filter = SanitizingFilter::new(
        state.sanitizer.clone(),
        SecurityHeaders::from_config(&state.config),
    );
    let rate_limit = RateLimit::new(state.rate_limiter.clone());
    let token_auth = TokenAuth::new(state.tokens.clone());

    App::new()
        .app_data(state)
        .app_data(api::json_config())
        .app_data(api::query_config())
        .app_data(api::path_config())
        .configure(|cfg| api::configure(cfg, attempts))
        .default_service(web::to(api::not_found))
        .wrap(ErrorHandlers::new().handler(StatusCode::INTERNAL_SERVER_ERROR, render_internal_error))
        .wrap(token_auth)
        .wrap(rate_limit)
        .wrap(filter)
        .wrap(cors)
        .wrap(Logger::new("%a \"%r\" %s %b %T"))
}

fn build_cors(origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers(vec![HEADER_LIMIT, HEADER_REMAINING])
        .max_age(3600);

    for origin in origins {
        if origin == "*" {
            warn!("CORS 允许任意来源");
            cors = cors.allow_any_origin();
        } else {
            cors = cors.allowed_origin(origin);
        }
    }
    cors
}
