use actix_web::{web, HttpRequest, HttpResponse};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use super::validation_error;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::security::client_ip;
use crate::store::{NewUser, StoreError, ROLE_USER};
use crate::AppState;

const BAD_CREDENTIALS: &str = "邮箱或密码错误";

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 1, message = "请输入密码"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "姓名长度须在 1 到 64 个字符之间"))]
    pub name: String,
    #[validate(email(message = "邮箱格式不正确"))]
    pub email: String,
    #[validate(length(min = 6, max = 72, message = "密码长度须在 6 到 72 个字符之间"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

pub async fn login(
    req: HttpRequest,
    body: web::Json<LoginRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate().map_err(validation_error)?;

    let ip = client_ip::of_request(&req);
    debug!("IP {} 尝试登录: {}", ip, body.email);

    let user = data.users.find_by_email(&body.email).await?;
    let verified = match &user {
        Some(user) => {
            let hasher = data.passwords;
            let password = body.password;
            let hash = user.password_hash.clone();
            web::block(move || hasher.verify(&password, &hash)).await??
        }
        None => false,
    };

    let user = match user {
        Some(user) if verified => user,
        _ => {
            let failures = data.attempts.record_failure(&ip);
            warn!("登录失败: {} (IP {}, 第 {} 次)", body.email, ip, failures);
            return Err(ApiError::Authentication(BAD_CREDENTIALS.to_string()));
        }
    };

    data.attempts.record_success(&ip);

    let token = data
        .tokens
        .issue(&user.id, &[user.role.clone()])
        .map_err(|e| ApiError::Internal(format!("生成token失败: {}", e)))?;

    info!("用户 {} 登录成功", user.id);
    Ok(HttpResponse::Ok().json(LoginResponse {
        token,
        token_type: "Bearer",
        expires_in: data.tokens.ttl().num_seconds(),
    }))
}

pub async fn register(
    body: web::Json<RegisterRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate().map_err(validation_error)?;

    if data.users.find_by_email(&body.email).await?.is_some() {
        warn!("邮箱已被注册: {}", body.email);
        return Err(ApiError::Validation("该邮箱已被注册".to_string()));
    }

    let hasher = data.passwords;
    let password = body.password;
    let password_hash = web::block(move || hasher.hash(&password)).await??;

    let user = data
        .users
        .create(NewUser {
            name: body.name.trim().to_string(),
            email: body.email,
            password_hash,
            role: ROLE_USER.to_string(),
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => ApiError::Validation("该邮箱已被注册".to_string()),
            other => other.into(),
        })?;

    info!("用户注册成功: {}", user.id);
    Ok(HttpResponse::Created().json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
    })))
}

pub async fn me(user: AuthUser, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let claims = user.0;
    // 令牌有效但账户可能已被删除
    let account = data
        .users
        .find_by_id(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound("账户不存在".to_string()))?;

    Ok(HttpResponse::Ok().json(json!({
        "subject": claims.sub,
        "roles": claims.roles,
        "name": account.name,
        "email": account.email,
    })))
}
