use actix_web::{web, HttpResponse};
use log::{info, warn};
use serde::Deserialize;
use validator::Validate;

use super::validation_error;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::store::{DocumentCategory, NewDocument};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<DocumentCategory>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度须在 1 到 200 个字符之间"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000, message = "描述不能超过 5000 个字符"))]
    pub description: String,
    pub category: DocumentCategory,
    #[validate(length(min = 1, max = 255, message = "文件名长度须在 1 到 255 个字符之间"))]
    pub file_name: String,
    #[validate(url(message = "存储地址无效"))]
    pub storage_url: String,
}

pub async fn list(
    query: web::Query<ListQuery>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let documents = data.documents.list(query.category).await?;
    Ok(HttpResponse::Ok().json(documents))
}

pub async fn get(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    match data.documents.get(&id).await? {
        Some(document) => Ok(HttpResponse::Ok().json(document)),
        None => Err(ApiError::NotFound(format!("文档 {} 不存在", id))),
    }
}

pub async fn create(
    user: AuthUser,
    body: web::Json<CreateDocumentRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    body.validate().map_err(validation_error)?;

    let content_type = mime_guess::from_path(&body.file_name)
        .first_or_octet_stream()
        .to_string();

    let document = data
        .documents
        .create(NewDocument {
            title: body.title.trim().to_string(),
            description: body.description,
            category: body.category,
            file_name: body.file_name,
            content_type,
            storage_url: body.storage_url,
            owner_id: user.0.sub,
        })
        .await?;

    info!("用户 {} 上传文档 {} ({})", document.owner_id, document.id, document.category);
    Ok(HttpResponse::Created().json(document))
}

pub async fn delete(
    user: AuthUser,
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let document = data
        .documents
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("文档 {} 不存在", id)))?;

    let claims = user.0;
    if document.owner_id != claims.sub && !claims.is_admin() {
        warn!("用户 {} 试图删除他人的文档 {}", claims.sub, id);
        return Err(ApiError::AccessDenied("只能删除自己上传的文档".to_string()));
    }

    data.documents.delete(&id).await?;
    info!("文档 {} 已被 {} 删除", id, claims.sub);
    Ok(HttpResponse::NoContent().finish())
}
