use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("记录不存在: {0}")]
    NotFound(String),

    #[error("记录已存在: {0}")]
    Duplicate(String),

    #[error("存储错误: {0}")]
    Backend(String),
}

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    University,
    Vocational,
    HighSchool,
    MiddleSchool,
    Other,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::University => "university",
            DocumentCategory::Vocational => "vocational",
            DocumentCategory::HighSchool => "high_school",
            DocumentCategory::MiddleSchool => "middle_school",
            DocumentCategory::Other => "other",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "university" => Ok(DocumentCategory::University),
            "vocational" => Ok(DocumentCategory::Vocational),
            "high_school" => Ok(DocumentCategory::HighSchool),
            "middle_school" => Ok(DocumentCategory::MiddleSchool),
            "other" => Ok(DocumentCategory::Other),
            other => Err(StoreError::Backend(format!("未知的文档分类: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: DocumentCategory,
    pub file_name: String,
    pub content_type: String,
    pub storage_url: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub description: String,
    pub category: DocumentCategory,
    pub file_name: String,
    pub content_type: String,
    pub storage_url: String,
    pub owner_id: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 邮箱重复时返回 `StoreError::Duplicate`
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: NewDocument) -> Result<Document, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// 按创建时间倒序
    async fn list(&self, category: Option<DocumentCategory>) -> Result<Vec<Document>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// 邮箱统一去空白并转小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
