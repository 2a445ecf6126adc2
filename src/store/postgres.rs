use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    normalize_email, Document, DocumentCategory, DocumentStore, NewDocument, NewUser, StoreError,
    User, UserStore,
};

const UNIQUE_VIOLATION: &str = "23505";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    description: String,
    category: String,
    file_name: String,
    content_type: String,
    storage_url: String,
    owner_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category.parse()?,
            file_name: row.file_name,
            content_type: row.content_type,
            storage_url: row.storage_url,
            owner_id: row.owner_id,
            created_at: row.created_at,
        })
    }
}

fn backend(context: &str, e: sqlx::Error) -> StoreError {
    error!("{}: {}", context, e);
    StoreError::Backend(format!("{}: {}", context, e))
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let id = Uuid::new_v4().to_string();
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, email, password_hash, role, created_at
            "#,
        )
        .bind(&id)
        .bind(&user.name)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => {
                debug!("新增用户 {}", created.id);
                Ok(created)
            }
            Err(sqlx::Error::Database(db))
                if db.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(StoreError::Duplicate("邮箱".to_string()))
            }
            Err(e) => Err(backend("创建用户失败", e)),
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, role, created_at FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("按邮箱查询用户失败", e))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, User>(
            "SELECT id, name, email, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("按ID查询用户失败", e))
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn create(&self, document: NewDocument) -> Result<Document, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents
                (id, title, description, category, file_name, content_type, storage_url, owner_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, title, description, category, file_name, content_type, storage_url, owner_id, created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&document.title)
        .bind(&document.description)
        .bind(document.category.as_str())
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(&document.storage_url)
        .bind(&document.owner_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| backend("创建文档失败", e))?;

        row.try_into()
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, title, description, category, file_name, content_type, storage_url, owner_id, created_at
            FROM documents WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| backend("查询文档失败", e))?;

        row.map(Document::try_from).transpose()
    }

    async fn list(&self, category: Option<DocumentCategory>) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, title, description, category, file_name, content_type, storage_url, owner_id, created_at
            FROM documents
            WHERE $1::VARCHAR IS NULL OR category = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| backend("列出文档失败", e))?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| backend("删除文档失败", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("文档 {}", id)));
        }
        Ok(())
    }
}
