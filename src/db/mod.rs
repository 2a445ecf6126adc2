use log::{error, info};
use sqlx::PgPool;

use crate::store::StoreError;

pub struct DbInitializer {
    pool: PgPool,
}

impl DbInitializer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 初始化用户表
    pub async fn init_user_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id VARCHAR PRIMARY KEY,
                name VARCHAR NOT NULL,
                email VARCHAR UNIQUE NOT NULL,
                password_hash VARCHAR NOT NULL,
                role VARCHAR NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("创建用户表失败: {}", e)))?;

        Ok(())
    }

    /// 初始化文档元数据表
    pub async fn init_document_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id VARCHAR PRIMARY KEY,
                title VARCHAR NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                category VARCHAR NOT NULL CHECK (category IN
                    ('university', 'vocational', 'high_school', 'middle_school', 'other')),
                file_name VARCHAR NOT NULL,
                content_type VARCHAR NOT NULL,
                storage_url VARCHAR NOT NULL,
                owner_id VARCHAR NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("创建文档表失败: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("创建索引失败: {}", e)))?;

        Ok(())
    }
}

/// 初始化所有数据库表
pub async fn initialize_db(pool: PgPool) -> Result<(), StoreError> {
    info!("开始初始化数据库...");
    let initializer = DbInitializer::new(pool);

    initializer.init_user_tables().await.map_err(|e| {
        error!("用户表初始化失败: {:?}", e);
        e
    })?;

    initializer.init_document_tables().await.map_err(|e| {
        error!("文档表初始化失败: {:?}", e);
        e
    })?;

    info!("数据库初始化完成");
    Ok(())
}
