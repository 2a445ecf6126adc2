use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use uuid::Uuid;

use super::{
    normalize_email, Document, DocumentCategory, DocumentStore, NewDocument, NewUser, StoreError,
    User, UserStore,
};

/// 进程内存储，用于本地开发和测试
#[derive(Default)]
pub struct MemoryStore {
    // email -> user
    users: DashMap<String, User>,
    documents: DashMap<String, Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&user.email);
        match self.users.entry(email.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("邮箱".to_string())),
            Entry::Vacant(slot) => {
                let created = User {
                    id: Uuid::new_v4().to_string(),
                    name: user.name,
                    email,
                    password_hash: user.password_hash,
                    role: user.role,
                    created_at: Utc::now(),
                };
                slot.insert(created.clone());
                debug!("内存存储新增用户 {}", created.id);
                Ok(created)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .get(&normalize_email(email))
            .map(|u| u.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.value().clone()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, document: NewDocument) -> Result<Document, StoreError> {
        let created = Document {
            id: Uuid::new_v4().to_string(),
            title: document.title,
            description: document.description,
            category: document.category,
            file_name: document.file_name,
            content_type: document.content_type,
            storage_url: document.storage_url,
            owner_id: document.owner_id,
            created_at: Utc::now(),
        };
        self.documents.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(id).map(|d| d.value().clone()))
    }

    async fn list(&self, category: Option<DocumentCategory>) -> Result<Vec<Document>, StoreError> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| category.map_or(true, |c| d.category == c))
            .map(|d| d.value().clone())
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("文档 {}", id)))
    }
}
