use bcrypt::{hash, verify};
use log::{debug, error, warn};

use crate::error::ApiError;

#[derive(Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        debug!("加密密码");
        hash(password.as_bytes(), self.cost).map_err(|e| {
            error!("密码加密失败: {}", e);
            ApiError::Internal(format!("密码加密失败: {}", e))
        })
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        debug!("验证密码");
        match verify(password, hash) {
            Ok(result) => {
                if !result {
                    warn!("密码验证失败");
                }
                Ok(result)
            }
            Err(e) => {
                error!("密码验证过程出错: {}", e);
                Err(ApiError::Internal(format!("密码验证失败: {}", e)))
            }
        }
    }
}
