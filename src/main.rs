mod api;
mod app;
mod auth;
mod config;
mod db;
mod error;
mod logger;
mod security;
mod store;

#[cfg(test)]
mod tests;

use actix_web::{web, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;

use auth::{AttemptTracker, PasswordHasher, TokenService};
use config::{AppConfig, StoreBackend};
use security::{HtmlSanitizer, RateLimiter};
use store::{DocumentStore, MemoryStore, PostgresStore, UserStore};

// 应用状态
pub struct AppState {
    pub config: AppConfig,
    pub tokens: Arc<TokenService>,
    pub attempts: Arc<AttemptTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sanitizer: Arc<HtmlSanitizer>,
    pub passwords: PasswordHasher,
    pub users: Arc<dyn UserStore>,
    pub documents: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            tokens: Arc::new(TokenService::new(&config.jwt_secret, config.token_ttl)),
            attempts: Arc::new(AttemptTracker::new(config.login.clone())),
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            sanitizer: Arc::new(HtmlSanitizer::new()),
            passwords: PasswordHasher::new(config.bcrypt_cost),
            users,
            documents,
            config,
        }
    }
}

fn io_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 加载 .env
    dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| io_error("配置错误", e))?;

    // 初始化日志系统
    if let Err(e) = logger::Logger::init(Path::new(&config.log_file), &config.log_level) {
        eprintln!("初始化日志系统失败: {}", e);
    }

    info!("应用程序启动 (环境: {})", config.environment);

    let (users, documents): (Arc<dyn UserStore>, Arc<dyn DocumentStore>) =
        match config.store_backend {
            StoreBackend::Postgres => {
                let db_url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| io_error("配置错误", "缺少 DATABASE_URL"))?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(db_url)
                    .await
                    .map_err(|e| io_error("数据库连接错误", e))?;

                db::initialize_db(pool.clone())
                    .await
                    .map_err(|e| io_error("数据库初始化错误", e))?;

                let store = Arc::new(PostgresStore::new(pool));
                let users: Arc<dyn UserStore> = store.clone();
                let documents: Arc<dyn DocumentStore> = store;
                (users, documents)
            }
            StoreBackend::Memory => {
                info!("使用内存存储，重启后数据会丢失");
                let store = Arc::new(MemoryStore::new());
                let users: Arc<dyn UserStore> = store.clone();
                let documents: Arc<dyn DocumentStore> = store;
                (users, documents)
            }
        };

    let bind_addr = config.bind_addr.clone();
    let sweep_every = config
        .sweep_interval
        .to_std()
        .map_err(|e| io_error("配置错误", e))?
        .max(std::time::Duration::from_secs(1));
    let app_state = web::Data::new(AppState::new(config, users, documents));

    // 定期清理过期的计数与封禁记录，仅用于控制内存
    let sweep_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let purged = sweep_state.attempts.purge_expired() + sweep_state.rate_limiter.purge_expired();
            if purged > 0 {
                info!("清理了 {} 个过期的限流记录", purged);
            }
        }
    });

    info!("服务器启动在 http://{}", bind_addr);

    HttpServer::new(move || app::build_app(app_state.clone()))
        .bind(&bind_addr)
        .map_err(|e| {
            error!("绑定地址 {} 失败: {}", bind_addr, e);
            e
        })?
        .run()
        .await
}
