use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::storage::{MemoryStorage, Storage, StorageClient};
use crate::users::{memory::MemoryUserRepo, repo::PgUserRepo, repo::UserRepo};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    /// Postgres-backed users and S3/MinIO-backed uploads.
    pub async fn init(config: AppConfig, db: PgPool) -> anyhow::Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;
        let users = Arc::new(PgUserRepo::new(db)) as Arc<dyn UserRepo>;
        Ok(Self {
            config: Arc::new(config),
            users,
            storage,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepo>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            config,
            users,
            storage,
        }
    }

    /// Everything in memory; no database or object store is touched.
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::local()),
            Arc::new(MemoryUserRepo::new()),
            Arc::new(MemoryStorage::new()),
        )
    }
}
