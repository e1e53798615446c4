use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::{UserProfile, UserProfileRepository};
use crate::error::AppResult;
use crate::services::dispatcher::ProfileStore;

/// Profile lookups backed by the local `user_profiles` table.
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn find_profile(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        UserProfileRepository::find_by_id(&self.pool, user_id).await
    }
}
