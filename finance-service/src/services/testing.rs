//! Fixtures shared by the service unit tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use super::images::{ImageStore, LocalImageStore};
use super::repository::{Filter, Repo, Repository};
use crate::middleware::{Actor, Role};
use crate::models::Entity;

/// Smallest payload `ImageFile::decode` accepts as a png.
pub const PNG_BASE64: &str = "iVBORw0KGgo=";

pub fn admin() -> Actor {
    Actor {
        user_id: "admin-1".to_string(),
        user_name: "Admin".to_string(),
        role: Role::Administrator,
        ip_address: Some("10.0.0.1".to_string()),
    }
}

pub fn representative(user_id: &str) -> Actor {
    Actor {
        user_id: user_id.to_string(),
        user_name: format!("Rep {}", user_id),
        role: Role::Representative,
        ip_address: None,
    }
}

pub async fn test_images() -> Arc<dyn ImageStore> {
    let dir = std::env::temp_dir().join(format!("finance-images-{}", Uuid::new_v4()));
    Arc::new(
        LocalImageStore::new(dir, "http://localhost:8080/images")
            .await
            .unwrap(),
    )
}

/// Wraps a repository and fails selected writes on demand.
pub struct FailingRepository<T: Entity> {
    inner: Repo<T>,
    pub fail_insert: AtomicBool,
    pub fail_replace: AtomicBool,
    /// The next `find` sees nothing, as a reader racing a concurrent
    /// insert would.
    pub stale_find: AtomicBool,
}

impl<T: Entity> FailingRepository<T> {
    pub fn wrap(inner: Repo<T>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_replace: AtomicBool::new(false),
            stale_find: AtomicBool::new(false),
        })
    }

    fn injected() -> AppError {
        AppError::DatabaseError(anyhow::anyhow!("injected failure on {}", T::COLLECTION))
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for FailingRepository<T> {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<T>, AppError> {
        self.inner.get_by_id(id).await
    }

    async fn find(&self, filter: Filter) -> Result<Vec<T>, AppError> {
        if self.stale_find.swap(false, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.inner.find(filter).await
    }

    async fn count(&self, filter: Filter) -> Result<u64, AppError> {
        self.inner.count(filter).await
    }

    async fn insert(&self, entity: &T) -> Result<(), AppError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.insert(entity).await
    }

    async fn replace(&self, entity: &mut T) -> Result<(), AppError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.replace(entity).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.soft_delete(id).await
    }

    async fn remove(&self, id: Uuid) -> Result<bool, AppError> {
        self.inner.remove(id).await
    }
}
