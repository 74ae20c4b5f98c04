//! In-memory repository backend, used for tests and `STORAGE_BACKEND=memory`.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use service_core::error::AppError;
use uuid::Uuid;

use super::repository::{Filter, FilterValue, Repository};
use crate::models::Entity;

pub struct InMemoryRepository<T: Entity> {
    /// Document plus its insertion sequence, which gives a stable order.
    items: DashMap<Uuid, (u64, T)>,
    /// `Entity::unique_key` to the id holding it. A holder that has since
    /// been deleted or removed releases the key on the next insert.
    unique: DashMap<String, Uuid>,
    sequence: AtomicU64,
    _marker: PhantomData<T>,
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            unique: DashMap::new(),
            sequence: AtomicU64::new(0),
            _marker: PhantomData,
        }
    }

    fn matches(entity: &T, filter: &Filter) -> Result<bool, AppError> {
        if !entity.is_active() {
            return Ok(false);
        }
        if filter.clauses().is_empty() {
            return Ok(true);
        }

        let value = serde_json::to_value(entity)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Serialize entity: {}", e)))?;

        Ok(filter.clauses().iter().all(|(field, expected)| {
            let actual = value.get(field);
            match expected {
                FilterValue::Id(id) => actual.and_then(|v| v.as_str()) == Some(&id.to_string()),
                FilterValue::Text(text) => actual.and_then(|v| v.as_str()) == Some(text.as_str()),
                FilterValue::Bool(flag) => actual.and_then(|v| v.as_bool()) == Some(*flag),
            }
        }))
    }
}

impl<T: Entity> InMemoryRepository<T> {
    fn insert_document(&self, entity: &T) -> Result<(), AppError> {
        match self.items.entry(entity.id()) {
            Entry::Occupied(_) => Err(AppError::Conflict(anyhow::anyhow!(
                "{} {} already exists",
                T::COLLECTION,
                entity.id()
            ))),
            Entry::Vacant(slot) => {
                let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
                slot.insert((seq, entity.clone()));
                Ok(())
            }
        }
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<T>, AppError> {
        Ok(self
            .items
            .get(&id)
            .map(|entry| entry.value().1.clone())
            .filter(|entity| entity.is_active()))
    }

    async fn find(&self, filter: Filter) -> Result<Vec<T>, AppError> {
        let mut found = Vec::new();
        for entry in self.items.iter() {
            let (seq, entity) = entry.value();
            if Self::matches(entity, &filter)? {
                found.push((*seq, entity.clone()));
            }
        }
        found.sort_by_key(|(seq, _)| *seq);
        Ok(found.into_iter().map(|(_, entity)| entity).collect())
    }

    async fn count(&self, filter: Filter) -> Result<u64, AppError> {
        let mut count = 0;
        for entry in self.items.iter() {
            if Self::matches(&entry.value().1, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn insert(&self, entity: &T) -> Result<(), AppError> {
        let Some(key) = entity.unique_key() else {
            return self.insert_document(entity);
        };

        // The key entry stays locked until the document is in place
        match self.unique.entry(key) {
            Entry::Occupied(mut held) => {
                let holder = *held.get();
                let holder_active = self
                    .items
                    .get(&holder)
                    .is_some_and(|slot| slot.value().1.is_active());
                if holder_active {
                    return Err(AppError::Conflict(anyhow::anyhow!(
                        "{} with key {} already exists",
                        T::COLLECTION,
                        held.key()
                    )));
                }
                self.insert_document(entity)?;
                held.insert(entity.id());
                Ok(())
            }
            Entry::Vacant(slot) => {
                self.insert_document(entity)?;
                slot.insert(entity.id());
                Ok(())
            }
        }
    }

    async fn replace(&self, entity: &mut T) -> Result<(), AppError> {
        let mut slot = self
            .items
            .get_mut(&entity.id())
            .filter(|slot| slot.value().1.is_active())
            .ok_or_else(|| AppError::not_found(T::COLLECTION, entity.id()))?;

        let stored = &mut slot.value_mut().1;
        if stored.version() != entity.version() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "{} {} changed concurrently (expected version {}, found {})",
                T::COLLECTION,
                entity.id(),
                entity.version(),
                stored.version()
            )));
        }

        let mut next = entity.clone();
        next.bump_version(Utc::now());
        *stored = next.clone();
        *entity = next;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        match self.items.get_mut(&id) {
            Some(mut slot) if slot.value().1.is_active() => {
                slot.value_mut().1.mark_deleted(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.items.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Student, StudentPayment};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn replace_detects_stale_versions() {
        let repo = InMemoryRepository::<Student>::new();
        let student = Student::new("Ana".to_string(), None);
        repo.insert(&student).await.unwrap();

        let mut first = repo.get_by_id(student.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.name = "Ana María".to_string();
        repo.replace(&mut first).await.unwrap();
        assert_eq!(first.version, 1);

        second.name = "Anita".to_string();
        let result = repo.replace(&mut second).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let stored = repo.get_by_id(student.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Ana María");
    }

    #[tokio::test]
    async fn soft_deleted_documents_are_hidden() {
        let repo = InMemoryRepository::<Student>::new();
        let student = Student::new("Luis".to_string(), Some("rep-9".to_string()));
        repo.insert(&student).await.unwrap();

        assert!(repo.soft_delete(student.id).await.unwrap());
        assert!(!repo.soft_delete(student.id).await.unwrap());
        assert!(repo.get_by_id(student.id).await.unwrap().is_none());
        assert_eq!(repo.count(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filters_match_ids_text_and_flags() {
        let repo = InMemoryRepository::<Student>::new();
        let a = Student::new("A".to_string(), Some("rep-1".to_string()));
        let b = Student::new("B".to_string(), Some("rep-2".to_string()));
        repo.insert(&a).await.unwrap();
        repo.insert(&b).await.unwrap();

        let found = repo
            .find(Filter::new().text("representative_id", "rep-2"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b.id);

        let by_id = repo.find(Filter::new().id("id", a.id)).await.unwrap();
        assert_eq!(by_id.len(), 1);

        let all = repo.find(Filter::new().flag("active", true)).await.unwrap();
        assert_eq!(all.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), ["A", "B"]);
    }

    #[tokio::test]
    async fn one_active_payment_per_student_and_collection() {
        let repo = InMemoryRepository::<StudentPayment>::new();
        let (collection_id, student_id) = (Uuid::new_v4(), Uuid::new_v4());
        let first = StudentPayment::new(collection_id, student_id, dec!(50), None);
        let second = StudentPayment::new(collection_id, student_id, dec!(50), None);

        repo.insert(&first).await.unwrap();
        assert!(matches!(
            repo.insert(&second).await,
            Err(AppError::Conflict(_))
        ));

        let other_student = StudentPayment::new(collection_id, Uuid::new_v4(), dec!(50), None);
        repo.insert(&other_student).await.unwrap();

        // Deleting the holder frees the key
        assert!(repo.soft_delete(first.id).await.unwrap());
        repo.insert(&second).await.unwrap();
        assert_eq!(
            repo.count(Filter::new().id("collection_id", collection_id))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let repo = InMemoryRepository::<Student>::new();
        let student = Student::new("C".to_string(), None);
        repo.insert(&student).await.unwrap();
        assert!(matches!(
            repo.insert(&student).await,
            Err(AppError::Conflict(_))
        ));
    }
}
