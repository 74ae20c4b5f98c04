use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use uuid::Uuid;

use super::repository::{Filter, FilterValue, Repository};
use crate::models::{
    Collection as CollectionModel, Entity, Expense, PaymentRequest, PettyCash, Student,
    StudentPayment, Transaction, TransactionLog,
};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!("Failed to connect to MongoDB: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for finance-service");

        self.create_indexes::<Student>(&[doc! { "representative_id": 1 }])
            .await?;
        self.create_indexes::<CollectionModel>(&[]).await?;
        self.create_indexes::<StudentPayment>(&[doc! { "student_id": 1 }])
            .await?;
        // One active payment per student and collection
        self.create_active_unique_index::<StudentPayment>(
            doc! { "collection_id": 1, "student_id": 1 },
        )
        .await?;
        self.create_indexes::<PaymentRequest>(&[
            doc! { "representative_id": 1 },
            doc! { "collection_id": 1, "student_id": 1 },
            doc! { "status": 1 },
        ])
        .await?;
        self.create_indexes::<PettyCash>(&[]).await?;
        self.create_indexes::<Transaction>(&[doc! { "transaction_type": 1 }])
            .await?;
        self.create_indexes::<TransactionLog>(&[doc! { "transaction_id": 1 }])
            .await?;
        self.create_indexes::<Expense>(&[]).await?;

        Ok(())
    }

    /// Unique index on `id` plus the given lookup indexes.
    async fn create_indexes<T: Entity>(&self, lookups: &[Document]) -> Result<(), AppError> {
        let mut indexes = vec![IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(
                IndexOptions::builder()
                    .name(format!("{}_id_unique", T::COLLECTION))
                    .unique(true)
                    .build(),
            )
            .build()];

        for keys in lookups {
            let name = keys.keys().cloned().collect::<Vec<_>>().join("_");
            indexes.push(
                IndexModel::builder()
                    .keys(keys.clone())
                    .options(
                        IndexOptions::builder()
                            .name(format!("{}_{}_lookup", T::COLLECTION, name))
                            .build(),
                    )
                    .build(),
            );
        }

        self.db
            .collection::<T>(T::COLLECTION)
            .create_indexes(indexes, None)
            .await
            .map_err(|e| {
                tracing::error!(
                    collection = T::COLLECTION,
                    "Failed to create indexes: {}",
                    e
                );
                AppError::from(e)
            })?;
        tracing::info!(collection = T::COLLECTION, "Created indexes");
        Ok(())
    }

    /// Unique among active documents only, so soft-deleted ones never
    /// block a new insert.
    async fn create_active_unique_index<T: Entity>(&self, keys: Document) -> Result<(), AppError> {
        let name = keys.keys().cloned().collect::<Vec<_>>().join("_");
        let index = IndexModel::builder()
            .keys(keys)
            .options(
                IndexOptions::builder()
                    .name(format!("{}_{}_unique", T::COLLECTION, name))
                    .unique(true)
                    .partial_filter_expression(doc! { "active": true })
                    .build(),
            )
            .build();

        self.db
            .collection::<T>(T::COLLECTION)
            .create_index(index, None)
            .await
            .map_err(|e| {
                tracing::error!(
                    collection = T::COLLECTION,
                    "Failed to create unique index: {}",
                    e
                );
                AppError::from(e)
            })?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn repository<T: Entity>(&self) -> MongoRepository<T> {
        MongoRepository::new(&self.db)
    }
}

pub struct MongoRepository<T: Entity> {
    collection: Collection<T>,
    _marker: PhantomData<T>,
}

impl<T: Entity> MongoRepository<T> {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(T::COLLECTION),
            _marker: PhantomData,
        }
    }

    fn id_bson(id: Uuid) -> Result<Bson, AppError> {
        Ok(to_bson(&id)?)
    }

    fn to_document(filter: &Filter) -> Result<Document, AppError> {
        let mut document = doc! { "active": true };
        for (field, value) in filter.clauses() {
            let value = match value {
                FilterValue::Id(id) => Self::id_bson(*id)?,
                FilterValue::Text(text) => Bson::String(text.clone()),
                FilterValue::Bool(flag) => Bson::Boolean(*flag),
            };
            document.insert(field.clone(), value);
        }
        Ok(document)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl<T: Entity> Repository<T> for MongoRepository<T> {
    #[tracing::instrument(skip(self), fields(collection = T::COLLECTION))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<T>, AppError> {
        let filter = doc! { "id": Self::id_bson(id)?, "active": true };
        Ok(self.collection.find_one(filter, None).await?)
    }

    #[tracing::instrument(skip(self), fields(collection = T::COLLECTION))]
    async fn find(&self, filter: Filter) -> Result<Vec<T>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let cursor = self
            .collection
            .find(Self::to_document(&filter)?, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, filter: Filter) -> Result<u64, AppError> {
        Ok(self
            .collection
            .count_documents(Self::to_document(&filter)?, None)
            .await?)
    }

    #[tracing::instrument(skip(self, entity), fields(collection = T::COLLECTION, id = %entity.id()))]
    async fn insert(&self, entity: &T) -> Result<(), AppError> {
        match self.collection.insert_one(entity, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(AppError::Conflict(anyhow::anyhow!(
                "{} {} already exists",
                T::COLLECTION,
                entity.id()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self, entity), fields(collection = T::COLLECTION, id = %entity.id(), version = entity.version()))]
    async fn replace(&self, entity: &mut T) -> Result<(), AppError> {
        let id = Self::id_bson(entity.id())?;
        let mut next = entity.clone();
        next.bump_version(Utc::now());

        let filter = doc! { "id": id.clone(), "version": entity.version(), "active": true };
        let result = self.collection.replace_one(filter, &next, None).await?;

        if result.matched_count == 0 {
            let exists = self
                .collection
                .count_documents(doc! { "id": id, "active": true }, None)
                .await?
                > 0;
            return Err(if exists {
                AppError::Conflict(anyhow::anyhow!(
                    "{} {} changed concurrently (expected version {})",
                    T::COLLECTION,
                    entity.id(),
                    entity.version()
                ))
            } else {
                AppError::not_found(T::COLLECTION, entity.id())
            });
        }

        *entity = next;
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let now = to_bson(&Utc::now())?;
        let result = self
            .collection
            .update_one(
                doc! { "id": Self::id_bson(id)?, "active": true },
                doc! {
                    "$set": { "active": false, "deleted_at": now.clone(), "updated_at": now },
                    "$inc": { "version": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    async fn remove(&self, id: Uuid) -> Result<bool, AppError> {
        let result = self
            .collection
            .delete_one(doc! { "id": Self::id_bson(id)? }, None)
            .await?;
        Ok(result.deleted_count > 0)
    }
}
