//! Storage abstraction shared by the Mongo and in-memory backends.

use std::sync::Arc;

use async_trait::async_trait;
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    Collection, Entity, Expense, PaymentRequest, PettyCash, Student, StudentPayment, Transaction,
    TransactionLog,
};

/// Right-hand side of an equality clause.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Id(Uuid),
    /// Strings and enum variant names.
    Text(String),
    Bool(bool),
}

/// Conjunction of `field == value` clauses. Soft-deleted documents never
/// match, whatever the clauses say.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, FilterValue)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, field: &str, value: Uuid) -> Self {
        self.clauses.push((field.to_string(), FilterValue::Id(value)));
        self
    }

    pub fn text(mut self, field: &str, value: impl Into<String>) -> Self {
        self.clauses
            .push((field.to_string(), FilterValue::Text(value.into())));
        self
    }

    pub fn flag(mut self, field: &str, value: bool) -> Self {
        self.clauses.push((field.to_string(), FilterValue::Bool(value)));
        self
    }

    pub fn clauses(&self) -> &[(String, FilterValue)] {
        &self.clauses
    }
}

/// CRUD over one entity collection. Writes are atomic per document only.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Active document by id.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<T>, AppError>;

    /// Active documents matching `filter`, oldest first.
    async fn find(&self, filter: Filter) -> Result<Vec<T>, AppError>;

    async fn count(&self, filter: Filter) -> Result<u64, AppError>;

    /// Insert a new document. A duplicate id is a `Conflict`.
    async fn insert(&self, entity: &T) -> Result<(), AppError>;

    /// Replace the stored document if its version still equals
    /// `entity.version()`, then advance `entity`'s version. A stale version
    /// is a `Conflict`.
    async fn replace(&self, entity: &mut T) -> Result<(), AppError>;

    /// Mark the document deleted. Returns `false` when nothing active matched.
    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError>;

    /// Physically remove the document. Only compensating actions use this.
    async fn remove(&self, id: Uuid) -> Result<bool, AppError>;
}

pub type Repo<T> = Arc<dyn Repository<T>>;

/// Every repository the service needs.
#[derive(Clone)]
pub struct Repositories {
    pub students: Repo<Student>,
    pub collections: Repo<Collection>,
    pub student_payments: Repo<StudentPayment>,
    pub payment_requests: Repo<PaymentRequest>,
    pub petty_cash: Repo<PettyCash>,
    pub transactions: Repo<Transaction>,
    pub transaction_logs: Repo<TransactionLog>,
    pub expenses: Repo<Expense>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        use super::memory::InMemoryRepository;

        Self {
            students: Arc::new(InMemoryRepository::new()),
            collections: Arc::new(InMemoryRepository::new()),
            student_payments: Arc::new(InMemoryRepository::new()),
            payment_requests: Arc::new(InMemoryRepository::new()),
            petty_cash: Arc::new(InMemoryRepository::new()),
            transactions: Arc::new(InMemoryRepository::new()),
            transaction_logs: Arc::new(InMemoryRepository::new()),
            expenses: Arc::new(InMemoryRepository::new()),
        }
    }

    pub fn mongo(db: &super::mongo::MongoDb) -> Self {
        Self {
            students: Arc::new(db.repository()),
            collections: Arc::new(db.repository()),
            student_payments: Arc::new(db.repository()),
            payment_requests: Arc::new(db.repository()),
            petty_cash: Arc::new(db.repository()),
            transactions: Arc::new(db.repository()),
            transaction_logs: Arc::new(db.repository()),
            expenses: Arc::new(db.repository()),
        }
    }
}
