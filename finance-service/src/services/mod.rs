//! Business services and the infrastructure they run on.

pub mod collections;
pub mod expenses;
pub mod images;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod notifications;
pub mod payment_requests;
pub mod repository;
pub mod settlement;
pub mod student_payments;
pub mod students;

#[cfg(test)]
pub(crate) mod testing;

pub use collections::CollectionService;
pub use expenses::ExpenseService;
pub use images::{ImageStore, LocalImageStore};
pub use ledger::{LedgerPosting, PettyCashLedger};
pub use metrics::{get_metrics, init_metrics};
pub use mongo::MongoDb;
pub use notifications::{FcmNotifier, LogNotifier, Notifications, Notifier};
pub use payment_requests::PaymentRequestService;
pub use repository::{Filter, Repositories, Repository};
pub use student_payments::StudentPaymentService;
pub use students::StudentService;
