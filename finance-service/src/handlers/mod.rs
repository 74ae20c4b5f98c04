pub mod collections;
pub mod expenses;
pub mod health;
pub mod payment_requests;
pub mod petty_cash;
pub mod student_payments;
pub mod students;

pub use health::{health_check, metrics_endpoint, readiness_check};
