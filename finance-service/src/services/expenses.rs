use std::sync::Arc;

use chrono::Utc;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::images::ImageStore;
use super::ledger::{LedgerPosting, PettyCashLedger};
use super::repository::{Filter, Repositories};
use super::settlement::split_amount;
use super::student_payments::decode_all;
use crate::dtos::CreateExpenseRequest;
use crate::middleware::Actor;
use crate::models::{Expense, TransactionType};

/// Money spent out of petty cash.
#[derive(Clone)]
pub struct ExpenseService {
    repos: Repositories,
    ledger: PettyCashLedger,
    images: Arc<dyn ImageStore>,
}

impl ExpenseService {
    pub fn new(repos: Repositories, ledger: PettyCashLedger, images: Arc<dyn ImageStore>) -> Self {
        Self {
            repos,
            ledger,
            images,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Expense, AppError> {
        self.repos
            .expenses
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Expense", id))
    }

    pub async fn list(&self) -> Result<Vec<Expense>, AppError> {
        self.repos.expenses.find(Filter::new()).await
    }

    /// Record an expense and take its amount out of petty cash. Refused
    /// when the balance cannot cover it.
    #[instrument(skip(self, actor, request), fields(name = %request.name, amount = %request.amount))]
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateExpenseRequest,
    ) -> Result<Expense, AppError> {
        actor.require_admin()?;
        request.validate()?;
        let files = decode_all(&request.images)?;

        // Share per head of the live student set
        let student_quantity = self.repos.students.count(Filter::new()).await? as i64;
        let individual_amount =
            split_amount(request.amount, student_quantity).unwrap_or(request.amount);

        let id = Uuid::new_v4();
        let images = self.images.save_images(files, "expenses", id).await?;

        let posting = LedgerPosting::new(
            TransactionType::Expense,
            request.amount,
            format!("Gasto: {}", request.name),
        )
        .related("Expense", id);
        let transaction = match self.ledger.post(posting, actor).await {
            Ok(tx) => tx,
            Err(e) => {
                self.images.delete_images(&images).await;
                return Err(e);
            }
        };

        let now = Utc::now();
        let expense = Expense {
            id,
            name: request.name,
            description: request.description,
            amount: request.amount,
            date: request.date.unwrap_or(now),
            student_quantity,
            individual_amount,
            images,
            transaction_id: Some(transaction.id),
            created_by: actor.user_id.clone(),
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if let Err(e) = self.repos.expenses.insert(&expense).await {
            tracing::error!(error = %e, expense_id = %id, "Failed to store expense, reverting ledger posting");
            if let Err(revert_err) = self.ledger.revert(&transaction, actor).await {
                tracing::error!(
                    error = %revert_err,
                    transaction_id = %transaction.id,
                    "Integrity gap: expense posted without an expense record"
                );
            }
            self.images.delete_images(&expense.images).await;
            return Err(e);
        }

        tracing::info!(expense_id = %id, transaction_id = %transaction.id, "Expense created");
        Ok(expense)
    }

    /// Delete an expense and give its amount back to petty cash.
    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        actor.require_admin()?;
        let expense = self.get(id).await?;

        let posting = LedgerPosting::new(
            TransactionType::Income,
            expense.amount,
            format!("Anulación de gasto: {}", expense.name),
        )
        .related("Expense", id);
        let reversal = self.ledger.post(posting, actor).await?;

        let deleted = match self.repos.expenses.soft_delete(id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::not_found("Expense", id)),
            Err(e) => Err(e),
        };
        if let Err(e) = deleted {
            if let Err(revert_err) = self.ledger.revert(&reversal, actor).await {
                tracing::error!(
                    error = %revert_err,
                    transaction_id = %reversal.id,
                    "Integrity gap: expense reversal posted but expense kept"
                );
            }
            return Err(e);
        }

        tracing::info!(expense_id = %id, amount = %expense.amount, "Expense deleted");
        Ok(())
    }
}
