//! Petty cash ledger.
//!
//! [`PettyCashLedger::post`] is the only path that changes the balance. The
//! singleton is updated with a versioned replace retried on conflict, so
//! concurrent postings never lose an update.

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_on_conflict, RetryConfig};
use tracing::instrument;
use uuid::Uuid;

use super::metrics;
use super::repository::{Filter, Repositories};
use crate::middleware::Actor;
use crate::models::{
    LedgerEvent, PettyCash, Transaction, TransactionLog, TransactionType, PETTY_CASH_ID,
};

/// A movement to be posted.
#[derive(Debug, Clone)]
pub struct LedgerPosting {
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub related_entity_id: Option<Uuid>,
    pub related_entity_type: Option<String>,
    pub student_id: Option<Uuid>,
    pub collection_id: Option<Uuid>,
    pub student_payment_id: Option<Uuid>,
}

impl LedgerPosting {
    pub fn new(
        transaction_type: TransactionType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            transaction_type,
            amount,
            description: description.into(),
            related_entity_id: None,
            related_entity_type: None,
            student_id: None,
            collection_id: None,
            student_payment_id: None,
        }
    }

    pub fn related(mut self, entity_type: &str, id: Uuid) -> Self {
        self.related_entity_type = Some(entity_type.to_string());
        self.related_entity_id = Some(id);
        self
    }

    pub fn student(mut self, id: Uuid) -> Self {
        self.student_id = Some(id);
        self
    }

    pub fn collection(mut self, id: Uuid) -> Self {
        self.collection_id = Some(id);
        self
    }

    pub fn student_payment(mut self, id: Uuid) -> Self {
        self.student_payment_id = Some(id);
        self
    }
}

#[derive(Clone)]
pub struct PettyCashLedger {
    repos: Repositories,
    retry: RetryConfig,
}

impl PettyCashLedger {
    pub fn new(repos: Repositories) -> Self {
        Self {
            repos,
            retry: RetryConfig::default(),
        }
    }

    /// Current balance, creating the singleton on first use.
    pub async fn balance(&self) -> Result<PettyCash, AppError> {
        if let Some(cash) = self.repos.petty_cash.get_by_id(PETTY_CASH_ID).await? {
            return Ok(cash);
        }

        match self.repos.petty_cash.insert(&PettyCash::new()).await {
            Ok(()) => tracing::info!("Initialized petty cash"),
            // Someone else initialized it first
            Err(AppError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }

        self.repos
            .petty_cash
            .get_by_id(PETTY_CASH_ID)
            .await?
            .ok_or_else(|| AppError::not_found("petty cash", PETTY_CASH_ID))
    }

    /// Post a movement: update the balance, record the transaction and its
    /// log entry.
    ///
    /// Expenses that exceed the balance are refused. If the transaction
    /// cannot be stored the balance change is undone.
    #[instrument(skip(self, posting, actor), fields(
        transaction_type = %posting.transaction_type,
        amount = %posting.amount,
        user_id = %actor.user_id
    ))]
    pub async fn post(&self, posting: LedgerPosting, actor: &Actor) -> Result<Transaction, AppError> {
        self.post_inner(posting, actor, false).await
    }

    /// Like [`post`](Self::post) but never refuses for lack of funds. Used
    /// for corrections of money already recorded.
    pub async fn post_correction(
        &self,
        posting: LedgerPosting,
        actor: &Actor,
    ) -> Result<Transaction, AppError> {
        self.post_inner(posting, actor, true).await
    }

    async fn post_inner(
        &self,
        posting: LedgerPosting,
        actor: &Actor,
        allow_overdraft: bool,
    ) -> Result<Transaction, AppError> {
        let tx_type = posting.transaction_type;
        let amount = posting.amount;

        let (before, after) = retry_on_conflict(&self.retry, "ledger.post", move || async move {
            let mut cash = self.balance().await?;
            let moved = cash.apply(tx_type, amount, allow_overdraft)?;
            self.repos.petty_cash.replace(&mut cash).await?;
            Ok(moved)
        })
        .await?;

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            transaction_type: tx_type,
            amount,
            description: posting.description,
            related_entity_id: posting.related_entity_id,
            related_entity_type: posting.related_entity_type,
            student_id: posting.student_id,
            collection_id: posting.collection_id,
            student_payment_id: posting.student_payment_id,
            previous_balance: before,
            new_balance: after,
            user_id: actor.user_id.clone(),
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if let Err(e) = self.repos.transactions.insert(&transaction).await {
            tracing::error!(error = %e, "Failed to store ledger transaction, reverting balance");
            if let Err(revert_err) = self.unapply_balance(tx_type, amount).await {
                metrics::record_compensation("ledger_balance", "failed");
                tracing::error!(
                    error = %revert_err,
                    transaction_type = %tx_type,
                    amount = %amount,
                    "Integrity gap: balance changed without a transaction record"
                );
            } else {
                metrics::record_compensation("ledger_balance", "ok");
            }
            return Err(e);
        }

        self.write_log(&transaction, LedgerEvent::Posted, before, after, actor)
            .await;
        metrics::record_ledger_event(tx_type.as_str(), "posted");

        tracing::info!(
            transaction_id = %transaction.id,
            previous_balance = %before,
            new_balance = %after,
            "Ledger transaction posted"
        );

        Ok(transaction)
    }

    /// Undo a posted transaction: restore the balance and remove the entry.
    /// The transaction log keeps both events.
    #[instrument(skip(self, transaction, actor), fields(transaction_id = %transaction.id))]
    pub async fn revert(&self, transaction: &Transaction, actor: &Actor) -> Result<(), AppError> {
        let (before, after) = self
            .unapply_balance(transaction.transaction_type, transaction.amount)
            .await?;
        self.repos.transactions.remove(transaction.id).await?;

        self.write_log(transaction, LedgerEvent::Reverted, before, after, actor)
            .await;
        metrics::record_ledger_event(transaction.transaction_type.as_str(), "reverted");

        tracing::warn!(
            transaction_type = %transaction.transaction_type,
            amount = %transaction.amount,
            "Ledger transaction reverted"
        );
        Ok(())
    }

    async fn unapply_balance(
        &self,
        tx_type: TransactionType,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal), AppError> {
        retry_on_conflict(&self.retry, "ledger.unapply", move || async move {
            let mut cash = self.balance().await?;
            let moved = cash.unapply(tx_type, amount);
            self.repos.petty_cash.replace(&mut cash).await?;
            Ok(moved)
        })
        .await
    }

    async fn write_log(
        &self,
        transaction: &Transaction,
        event: LedgerEvent,
        before: Decimal,
        after: Decimal,
        actor: &Actor,
    ) {
        let now = Utc::now();
        let log = TransactionLog {
            id: Uuid::new_v4(),
            transaction_id: transaction.id,
            event,
            transaction_type: transaction.transaction_type,
            amount: transaction.amount,
            description: transaction.description.clone(),
            balance_before: before,
            balance_after: after,
            user_id: actor.user_id.clone(),
            user_name: actor.user_name.clone(),
            ip_address: actor.ip_address.clone(),
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        // The transaction itself is the record of truth; a missing log entry
        // is reported but does not fail the posting.
        if let Err(e) = self.repos.transaction_logs.insert(&log).await {
            tracing::error!(
                error = %e,
                transaction_id = %transaction.id,
                "Failed to write transaction log"
            );
        }
    }

    /// Administrator-entered income or expense.
    pub async fn manual_entry(
        &self,
        actor: &Actor,
        transaction_type: TransactionType,
        amount: Decimal,
        description: String,
    ) -> Result<Transaction, AppError> {
        actor.require_admin()?;
        if !matches!(
            transaction_type,
            TransactionType::Income | TransactionType::Expense
        ) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Manual entries must be Income or Expense, got {}",
                transaction_type
            )));
        }

        self.post(
            LedgerPosting::new(transaction_type, amount, description),
            actor,
        )
        .await
    }

    pub async fn transactions(
        &self,
        transaction_type: Option<TransactionType>,
    ) -> Result<Vec<Transaction>, AppError> {
        let mut filter = Filter::new();
        if let Some(t) = transaction_type {
            filter = filter.text("transaction_type", t.as_str());
        }
        self.repos.transactions.find(filter).await
    }

    pub async fn logs(&self) -> Result<Vec<TransactionLog>, AppError> {
        self.repos.transaction_logs.find(Filter::new()).await
    }
}
