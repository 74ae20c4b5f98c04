//! Payment request workflow.
//!
//! Approval is a saga over three documents: the student payment is credited,
//! the money is posted to petty cash, and the request is written back as
//! `Approved` with a versioned replace. When a step fails the previous ones
//! are compensated in reverse order.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_on_conflict, RetryConfig};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::collections::CollectionService;
use super::images::ImageStore;
use super::ledger::{LedgerPosting, PettyCashLedger};
use super::metrics;
use super::notifications::Notifications;
use super::repository::{Filter, Repositories};
use super::student_payments::{decode_all, ensure_represents, StudentPaymentService};
use super::students::StudentService;
use crate::dtos::{
    AdminCommentBody, ApprovePaymentRequestBody, CreatePaymentRequestBody, PaymentDetails,
    PaymentRequestListQuery, RejectPaymentRequestBody, RequestChangesBody,
    UpdatePaymentRequestBody,
};
use crate::middleware::Actor;
use crate::models::{
    AdminComment, NotificationData, PaymentRequest, PaymentRequestStatus, PushTarget,
    RequestAction, TransactionType,
};

#[derive(Clone)]
pub struct PaymentRequestService {
    repos: Repositories,
    collections: CollectionService,
    students: StudentService,
    payments: StudentPaymentService,
    ledger: PettyCashLedger,
    images: Arc<dyn ImageStore>,
    notifications: Notifications,
    retry: RetryConfig,
}

impl PaymentRequestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Repositories,
        collections: CollectionService,
        students: StudentService,
        payments: StudentPaymentService,
        ledger: PettyCashLedger,
        images: Arc<dyn ImageStore>,
        notifications: Notifications,
    ) -> Self {
        Self {
            repos,
            collections,
            students,
            payments,
            ledger,
            images,
            notifications,
            retry: RetryConfig::default(),
        }
    }

    async fn load(&self, id: Uuid) -> Result<PaymentRequest, AppError> {
        self.repos
            .payment_requests
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("PaymentRequest", id))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<PaymentRequest, AppError> {
        let request = self.load(id).await?;
        ensure_owner_or_admin(actor, &request)?;
        Ok(request)
    }

    /// Requests matching the query. Representatives only see their own.
    pub async fn list(
        &self,
        actor: &Actor,
        query: PaymentRequestListQuery,
    ) -> Result<Vec<PaymentRequest>, AppError> {
        let mut filter = Filter::new();
        if let Some(status) = query.status.as_deref() {
            let status: PaymentRequestStatus = status.parse()?;
            filter = filter.text("status", status.as_str());
        }
        if let Some(collection_id) = query.collection_id {
            filter = filter.id("collection_id", collection_id);
        }
        if let Some(student_id) = query.student_id {
            filter = filter.id("student_id", student_id);
        }
        if !actor.is_admin() {
            filter = filter.text("representative_id", actor.user_id.as_str());
        }
        self.repos.payment_requests.find(filter).await
    }

    /// Submit a claim of payment. The amount owed is frozen from the
    /// collection at this moment.
    #[instrument(skip(self, actor, body), fields(
        collection_id = %body.collection_id,
        student_id = %body.student_id,
        amount = %body.amount_paid
    ))]
    pub async fn create(
        &self,
        actor: &Actor,
        body: CreatePaymentRequestBody,
    ) -> Result<PaymentRequest, AppError> {
        body.validate()?;
        let collection = self.collections.get(body.collection_id).await?;
        let student = self.students.get(body.student_id).await?;
        ensure_represents(actor, &student)?;
        let files = decode_all(&body.images)?;

        let id = Uuid::new_v4();
        let images = self.images.save_images(files, "payment-requests", id).await?;

        let request = PaymentRequest::new(
            id,
            collection.id,
            student.id,
            actor.user_id.clone(),
            body.amount_paid,
            collection.effective_individual_amount(),
            images,
            body.voucher,
            body.comment,
            body.payment_date,
        );

        if let Err(e) = self.repos.payment_requests.insert(&request).await {
            self.images.delete_images(&request.images).await;
            return Err(e);
        }
        metrics::record_request_action(RequestAction::Created.as_str());
        tracing::info!(payment_request_id = %id, "Payment request created");

        self.notifications
            .dispatch(
                PushTarget::administrators(),
                NotificationData::PaymentRequestSubmitted {
                    payment_request_id: id,
                    collection_id: collection.id,
                    student_id: student.id,
                    amount: request.amount_paid,
                },
            )
            .await;

        Ok(request)
    }

    /// Owner edit. Editing a request that needs changes resubmits it.
    #[instrument(skip(self, actor, body))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        body: UpdatePaymentRequestBody,
    ) -> Result<PaymentRequest, AppError> {
        body.validate()?;
        if body.amount_paid.is_some_and(|amount| amount <= Decimal::ZERO) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Amount must be greater than zero"
            )));
        }

        let current = self.load(id).await?;
        ensure_owner(actor, &current)?;
        current.ensure_can(current.edit_action())?;

        let files = decode_all(&body.images)?;
        let added = self.images.save_images(files, "payment-requests", id).await?;

        let body = &body;
        let new_images = &added;
        let result = retry_on_conflict(&self.retry, "payment_request.update", move || async move {
            let mut request = self.load(id).await?;
            ensure_owner(actor, &request)?;
            let action = request.edit_action();
            let details = match action {
                RequestAction::Resubmitted => "Solicitud reenviada",
                _ => "Solicitud actualizada",
            };
            request.transition(action, &actor.user_id, actor.role, details)?;

            if let Some(amount) = body.amount_paid {
                request.amount_paid = amount;
            }
            if body.voucher.is_some() {
                request.voucher = body.voucher.clone();
            }
            if body.comment.is_some() {
                request.comment = body.comment.clone();
            }
            if body.payment_date.is_some() {
                request.payment_date = body.payment_date;
            }
            request.images.extend(new_images.iter().cloned());

            self.repos.payment_requests.replace(&mut request).await?;
            Ok((request, action))
        })
        .await;

        match result {
            Ok((request, action)) => {
                metrics::record_request_action(action.as_str());
                tracing::info!(payment_request_id = %id, action = action.as_str(), status = %request.status, "Payment request edited");
                Ok(request)
            }
            Err(e) => {
                self.images.delete_images(&added).await;
                Err(e)
            }
        }
    }

    /// Apply an administrator action that only touches the request itself.
    async fn review<F>(
        &self,
        actor: &Actor,
        id: Uuid,
        action: RequestAction,
        details: &str,
        apply: F,
    ) -> Result<PaymentRequest, AppError>
    where
        F: Fn(&mut PaymentRequest) + Send + Sync,
    {
        actor.require_admin()?;
        let apply = &apply;
        let request = retry_on_conflict(&self.retry, "payment_request.review", move || async move {
            let mut request = self.load(id).await?;
            request.transition(action, &actor.user_id, actor.role, details)?;
            apply(&mut request);
            self.repos.payment_requests.replace(&mut request).await?;
            Ok(request)
        })
        .await?;

        metrics::record_request_action(action.as_str());
        tracing::info!(
            payment_request_id = %id,
            action = action.as_str(),
            status = %request.status,
            "Payment request reviewed"
        );
        Ok(request)
    }

    #[instrument(skip(self, actor))]
    pub async fn start_review(&self, actor: &Actor, id: Uuid) -> Result<PaymentRequest, AppError> {
        self.review(actor, id, RequestAction::ReviewStarted, "Revisión iniciada", |_| {})
            .await
    }

    #[instrument(skip(self, actor, body))]
    pub async fn reject(
        &self,
        actor: &Actor,
        id: Uuid,
        body: RejectPaymentRequestBody,
    ) -> Result<PaymentRequest, AppError> {
        body.validate()?;
        let reason = body.reason;
        let request = self
            .review(actor, id, RequestAction::Rejected, &reason, |r| {
                r.rejection_reason = Some(reason.clone());
            })
            .await?;

        self.notifications
            .dispatch(
                PushTarget::User(request.representative_id.clone()),
                NotificationData::PaymentRejected {
                    payment_request_id: id,
                    reason,
                },
            )
            .await;
        Ok(request)
    }

    #[instrument(skip(self, actor, body))]
    pub async fn request_changes(
        &self,
        actor: &Actor,
        id: Uuid,
        body: RequestChangesBody,
    ) -> Result<PaymentRequest, AppError> {
        body.validate()?;
        let comment = body.comment;
        let request = self
            .review(actor, id, RequestAction::ChangesRequested, &comment, |r| {
                r.admin_comments.push(admin_comment(actor, &comment));
            })
            .await?;

        self.notifications
            .dispatch(
                PushTarget::User(request.representative_id.clone()),
                NotificationData::ChangesRequested {
                    payment_request_id: id,
                    comment,
                },
            )
            .await;
        Ok(request)
    }

    /// Audit-only comment, allowed in every state.
    #[instrument(skip(self, actor, body))]
    pub async fn add_comment(
        &self,
        actor: &Actor,
        id: Uuid,
        body: AdminCommentBody,
    ) -> Result<PaymentRequest, AppError> {
        body.validate()?;
        let comment = body.comment;
        self.review(actor, id, RequestAction::Commented, &comment, |r| {
            r.admin_comments.push(admin_comment(actor, &comment));
        })
        .await
    }

    /// Approve: credit the student payment, post the income and mark the
    /// request approved. Either all three happen or none does.
    #[instrument(skip(self, actor, body), fields(payment_request_id = %id))]
    pub async fn approve(
        &self,
        actor: &Actor,
        id: Uuid,
        body: ApprovePaymentRequestBody,
    ) -> Result<PaymentRequest, AppError> {
        actor.require_admin()?;
        body.validate()?;

        let request = self.load(id).await?;
        request.ensure_can(RequestAction::Approved)?;
        let collection = self.collections.get(request.collection_id).await?;
        let student = self.students.get(request.student_id).await?;

        let materialized = self
            .payments
            .materialize(
                &collection,
                student.id,
                request.amount_paid,
                PaymentDetails {
                    voucher: request.voucher.clone(),
                    comment: request.comment.clone(),
                    payment_date: request.payment_date,
                    images: request.images.clone(),
                },
            )
            .await?;
        let payment_id = materialized.payment.id;

        let posting = LedgerPosting::new(
            TransactionType::Income,
            request.amount_paid,
            format!("Pago aprobado de {} - {}", student.name, collection.name),
        )
        .related("PaymentRequest", id)
        .student(student.id)
        .collection(collection.id)
        .student_payment(payment_id);

        let transaction = match self.ledger.post(posting, actor).await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!(error = %e, "Ledger posting failed, compensating approval");
                self.payments.rollback(&materialized).await;
                return Err(e);
            }
        };

        let mut approved = request;
        let details = body
            .comment
            .clone()
            .unwrap_or_else(|| "Solicitud aprobada".to_string());
        let written = match approved.transition(
            RequestAction::Approved,
            &actor.user_id,
            actor.role,
            details,
        ) {
            Ok(_) => {
                approved.approved_by_admin_id = Some(actor.user_id.clone());
                approved.approved_at = Some(Utc::now());
                approved.student_payment_id = Some(payment_id);
                if let Some(comment) = &body.comment {
                    approved.admin_comments.push(admin_comment(actor, comment));
                }
                // No retry: a stale version means someone else acted first.
                self.repos.payment_requests.replace(&mut approved).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            tracing::error!(error = %e, "Approval write failed, compensating");
            if let Err(revert_err) = self.ledger.revert(&transaction, actor).await {
                metrics::record_compensation("ledger_posting", "failed");
                tracing::error!(
                    error = %revert_err,
                    transaction_id = %transaction.id,
                    payment_request_id = %id,
                    "Integrity gap: income posted for a request that was not approved"
                );
            } else {
                metrics::record_compensation("ledger_posting", "ok");
            }
            self.payments.rollback(&materialized).await;
            return Err(e);
        }

        metrics::record_request_action(RequestAction::Approved.as_str());
        self.collections.recompute_after_payment(collection.id).await;

        tracing::info!(
            student_payment_id = %payment_id,
            transaction_id = %transaction.id,
            amount = %approved.amount_paid,
            "Payment request approved"
        );

        self.notifications
            .dispatch(
                PushTarget::User(approved.representative_id.clone()),
                NotificationData::PaymentApproved {
                    payment_request_id: id,
                    student_payment_id: payment_id,
                    amount: approved.amount_paid,
                },
            )
            .await;

        Ok(approved)
    }

    /// Delete a pending or rejected request. Approved requests are history.
    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        retry_on_conflict(&self.retry, "payment_request.delete", move || async move {
            let mut request = self.load(id).await?;
            ensure_owner_or_admin(actor, &request)?;
            request.ensure_deletable()?;

            // Versioned so a concurrent approval cannot be deleted away.
            request.active = false;
            request.deleted_at = Some(Utc::now());
            self.repos.payment_requests.replace(&mut request).await
        })
        .await?;

        tracing::info!(payment_request_id = %id, "Payment request deleted");
        Ok(())
    }
}

fn admin_comment(actor: &Actor, comment: &str) -> AdminComment {
    AdminComment {
        id: Uuid::new_v4(),
        admin_id: actor.user_id.clone(),
        admin_name: actor.user_name.clone(),
        comment: comment.to_string(),
        created_at: Utc::now(),
    }
}

fn ensure_owner(actor: &Actor, request: &PaymentRequest) -> Result<(), AppError> {
    if request.representative_id == actor.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the submitter may edit payment request {}",
            request.id
        )))
    }
}

fn ensure_owner_or_admin(actor: &Actor, request: &PaymentRequest) -> Result<(), AppError> {
    if actor.is_admin() {
        Ok(())
    } else {
        ensure_owner(actor, request)
    }
}
