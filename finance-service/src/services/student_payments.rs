//! Money recorded against a student's obligation.
//!
//! [`StudentPaymentService::materialize`] is the one place that adds money
//! to a payment; both admin-recorded payments and approved payment requests
//! go through it, and [`StudentPaymentService::rollback`] undoes it.

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_on_conflict, RetryConfig};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::collections::CollectionService;
use super::images::{ImageFile, ImageStore};
use super::ledger::{LedgerPosting, PettyCashLedger};
use super::metrics;
use super::repository::{Filter, Repositories};
use super::students::StudentService;
use crate::dtos::{
    ExonerateRequest, PaymentDetails, PaymentListQuery, RecordPaymentRequest, UpdatePaymentRequest,
};
use crate::middleware::Actor;
use crate::models::{Collection, Student, StudentPayment, TransactionType};

/// What [`StudentPaymentService::materialize`] changed, enough to undo it.
#[derive(Debug, Clone)]
pub struct Materialized {
    pub payment: StudentPayment,
    pub created: bool,
    /// Amount added to `amount_paid`. Negative for corrections downwards.
    pub amount: Decimal,
    pub added_images: Vec<String>,
    previous: PaymentDetails,
}

#[derive(Clone)]
pub struct StudentPaymentService {
    repos: Repositories,
    ledger: PettyCashLedger,
    collections: CollectionService,
    students: StudentService,
    images: Arc<dyn ImageStore>,
    retry: RetryConfig,
}

impl StudentPaymentService {
    pub fn new(
        repos: Repositories,
        ledger: PettyCashLedger,
        collections: CollectionService,
        students: StudentService,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            repos,
            ledger,
            collections,
            students,
            images,
            retry: RetryConfig::default(),
        }
    }

    async fn load(&self, id: Uuid) -> Result<StudentPayment, AppError> {
        self.repos
            .student_payments
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("StudentPayment", id))
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<StudentPayment, AppError> {
        let payment = self.load(id).await?;
        if !actor.is_admin() {
            let student = self.students.get(payment.student_id).await?;
            ensure_represents(actor, &student)?;
        }
        Ok(payment)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        query: PaymentListQuery,
    ) -> Result<Vec<StudentPayment>, AppError> {
        let mut filter = Filter::new();
        if let Some(collection_id) = query.collection_id {
            filter = filter.id("collection_id", collection_id);
        }
        if let Some(student_id) = query.student_id {
            filter = filter.id("student_id", student_id);
        }
        let mut payments = self.repos.student_payments.find(filter).await?;

        if !actor.is_admin() {
            let own: HashSet<Uuid> = self
                .students
                .represented_by(&actor.user_id)
                .await?
                .into_iter()
                .collect();
            payments.retain(|p| own.contains(&p.student_id));
        }
        Ok(payments)
    }

    /// Add `amount` to the student's payment for `collection`, creating the
    /// payment when the student has none yet.
    pub(crate) async fn materialize(
        &self,
        collection: &Collection,
        student_id: Uuid,
        amount: Decimal,
        details: PaymentDetails,
    ) -> Result<Materialized, AppError> {
        let existing = match self.find_payment(collection.id, student_id).await? {
            Some(existing) => existing,
            None => {
                let mut payment = StudentPayment::new(
                    collection.id,
                    student_id,
                    collection.individual_amount,
                    collection.adjusted_individual_amount,
                );
                payment.surplus = collection.total_surplus;
                payment.amount_paid = amount;
                payment.images = details.images.clone();
                payment.voucher = details.voucher.clone();
                payment.comment = details.comment.clone();
                payment.payment_date = details.payment_date;
                payment.rederive();

                match self.repos.student_payments.insert(&payment).await {
                    Ok(()) => {
                        return Ok(Materialized {
                            payment,
                            created: true,
                            amount,
                            added_images: details.images,
                            previous: PaymentDetails::default(),
                        });
                    }
                    // Another writer created it first; add to theirs
                    Err(e) if e.is_conflict() => {
                        tracing::info!(
                            collection_id = %collection.id,
                            student_id = %student_id,
                            "Student payment created concurrently, accumulating"
                        );
                        self.find_payment(collection.id, student_id)
                            .await?
                            .ok_or(e)?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let details = &details;
        let payment_id = existing.id;
        retry_on_conflict(&self.retry, "student_payment.materialize", move || async move {
            let mut payment = self.load(payment_id).await?;
            let previous = PaymentDetails {
                voucher: payment.voucher.clone(),
                comment: payment.comment.clone(),
                payment_date: payment.payment_date,
                images: Vec::new(),
            };

            payment.amount_paid += amount;
            payment.images.extend(details.images.iter().cloned());
            if details.voucher.is_some() {
                payment.voucher = details.voucher.clone();
            }
            if details.comment.is_some() {
                payment.comment = details.comment.clone();
            }
            if details.payment_date.is_some() {
                payment.payment_date = details.payment_date;
            }
            payment.rederive();
            self.repos.student_payments.replace(&mut payment).await?;

            Ok(Materialized {
                payment,
                created: false,
                amount,
                added_images: details.images.clone(),
                previous,
            })
        })
        .await
    }

    async fn find_payment(
        &self,
        collection_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<StudentPayment>, AppError> {
        Ok(self
            .repos
            .student_payments
            .find(
                Filter::new()
                    .id("collection_id", collection_id)
                    .id("student_id", student_id),
            )
            .await?
            .into_iter()
            .next())
    }

    /// Undo a [`materialize`](Self::materialize). Failures are logged as
    /// integrity gaps; there is nothing further to fall back to.
    pub(crate) async fn rollback(&self, materialized: &Materialized) {
        let payment_id = materialized.payment.id;
        let result = if materialized.created {
            self.repos.student_payments.remove(payment_id).await.map(|_| ())
        } else {
            retry_on_conflict(&self.retry, "student_payment.rollback", move || async move {
                let mut payment = self.load(payment_id).await?;
                payment.amount_paid -= materialized.amount;
                let added: HashSet<&String> = materialized.added_images.iter().collect();
                payment.images.retain(|img| !added.contains(img));
                payment.voucher = materialized.previous.voucher.clone();
                payment.comment = materialized.previous.comment.clone();
                payment.payment_date = materialized.previous.payment_date;
                payment.rederive();
                self.repos.student_payments.replace(&mut payment).await
            })
            .await
        };

        match result {
            Ok(()) => {
                metrics::record_compensation("student_payment", "ok");
                tracing::warn!(
                    payment_id = %payment_id,
                    amount = %materialized.amount,
                    created = materialized.created,
                    "Student payment rolled back"
                );
            }
            Err(e) => {
                metrics::record_compensation("student_payment", "failed");
                tracing::error!(
                    error = %e,
                    payment_id = %payment_id,
                    amount = %materialized.amount,
                    "Integrity gap: student payment could not be rolled back"
                );
            }
        }
    }

    /// Money handed to an administrator: credit the payment and post a
    /// `Collection` transaction.
    #[instrument(skip(self, actor, request), fields(
        collection_id = %request.collection_id,
        student_id = %request.student_id,
        amount = %request.amount_paid
    ))]
    pub async fn record_payment(
        &self,
        actor: &Actor,
        request: RecordPaymentRequest,
    ) -> Result<StudentPayment, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let collection = self.collections.get(request.collection_id).await?;
        let student = self.students.get(request.student_id).await?;
        let files = decode_all(&request.images)?;

        let images = self
            .images
            .save_images(files, "student-payments", collection.id)
            .await?;
        let details = PaymentDetails {
            voucher: request.voucher,
            comment: request.comment,
            payment_date: request.payment_date,
            images: images.clone(),
        };

        let materialized = match self
            .materialize(&collection, student.id, request.amount_paid, details)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                self.images.delete_images(&images).await;
                return Err(e);
            }
        };

        let posting = LedgerPosting::new(
            TransactionType::Collection,
            request.amount_paid,
            format!("Pago de {} - {}", student.name, collection.name),
        )
        .related("StudentPayment", materialized.payment.id)
        .student(student.id)
        .collection(collection.id)
        .student_payment(materialized.payment.id);

        if let Err(e) = self.ledger.post(posting, actor).await {
            tracing::error!(error = %e, "Ledger posting failed, rolling back payment");
            self.rollback(&materialized).await;
            self.images.delete_images(&images).await;
            return Err(e);
        }

        self.collections.recompute_after_payment(collection.id).await;
        tracing::info!(payment_id = %materialized.payment.id, "Payment recorded");
        Ok(materialized.payment)
    }

    /// Set a new absolute `amount_paid`. The difference is posted as a
    /// `Collection` (more money) or `Expense` (money returned).
    #[instrument(skip(self, actor, request), fields(amount = %request.amount_paid))]
    pub async fn update_payment(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdatePaymentRequest,
    ) -> Result<StudentPayment, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let current = self.load(id).await?;
        let files = decode_all(&request.images)?;
        let images = self
            .images
            .save_images(files, "student-payments", current.collection_id)
            .await?;

        let request = &request;
        let added = &images;
        let result = retry_on_conflict(&self.retry, "student_payment.update", move || async move {
            let mut payment = self.load(id).await?;
            let previous = PaymentDetails {
                voucher: payment.voucher.clone(),
                comment: payment.comment.clone(),
                payment_date: payment.payment_date,
                images: Vec::new(),
            };
            let delta = request.amount_paid - payment.amount_paid;

            payment.amount_paid = request.amount_paid;
            payment.images.extend(added.iter().cloned());
            if request.voucher.is_some() {
                payment.voucher = request.voucher.clone();
            }
            if request.comment.is_some() {
                payment.comment = request.comment.clone();
            }
            if request.payment_date.is_some() {
                payment.payment_date = request.payment_date;
            }
            payment.rederive();
            self.repos.student_payments.replace(&mut payment).await?;

            Ok(Materialized {
                payment,
                created: false,
                amount: delta,
                added_images: added.clone(),
                previous,
            })
        })
        .await;

        let materialized = match result {
            Ok(m) => m,
            Err(e) => {
                self.images.delete_images(&images).await;
                return Err(e);
            }
        };

        let delta = materialized.amount;
        if !delta.is_zero() {
            let (tx_type, description) = if delta > Decimal::ZERO {
                (TransactionType::Collection, "Ajuste de pago")
            } else {
                (TransactionType::Expense, "Devolución de pago")
            };
            let posting = LedgerPosting::new(tx_type, delta.abs(), description)
                .related("StudentPayment", id)
                .student(materialized.payment.student_id)
                .collection(materialized.payment.collection_id)
                .student_payment(id);

            if let Err(e) = self.ledger.post_correction(posting, actor).await {
                tracing::error!(error = %e, payment_id = %id, "Ledger correction failed, rolling back payment");
                self.rollback(&materialized).await;
                self.images.delete_images(&images).await;
                return Err(e);
            }
        }

        self.collections
            .recompute_after_payment(materialized.payment.collection_id)
            .await;
        tracing::info!(payment_id = %id, delta = %delta, "Payment updated");
        Ok(materialized.payment)
    }

    /// Forgive what is still pending. Only for collections that allow
    /// exemptions; the forgiven amount is logged as an `Exonerated`
    /// transaction, which leaves the balance unchanged.
    #[instrument(skip(self, actor, request))]
    pub async fn exonerate(
        &self,
        actor: &Actor,
        id: Uuid,
        request: ExonerateRequest,
    ) -> Result<StudentPayment, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let payment = self.load(id).await?;
        let collection = self.collections.get(payment.collection_id).await?;
        if !collection.allows_exemptions {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Collection {} does not allow exemptions",
                collection.id
            )));
        }

        let comment = &request.comment;
        let (payment, forgiven, previous_comment) =
            retry_on_conflict(&self.retry, "student_payment.exonerate", move || async move {
                let mut payment = self.load(id).await?;
                if payment.exonerated {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "Student payment {} is already exonerated",
                        id
                    )));
                }
                let forgiven = payment.pending;
                let previous_comment = payment.comment.clone();

                payment.exonerated = true;
                if comment.is_some() {
                    payment.comment = comment.clone();
                }
                payment.rederive();
                self.repos.student_payments.replace(&mut payment).await?;
                Ok((payment, forgiven, previous_comment))
            })
            .await?;

        if forgiven > Decimal::ZERO {
            let student_name = self
                .students
                .get(payment.student_id)
                .await
                .map(|s| s.name)
                .unwrap_or_else(|_| payment.student_id.to_string());
            let posting = LedgerPosting::new(
                TransactionType::Exonerated,
                forgiven,
                format!("Exoneración de {} - {}", student_name, collection.name),
            )
            .related("StudentPayment", id)
            .student(payment.student_id)
            .collection(collection.id)
            .student_payment(id);

            if let Err(e) = self.ledger.post(posting, actor).await {
                tracing::error!(error = %e, payment_id = %id, "Ledger posting failed, reverting exoneration");
                self.revert_exoneration(id, previous_comment).await;
                return Err(e);
            }
        }

        self.collections.recompute_after_payment(collection.id).await;
        tracing::info!(payment_id = %id, forgiven = %forgiven, "Payment exonerated");
        Ok(payment)
    }

    async fn revert_exoneration(&self, id: Uuid, previous_comment: Option<String>) {
        let previous_comment = &previous_comment;
        let result = retry_on_conflict(&self.retry, "student_payment.unexonerate", move || async move {
            let mut payment = self.load(id).await?;
            payment.exonerated = false;
            payment.comment = previous_comment.clone();
            payment.rederive();
            self.repos.student_payments.replace(&mut payment).await
        })
        .await;

        if let Err(e) = result {
            metrics::record_compensation("exoneration", "failed");
            tracing::error!(error = %e, payment_id = %id, "Integrity gap: exoneration without ledger entry");
        } else {
            metrics::record_compensation("exoneration", "ok");
        }
    }
}

pub(crate) fn ensure_represents(actor: &Actor, student: &Student) -> Result<(), AppError> {
    if actor.is_admin() || student.representative_id.as_deref() == Some(actor.user_id.as_str()) {
        Ok(())
    } else {
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Student {} is not represented by this user",
            student.id
        )))
    }
}

pub(crate) fn decode_all(uploads: &[crate::dtos::ImageUpload]) -> Result<Vec<ImageFile>, AppError> {
    uploads
        .iter()
        .map(|img| ImageFile::decode(&img.file_name, &img.content_base64))
        .collect()
}
