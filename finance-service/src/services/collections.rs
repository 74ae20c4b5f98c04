//! Collections and the aggregates derived from their payments.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_on_conflict, RetryConfig};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::images::{ImageFile, ImageStore};
use super::notifications::Notifications;
use super::repository::{Filter, Repositories};
use super::settlement::{compute_advance, compute_percentage_paid, split_amount};
use crate::dtos::{AdjustCollectionRequest, CreateCollectionRequest, UpdateCollectionRequest};
use crate::middleware::Actor;
use crate::models::{
    Advance, Collection, Entity, NotificationData, PushTarget, Student, StudentPayment,
    StudentQuantity,
};

#[derive(Clone)]
pub struct CollectionService {
    repos: Repositories,
    images: Arc<dyn ImageStore>,
    notifications: Notifications,
    retry: RetryConfig,
}

impl CollectionService {
    pub fn new(
        repos: Repositories,
        images: Arc<dyn ImageStore>,
        notifications: Notifications,
    ) -> Self {
        Self {
            repos,
            images,
            notifications,
            retry: RetryConfig::default(),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Collection, AppError> {
        self.repos
            .collections
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("Collection", id))
    }

    pub async fn list(&self) -> Result<Vec<Collection>, AppError> {
        self.repos.collections.find(Filter::new()).await
    }

    pub async fn payments(&self, id: Uuid) -> Result<Vec<StudentPayment>, AppError> {
        self.get(id).await?;
        self.payments_of(id).await
    }

    async fn payments_of(&self, collection_id: Uuid) -> Result<Vec<StudentPayment>, AppError> {
        self.repos
            .student_payments
            .find(Filter::new().id("collection_id", collection_id))
            .await
    }

    /// Create a collection and one pending payment per targeted student.
    #[instrument(skip(self, actor, request), fields(name = %request.name, total_amount = %request.total_amount))]
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateCollectionRequest,
    ) -> Result<Collection, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let (students, student_quantity) = self.target_students(&request.student_ids).await?;
        let individual_amount = split_amount(request.total_amount, students.len() as i64)
            .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("There are no students to charge")))?;

        let files = request
            .images
            .iter()
            .map(|img| ImageFile::decode(&img.file_name, &img.content_base64))
            .collect::<Result<Vec<_>, _>>()?;

        let id = Uuid::new_v4();
        let images = self.images.save_images(files, "collections", id).await?;

        let now = Utc::now();
        let collection = Collection {
            id,
            collection_type_id: request.collection_type_id,
            name: request.name,
            total_amount: request.total_amount,
            individual_amount,
            adjusted_individual_amount: None,
            total_surplus: Decimal::ZERO,
            date: request.date.unwrap_or(now),
            percentage_paid: Decimal::ZERO,
            allows_exemptions: request.allows_exemptions,
            advance: Advance::default(),
            student_quantity,
            images,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        if let Err(e) = self.repos.collections.insert(&collection).await {
            self.images.delete_images(&collection.images).await;
            return Err(e);
        }

        let mut created: Vec<Uuid> = Vec::with_capacity(students.len());
        for student in &students {
            let payment = StudentPayment::new(id, student.id, individual_amount, None);
            if let Err(e) = self.repos.student_payments.insert(&payment).await {
                tracing::error!(error = %e, collection_id = %id, "Failed to create student payment, removing collection");
                self.discard(&collection, &created).await;
                return Err(e);
            }
            created.push(payment.id);
        }

        let collection = self.recompute(id).await?;

        tracing::info!(
            collection_id = %id,
            students = students.len(),
            individual_amount = %individual_amount,
            "Collection created"
        );

        self.notifications
            .dispatch(
                PushTarget::representatives(),
                NotificationData::NewCollection {
                    collection_id: id,
                    collection_name: collection.name.clone(),
                    individual_amount,
                },
            )
            .await;

        Ok(collection)
    }

    async fn target_students(
        &self,
        student_ids: &[Uuid],
    ) -> Result<(Vec<Student>, StudentQuantity), AppError> {
        if student_ids.is_empty() {
            let students = self.repos.students.find(Filter::new()).await?;
            return Ok((students, StudentQuantity::All));
        }

        let mut seen = HashSet::new();
        let mut students = Vec::new();
        for id in student_ids.iter().filter(|id| seen.insert(**id)) {
            let student = self
                .repos
                .students
                .get_by_id(*id)
                .await?
                .ok_or_else(|| AppError::not_found("Student", id))?;
            students.push(student);
        }
        let count = students.len() as i64;
        Ok((students, StudentQuantity::Specific(count)))
    }

    /// Undo a half-created collection.
    async fn discard(&self, collection: &Collection, payment_ids: &[Uuid]) {
        for payment_id in payment_ids {
            if let Err(e) = self.repos.student_payments.remove(*payment_id).await {
                tracing::error!(error = %e, payment_id = %payment_id, "Integrity gap: orphan student payment");
            }
        }
        if let Err(e) = self.repos.collections.remove(collection.id).await {
            tracing::error!(error = %e, collection_id = %collection.id, "Integrity gap: orphan collection");
        }
        self.images.delete_images(&collection.images).await;
    }

    /// Rebuild `advance` and `percentage_paid` from the payment set.
    #[instrument(skip(self))]
    pub async fn recompute(&self, id: Uuid) -> Result<Collection, AppError> {
        retry_on_conflict(&self.retry, "collection.recompute", move || async move {
            let mut collection = self.get(id).await?;
            let payments = self.payments_of(id).await?;

            let advance = compute_advance(&payments);
            let percentage_paid =
                compute_percentage_paid(&payments, collection.effective_individual_amount());

            if collection.advance != advance || collection.percentage_paid != percentage_paid {
                collection.advance = advance;
                collection.percentage_paid = percentage_paid;
                self.repos.collections.replace(&mut collection).await?;
            }
            Ok(collection)
        })
        .await
    }

    /// Recompute after a payment changed. The payment change already
    /// happened, so a failure here is logged rather than returned.
    pub async fn recompute_after_payment(&self, id: Uuid) {
        if let Err(e) = self.recompute(id).await {
            tracing::error!(error = %e, collection_id = %id, "Failed to recompute collection aggregates");
        }
    }

    /// Update name, date, exemption flag or amounts. Changing an amount
    /// rewrites every payment's base amount.
    #[instrument(skip(self, actor, request))]
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        request: UpdateCollectionRequest,
    ) -> Result<Collection, AppError> {
        actor.require_admin()?;
        request.validate()?;

        if request.total_amount.is_some() && request.individual_amount.is_some() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Provide either total_amount or individual_amount, not both"
            )));
        }
        for amount in [request.total_amount, request.individual_amount]
            .into_iter()
            .flatten()
        {
            if amount <= Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Amount must be greater than zero"
                )));
            }
        }

        let request = &request;
        let (collection, new_individual) =
            retry_on_conflict(&self.retry, "collection.update", move || async move {
                let mut collection = self.get(id).await?;
                if let Some(name) = &request.name {
                    collection.name = name.clone();
                }
                if let Some(date) = request.date {
                    collection.date = date;
                }
                if let Some(allows) = request.allows_exemptions {
                    collection.allows_exemptions = allows;
                }

                let mut new_individual = None;
                if request.total_amount.is_some() || request.individual_amount.is_some() {
                    let count = self
                        .repos
                        .student_payments
                        .count(Filter::new().id("collection_id", id))
                        .await? as i64;

                    if let Some(total) = request.total_amount {
                        collection.total_amount = total;
                        collection.individual_amount = split_amount(total, count).unwrap_or(total);
                    } else if let Some(individual) = request.individual_amount {
                        collection.individual_amount = individual;
                        collection.total_amount = individual * Decimal::from(count.max(1));
                    }
                    new_individual = Some(collection.individual_amount);
                }

                self.repos.collections.replace(&mut collection).await?;
                Ok((collection, new_individual))
            })
            .await?;

        if let Some(individual) = new_individual {
            for payment in self.payments_of(id).await? {
                self.update_payment(payment.id, |p| {
                    p.amount_collection = individual;
                })
                .await?;
            }
        }

        tracing::info!(collection_id = %id, "Collection updated");
        if new_individual.is_some() {
            self.recompute(id).await
        } else {
            Ok(collection)
        }
    }

    /// Override the per-student amount and surplus, then re-derive every
    /// payment against the adjusted amount. Base amounts are kept.
    ///
    /// Every value is recomputed from source, so repeating the call with
    /// the same inputs changes nothing.
    #[instrument(skip(self, actor, request), fields(adjusted_amount = %request.adjusted_amount, surplus = %request.surplus))]
    pub async fn adjust(
        &self,
        actor: &Actor,
        id: Uuid,
        request: AdjustCollectionRequest,
    ) -> Result<Collection, AppError> {
        actor.require_admin()?;
        request.validate()?;

        let adjusted = request.adjusted_amount;
        let surplus = request.surplus;

        retry_on_conflict(&self.retry, "collection.adjust", move || async move {
            let mut collection = self.get(id).await?;
            if collection.adjusted_individual_amount != Some(adjusted)
                || collection.total_surplus != surplus
            {
                collection.adjusted_individual_amount = Some(adjusted);
                collection.total_surplus = surplus;
                self.repos.collections.replace(&mut collection).await?;
            }
            Ok(())
        })
        .await?;

        for payment in self.payments_of(id).await? {
            self.update_payment(payment.id, |p| {
                p.adjusted_amount_collection = Some(adjusted);
                p.surplus = surplus;
            })
            .await?;
        }

        tracing::info!(collection_id = %id, "Collection amount adjusted");
        self.recompute(id).await
    }

    /// Versioned read-modify-write of one payment followed by re-derivation.
    /// Nothing is written when the result equals what is stored.
    async fn update_payment<F>(&self, payment_id: Uuid, apply: F) -> Result<(), AppError>
    where
        F: Fn(&mut StudentPayment) + Send + Sync,
    {
        let apply = &apply;
        retry_on_conflict(&self.retry, "student_payment.rederive", move || async move {
            let Some(mut payment) = self.repos.student_payments.get_by_id(payment_id).await? else {
                return Ok(());
            };
            let before = (
                payment.amount_collection,
                payment.adjusted_amount_collection,
                payment.surplus,
                payment.payment_status,
                payment.pending,
                payment.excedent,
            );

            apply(&mut payment);
            payment.rederive();

            let after = (
                payment.amount_collection,
                payment.adjusted_amount_collection,
                payment.surplus,
                payment.payment_status,
                payment.pending,
                payment.excedent,
            );
            if before != after {
                self.repos.student_payments.replace(&mut payment).await?;
            }
            Ok(())
        })
        .await
    }

    /// Soft delete a collection and its payments. Refused while any payment
    /// holds money.
    #[instrument(skip(self, actor))]
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<(), AppError> {
        actor.require_admin()?;
        let collection = self.get(id).await?;
        let payments = self.payments_of(id).await?;

        if payments.iter().any(|p| p.amount_paid > Decimal::ZERO) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Collection {} has recorded payments and cannot be deleted",
                id
            )));
        }

        for payment in &payments {
            self.repos.student_payments.soft_delete(payment.id).await?;
        }
        if !self.repos.collections.soft_delete(collection.id()).await? {
            return Err(AppError::not_found("Collection", id));
        }

        tracing::info!(collection_id = %id, payments = payments.len(), "Collection deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Role;
    use crate::models::PaymentStatus;
    use crate::services::notifications::LogNotifier;
    use crate::services::testing::{admin, test_images};
    use rust_decimal_macros::dec;

    async fn service(repos: &Repositories) -> (CollectionService, Arc<LogNotifier>) {
        let notifier = Arc::new(LogNotifier::new());
        let service = CollectionService::new(
            repos.clone(),
            test_images().await,
            Notifications::new(notifier.clone()),
        );
        (service, notifier)
    }

    async fn students(repos: &Repositories, n: usize) -> Vec<Student> {
        let mut out = Vec::new();
        for i in 0..n {
            let s = Student::new(format!("Student {}", i), Some(format!("rep-{}", i)));
            repos.students.insert(&s).await.unwrap();
            out.push(s);
        }
        out
    }

    fn create_request(total: Decimal, student_ids: Vec<Uuid>) -> CreateCollectionRequest {
        CreateCollectionRequest {
            name: "Excursion".to_string(),
            total_amount: total,
            date: None,
            allows_exemptions: true,
            collection_type_id: None,
            student_ids,
            images: vec![],
        }
    }

    async fn set_paid(repos: &Repositories, collection_id: Uuid, amounts: &[Decimal]) {
        let payments = repos
            .student_payments
            .find(Filter::new().id("collection_id", collection_id))
            .await
            .unwrap();
        for (payment, amount) in payments.into_iter().zip(amounts) {
            let mut payment = payment;
            payment.amount_paid = *amount;
            payment.rederive();
            repos.student_payments.replace(&mut payment).await.unwrap();
        }
    }

    #[tokio::test]
    async fn create_charges_every_active_student() {
        let repos = Repositories::in_memory();
        students(&repos, 4).await;
        let (service, notifier) = service(&repos).await;

        let collection = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();

        assert_eq!(collection.individual_amount, dec!(25));
        assert_eq!(collection.student_quantity, StudentQuantity::All);
        assert_eq!(collection.advance, Advance::new(4, 0));
        assert_eq!(collection.percentage_paid, dec!(0));

        let payments = service.payments(collection.id).await.unwrap();
        assert_eq!(payments.len(), 4);
        assert!(payments
            .iter()
            .all(|p| p.payment_status == PaymentStatus::Pending && p.pending == dec!(25)));
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn create_with_specific_students() {
        let repos = Repositories::in_memory();
        let all = students(&repos, 3).await;
        let (service, _) = service(&repos).await;

        let collection = service
            .create(
                &admin(),
                create_request(dec!(100), vec![all[0].id, all[1].id, all[0].id]),
            )
            .await
            .unwrap();

        assert_eq!(collection.student_quantity, StudentQuantity::Specific(2));
        assert_eq!(collection.individual_amount, dec!(50));
        assert_eq!(service.payments(collection.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_without_students_is_refused() {
        let repos = Repositories::in_memory();
        let (service, _) = service(&repos).await;

        let result = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_requires_admin_and_valid_amount() {
        let repos = Repositories::in_memory();
        students(&repos, 1).await;
        let (service, _) = service(&repos).await;

        let rep = Actor {
            role: Role::Representative,
            ..admin()
        };
        assert!(matches!(
            service.create(&rep, create_request(dec!(100), vec![])).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.create(&admin(), create_request(dec!(0), vec![])).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn adjust_rederives_against_adjusted_amount() {
        let repos = Repositories::in_memory();
        students(&repos, 1).await;
        let (service, _) = service(&repos).await;
        let collection = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();
        set_paid(&repos, collection.id, &[dec!(60)]).await;
        service.recompute(collection.id).await.unwrap();

        let payment = &service.payments(collection.id).await.unwrap()[0];
        assert_eq!(payment.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(payment.pending, dec!(40));

        let adjusted = service
            .adjust(
                &admin(),
                collection.id,
                AdjustCollectionRequest {
                    adjusted_amount: dec!(80),
                    surplus: dec!(0),
                },
            )
            .await
            .unwrap();

        let payment = &service.payments(collection.id).await.unwrap()[0];
        assert_eq!(payment.amount_collection, dec!(100));
        assert_eq!(payment.adjusted_amount_collection, Some(dec!(80)));
        assert_eq!(payment.payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(payment.pending, dec!(20));
        assert_eq!(payment.excedent, dec!(0));
        assert_eq!(adjusted.percentage_paid, dec!(75));
    }

    #[tokio::test]
    async fn adjust_overpayment_is_paid_with_excedent() {
        let repos = Repositories::in_memory();
        students(&repos, 2).await;
        let (service, _) = service(&repos).await;
        let collection = service
            .create(&admin(), create_request(dec!(200), vec![]))
            .await
            .unwrap();
        set_paid(&repos, collection.id, &[dec!(120), dec!(0)]).await;

        let adjusted = service
            .adjust(
                &admin(),
                collection.id,
                AdjustCollectionRequest {
                    adjusted_amount: dec!(100),
                    surplus: dec!(5),
                },
            )
            .await
            .unwrap();

        let payments = service.payments(collection.id).await.unwrap();
        assert_eq!(payments[0].payment_status, PaymentStatus::Paid);
        assert_eq!(payments[0].excedent, dec!(20));
        assert_eq!(payments[0].surplus, dec!(5));
        assert_eq!(payments[1].payment_status, PaymentStatus::Pending);
        assert_eq!(payments[1].pending, dec!(100));
        assert_eq!(adjusted.advance, Advance::new(2, 1));
        assert_eq!(adjusted.total_surplus, dec!(5));
    }

    #[tokio::test]
    async fn adjust_is_idempotent() {
        let repos = Repositories::in_memory();
        students(&repos, 3).await;
        let (service, _) = service(&repos).await;
        let collection = service
            .create(&admin(), create_request(dec!(300), vec![]))
            .await
            .unwrap();
        set_paid(&repos, collection.id, &[dec!(100), dec!(50), dec!(0)]).await;

        let request = AdjustCollectionRequest {
            adjusted_amount: dec!(90),
            surplus: dec!(10),
        };
        let first = service
            .adjust(&admin(), collection.id, request.clone())
            .await
            .unwrap();
        let first_payments = service.payments(collection.id).await.unwrap();

        let second = service
            .adjust(&admin(), collection.id, request)
            .await
            .unwrap();
        let second_payments = service.payments(collection.id).await.unwrap();

        assert_eq!(first.advance, second.advance);
        assert_eq!(first.percentage_paid, second.percentage_paid);
        assert_eq!(first.total_surplus, second.total_surplus);
        assert_eq!(first.version, second.version);
        for (a, b) in first_payments.iter().zip(&second_payments) {
            assert_eq!(a.payment_status, b.payment_status);
            assert_eq!(a.pending, b.pending);
            assert_eq!(a.excedent, b.excedent);
            assert_eq!(a.surplus, b.surplus);
            assert_eq!(a.version, b.version);
        }
        assert_eq!(second.advance.total, second.advance.completed + second.advance.pending);
    }

    #[tokio::test]
    async fn adjust_unknown_collection_is_not_found() {
        let repos = Repositories::in_memory();
        let (service, _) = service(&repos).await;
        let result = service
            .adjust(
                &admin(),
                Uuid::new_v4(),
                AdjustCollectionRequest {
                    adjusted_amount: dec!(10),
                    surplus: dec!(0),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_total_rewrites_base_amounts() {
        let repos = Repositories::in_memory();
        students(&repos, 2).await;
        let (service, _) = service(&repos).await;
        let collection = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();
        set_paid(&repos, collection.id, &[dec!(50), dec!(0)]).await;

        let updated = service
            .update(
                &admin(),
                collection.id,
                UpdateCollectionRequest {
                    name: Some("Excursion 2".to_string()),
                    total_amount: Some(dec!(200)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Excursion 2");
        assert_eq!(updated.individual_amount, dec!(100));
        let payments = service.payments(collection.id).await.unwrap();
        assert_eq!(payments[0].amount_collection, dec!(100));
        assert_eq!(payments[0].payment_status, PaymentStatus::PartiallyPaid);
        assert_eq!(payments[0].pending, dec!(50));
        assert_eq!(updated.percentage_paid, dec!(25));
    }

    #[tokio::test]
    async fn update_rejects_both_amounts() {
        let repos = Repositories::in_memory();
        students(&repos, 1).await;
        let (service, _) = service(&repos).await;
        let collection = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();

        let result = service
            .update(
                &admin(),
                collection.id,
                UpdateCollectionRequest {
                    total_amount: Some(dec!(10)),
                    individual_amount: Some(dec!(10)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn delete_is_refused_once_money_was_paid() {
        let repos = Repositories::in_memory();
        students(&repos, 2).await;
        let (service, _) = service(&repos).await;

        let untouched = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();
        service.delete(&admin(), untouched.id).await.unwrap();
        assert!(matches!(
            service.get(untouched.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(
            repos
                .student_payments
                .count(Filter::new().id("collection_id", untouched.id))
                .await
                .unwrap(),
            0
        );

        let paid = service
            .create(&admin(), create_request(dec!(100), vec![]))
            .await
            .unwrap();
        set_paid(&repos, paid.id, &[dec!(10)]).await;
        assert!(matches!(
            service.delete(&admin(), paid.id).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(service.get(paid.id).await.is_ok());
    }
}
