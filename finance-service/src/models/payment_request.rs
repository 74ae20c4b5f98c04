//! Payment request model and its approval state machine.
//!
//! ```text
//! Pending ──► UnderReview ──► Approved | Rejected | NeedsChanges
//!    │                                                │
//!    └──────► Approved | Rejected | NeedsChanges      │
//!    ▲                                                │
//!    └──────────────── resubmission ◄─────────────────┘
//! ```
//! `Approved` and `Rejected` are terminal.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentRequestStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    NeedsChanges,
}

impl PaymentRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRequestStatus::Pending => "Pending",
            PaymentRequestStatus::UnderReview => "UnderReview",
            PaymentRequestStatus::Approved => "Approved",
            PaymentRequestStatus::Rejected => "Rejected",
            PaymentRequestStatus::NeedsChanges => "NeedsChanges",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentRequestStatus::Approved | PaymentRequestStatus::Rejected
        )
    }
}

impl std::fmt::Display for PaymentRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentRequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(PaymentRequestStatus::Pending),
            "UnderReview" => Ok(PaymentRequestStatus::UnderReview),
            "Approved" => Ok(PaymentRequestStatus::Approved),
            "Rejected" => Ok(PaymentRequestStatus::Rejected),
            "NeedsChanges" => Ok(PaymentRequestStatus::NeedsChanges),
            other => Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown payment request status '{}'",
                other
            ))),
        }
    }
}

/// Everything that can happen to a request; each one lands in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestAction {
    Created,
    Updated,
    Resubmitted,
    ReviewStarted,
    Approved,
    Rejected,
    ChangesRequested,
    Commented,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Created => "created",
            RequestAction::Updated => "updated",
            RequestAction::Resubmitted => "resubmitted",
            RequestAction::ReviewStarted => "review_started",
            RequestAction::Approved => "approved",
            RequestAction::Rejected => "rejected",
            RequestAction::ChangesRequested => "changes_requested",
            RequestAction::Commented => "commented",
        }
    }

    /// States in which this action may be taken.
    fn allowed_from(&self) -> &'static [PaymentRequestStatus] {
        use PaymentRequestStatus::*;
        match self {
            RequestAction::Created => &[],
            RequestAction::Updated => &[Pending],
            RequestAction::Resubmitted => &[NeedsChanges],
            RequestAction::ReviewStarted => &[Pending],
            RequestAction::Approved | RequestAction::Rejected | RequestAction::ChangesRequested => {
                &[Pending, UnderReview]
            }
            RequestAction::Commented => &[Pending, UnderReview, Approved, Rejected, NeedsChanges],
        }
    }

    /// Status after the action; `None` keeps the current one.
    fn target(&self) -> Option<PaymentRequestStatus> {
        match self {
            RequestAction::Created => Some(PaymentRequestStatus::Pending),
            RequestAction::Updated | RequestAction::Commented => None,
            RequestAction::Resubmitted => Some(PaymentRequestStatus::Pending),
            RequestAction::ReviewStarted => Some(PaymentRequestStatus::UnderReview),
            RequestAction::Approved => Some(PaymentRequestStatus::Approved),
            RequestAction::Rejected => Some(PaymentRequestStatus::Rejected),
            RequestAction::ChangesRequested => Some(PaymentRequestStatus::NeedsChanges),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: RequestAction,
    pub user_id: String,
    pub user_role: Role,
    pub details: String,
    pub previous_status: Option<PaymentRequestStatus>,
    pub new_status: PaymentRequestStatus,
}

/// Append-only log of history entries. Entries can be read and appended,
/// never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail(Vec<HistoryEntry>);

impl AuditTrail {
    pub fn append(&mut self, entry: HistoryEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.0.last()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminComment {
    pub id: Uuid,
    pub admin_id: String,
    pub admin_name: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A representative's claim to have paid, awaiting admin approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub collection_id: Uuid,
    pub student_id: Uuid,
    /// User id of the representative who submitted the request.
    pub representative_id: String,
    pub amount_paid: Decimal,
    /// Amount owed per student when the request was created.
    pub pending_amount: Decimal,
    pub status: PaymentRequestStatus,
    #[serde(default)]
    pub images: Vec<String>,
    pub voucher: Option<String>,
    pub comment: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: AuditTrail,
    #[serde(default)]
    pub admin_comments: Vec<AdminComment>,
    pub rejection_reason: Option<String>,
    pub approved_by_admin_id: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub student_payment_id: Option<Uuid>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl PaymentRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        collection_id: Uuid,
        student_id: Uuid,
        representative_id: String,
        amount_paid: Decimal,
        pending_amount: Decimal,
        images: Vec<String>,
        voucher: Option<String>,
        comment: Option<String>,
        payment_date: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        let mut history = AuditTrail::default();
        history.append(HistoryEntry {
            timestamp: now,
            action: RequestAction::Created,
            user_id: representative_id.clone(),
            user_role: Role::Representative,
            details: "Solicitud creada".to_string(),
            previous_status: None,
            new_status: PaymentRequestStatus::Pending,
        });

        Self {
            id,
            collection_id,
            student_id,
            representative_id,
            amount_paid,
            pending_amount,
            status: PaymentRequestStatus::Pending,
            images,
            voucher,
            comment,
            payment_date,
            history,
            admin_comments: Vec::new(),
            rejection_reason: None,
            approved_by_admin_id: None,
            approved_at: None,
            student_payment_id: None,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Fail with `InvalidStateTransition` unless `action` is legal now.
    pub fn ensure_can(&self, action: RequestAction) -> Result<(), AppError> {
        if action.allowed_from().contains(&self.status) {
            Ok(())
        } else {
            Err(AppError::InvalidStateTransition(anyhow::anyhow!(
                "Cannot apply '{}' to payment request {} in state {}",
                action.as_str(),
                self.id,
                self.status
            )))
        }
    }

    /// Validate `action`, move to its target state and append the history
    /// entry. Returns the new status.
    pub fn transition(
        &mut self,
        action: RequestAction,
        user_id: &str,
        user_role: Role,
        details: impl Into<String>,
    ) -> Result<PaymentRequestStatus, AppError> {
        self.ensure_can(action)?;

        let previous = self.status;
        let next = action.target().unwrap_or(previous);
        self.status = next;
        self.history.append(HistoryEntry {
            timestamp: Utc::now(),
            action,
            user_id: user_id.to_string(),
            user_role,
            details: details.into(),
            previous_status: Some(previous),
            new_status: next,
        });

        Ok(next)
    }

    /// The owner may edit while the request is `Pending` or `NeedsChanges`.
    /// Editing a `NeedsChanges` request resubmits it.
    pub fn edit_action(&self) -> RequestAction {
        if self.status == PaymentRequestStatus::NeedsChanges {
            RequestAction::Resubmitted
        } else {
            RequestAction::Updated
        }
    }

    /// Only `Pending` and `Rejected` requests may be deleted.
    pub fn ensure_deletable(&self) -> Result<(), AppError> {
        match self.status {
            PaymentRequestStatus::Pending | PaymentRequestStatus::Rejected => Ok(()),
            other => Err(AppError::InvalidStateTransition(anyhow::anyhow!(
                "Payment request {} in state {} cannot be deleted",
                self.id,
                other
            ))),
        }
    }
}

super::impl_entity!(PaymentRequest, "payment_requests");
