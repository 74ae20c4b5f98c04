//! Push notification payloads.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const REPRESENTATIVES_TOPIC: &str = "representatives";
pub const ADMINISTRATORS_TOPIC: &str = "administrators";

/// Where a push goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushTarget {
    Topic(String),
    /// A single user, reached through their personal topic.
    User(String),
}

impl PushTarget {
    pub fn representatives() -> Self {
        PushTarget::Topic(REPRESENTATIVES_TOPIC.to_string())
    }

    pub fn administrators() -> Self {
        PushTarget::Topic(ADMINISTRATORS_TOPIC.to_string())
    }

    pub fn topic(&self) -> String {
        match self {
            PushTarget::Topic(topic) => topic.clone(),
            PushTarget::User(user_id) => format!("user-{}", user_id),
        }
    }
}

/// Known notification shapes. Serialised into a flat string map with a
/// `type` key, which is what FCM accepts as `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationData {
    NewCollection {
        collection_id: Uuid,
        collection_name: String,
        individual_amount: Decimal,
    },
    PaymentRequestSubmitted {
        payment_request_id: Uuid,
        collection_id: Uuid,
        student_id: Uuid,
        amount: Decimal,
    },
    PaymentApproved {
        payment_request_id: Uuid,
        student_payment_id: Uuid,
        amount: Decimal,
    },
    PaymentRejected {
        payment_request_id: Uuid,
        reason: String,
    },
    ChangesRequested {
        payment_request_id: Uuid,
        comment: String,
    },
}

impl NotificationData {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationData::NewCollection { .. } => "new_collection",
            NotificationData::PaymentRequestSubmitted { .. } => "payment_request_submitted",
            NotificationData::PaymentApproved { .. } => "payment_approved",
            NotificationData::PaymentRejected { .. } => "payment_rejected",
            NotificationData::ChangesRequested { .. } => "changes_requested",
        }
    }

    pub fn title(&self) -> String {
        match self {
            NotificationData::NewCollection { .. } => "Nuevo cobro".to_string(),
            NotificationData::PaymentRequestSubmitted { .. } => {
                "Nueva solicitud de pago".to_string()
            }
            NotificationData::PaymentApproved { .. } => "Pago aprobado".to_string(),
            NotificationData::PaymentRejected { .. } => "Pago rechazado".to_string(),
            NotificationData::ChangesRequested { .. } => "Cambios solicitados".to_string(),
        }
    }

    pub fn body(&self) -> String {
        match self {
            NotificationData::NewCollection {
                collection_name,
                individual_amount,
                ..
            } => format!(
                "Se ha creado el cobro {} por {} por estudiante",
                collection_name, individual_amount
            ),
            NotificationData::PaymentRequestSubmitted { amount, .. } => {
                format!("Se recibió una solicitud de pago por {}", amount)
            }
            NotificationData::PaymentApproved { amount, .. } => {
                format!("Su pago por {} fue aprobado", amount)
            }
            NotificationData::PaymentRejected { reason, .. } => {
                format!("Su solicitud de pago fue rechazada: {}", reason)
            }
            NotificationData::ChangesRequested { comment, .. } => {
                format!("Se solicitaron cambios en su solicitud de pago: {}", comment)
            }
        }
    }

    /// Deterministic string map (sorted keys) for the push `data` field.
    pub fn to_data_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if let Ok(serde_json::Value::Object(fields)) = serde_json::to_value(self) {
            for (key, value) in fields {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                map.insert(key, value);
            }
        }
        map
    }
}
