use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student enrolled in the class whose finances are managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    /// User id of the representative (guardian) account for this student.
    pub representative_id: Option<String>,
    pub active: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Student {
    pub fn new(name: String, representative_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            representative_id,
            active: true,
            version: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

super::impl_entity!(Student, "students");
