use serde::{Deserialize, Serialize};

/// A stored setting. `value` is a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}
