use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub queue_item_id: String,
    pub track_id: String,
    pub title: String,
    pub duration_sec: f64,
    pub added_by: String,
    pub added_at: i64,
}
