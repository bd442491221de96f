use serde::{Deserialize, Serialize};

/// Fixed member color palette. Colors are unique within a room until
/// the room outgrows the palette, then they wrap round-robin.
pub const MEMBER_PALETTE: [&str; 8] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#bfef45",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPos {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub client_id: String,
    pub name: String,
    pub color: String,
    pub joined_at: i64,
    pub is_host: bool,
    pub cursor: Option<CursorPos>,
    /// Socket round trip measured by the gateway's periodic ping.
    pub latency_ms: Option<u32>,
}
