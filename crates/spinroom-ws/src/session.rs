use spinroom_models::protocol::ClientEnvelope;

/// Identity a socket established when it joined. An envelope must
/// match it exactly; a socket cannot speak for another client or
/// another room.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub room_id: String,
    pub client_id: String,
}

impl GatewaySession {
    pub fn covers(&self, envelope: &ClientEnvelope) -> bool {
        envelope.room_id == self.room_id && envelope.client_id == self.client_id
    }
}
