use spinroom_models::protocol::ServerMessage;
use tokio::sync::broadcast;

/// Broadcast fan-out for one room. Every connected socket subscribes
/// on join; beacon timers and the event processor publish here. A send
/// with no receivers is not an error (room mid-teardown).
#[derive(Clone)]
pub struct RoomBus {
    sender: broadcast::Sender<ServerMessage>,
}

impl RoomBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
