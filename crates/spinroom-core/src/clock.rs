use spinroom_models::protocol::ServerSignal;

/// Answer a TIME_PING. Stateless: the server only echoes the client's
/// send stamp next to its own clock; offset and RTT estimation happen
/// entirely client-side.
pub fn time_pong(t0: i64, now_ms: i64) -> ServerSignal {
    ServerSignal::TimePong {
        t0,
        server_ts: now_ms,
    }
}
