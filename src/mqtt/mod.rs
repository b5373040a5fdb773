pub mod client;

/// One message received from the broker, alive for the duration of one
/// dispatch.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Everything the transport task reports to the console core.
#[derive(Debug, Clone)]
pub enum MqttEvent {
    /// A connection attempt is underway (startup or after an error).
    Connecting,
    /// CONNACK received; subscriptions have been issued.
    Connected,
    ConnectionLost(String),
    Message(InboundMessage),
}

/// A request from the console core to the transport task. Fire-and-forget:
/// the core never waits for the broker round trip.
#[derive(Debug, Clone)]
pub enum TransportRequest {
    /// Publish `payload` on `topic`. Shutdown/reset commands carry an empty
    /// payload.
    Publish { topic: String, payload: Vec<u8> },
    Subscribe(Vec<String>),
}
