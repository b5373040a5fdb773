use std::sync::Arc;

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::mqtt::TransportRequest;

use super::state::BrokerStatus;
use super::topic::{CommandField, Topics};
use super::{Control, EditGate};

/// Translates user edits into outbound command messages. Cheap to clone, so a
/// UI layer can hold one handle per control.
///
/// Every operation runs through one guarded entry point: a command is dropped
/// (with a log line, never an error) when the broker is not connected, when
/// the originating control is inside a suppression window (the edit is the
/// display echo of an inbound update, not user intent), or when the transport
/// channel is full. Publishing is fire-and-forget; the device's response
/// arrives later as an ordinary inbound message.
#[derive(Clone)]
pub struct CommandPublisher {
    topics: Topics,
    transport: mpsc::Sender<TransportRequest>,
    link: watch::Receiver<BrokerStatus>,
    gate: Arc<EditGate>,
}

impl CommandPublisher {
    pub fn new(
        topics: Topics,
        transport: mpsc::Sender<TransportRequest>,
        link: watch::Receiver<BrokerStatus>,
        gate: Arc<EditGate>,
    ) -> Self {
        Self {
            topics,
            transport,
            link,
            gate,
        }
    }

    pub fn publish_source_voltage(&self, volts: f64) {
        self.send(
            CommandField::SourceVoltage,
            Some(Control::SourceVoltage),
            Some(json!({ "value": volts })),
        );
    }

    pub fn publish_source_voltage_enable(&self, enable: bool) {
        self.send(
            CommandField::SourceEnabled,
            Some(Control::SourceEnabled),
            Some(json!({ "value": enable })),
        );
    }

    pub fn publish_measure_continuously(&self, state: bool) {
        self.send(
            CommandField::MeasureContinuously,
            Some(Control::MeasureContinuously),
            Some(json!({ "value": state })),
        );
    }

    pub fn publish_measure(&self, nplc: f64, current: f64, auto_range: bool) {
        self.send(
            CommandField::MeasureCurrent,
            Some(Control::Speed),
            Some(json!({
                "nplc": nplc,
                "current": current,
                "auto_range": auto_range,
            })),
        );
    }

    pub fn publish_current_range(&self, amps: f64) {
        self.send(
            CommandField::CurrentRange,
            Some(Control::CurrentRange),
            Some(json!({ "value": amps })),
        );
    }

    pub fn publish_shutdown(&self) {
        self.send(CommandField::Shutdown, None, None);
    }

    pub fn publish_reset(&self) {
        self.send(CommandField::Reset, None, None);
    }

    /// The one entry point behind every operation: connectivity guard,
    /// suppression-gate check, log, non-blocking enqueue.
    fn send(
        &self,
        field: CommandField,
        control: Option<Control>,
        payload: Option<serde_json::Value>,
    ) {
        if *self.link.borrow() != BrokerStatus::Connected {
            warn!("Broker not connected, dropping {} command", field.suffix());
            return;
        }
        if let Some(control) = control {
            if self.gate.is_suppressed(control) {
                debug!(
                    "{} edit is a display echo, not user intent; skipping",
                    field.suffix()
                );
                return;
            }
        }

        let topic = self.topics.command(field);
        let payload = payload
            .map(|value| value.to_string().into_bytes())
            .unwrap_or_default();
        debug!("Publishing {}: {}", topic, String::from_utf8_lossy(&payload));

        if self
            .transport
            .try_send(TransportRequest::Publish { topic, payload })
            .is_err()
        {
            warn!("Transport channel full, dropping {} command", field.suffix());
        }
    }
}
