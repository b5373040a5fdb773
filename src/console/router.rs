use std::collections::BTreeSet;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::mqtt::{InboundMessage, MqttEvent, TransportRequest};

use super::state::{BrokerStatus, DeviceStatus, FieldUpdate, StateSynchronizer};
use super::topic::{InboundTopic, ResponseField, Topics};

/// Key/value view of one inbound payload. Empty when the payload was not
/// valid JSON: a malformed message degrades to a no-op, never a crash.
pub type DecodedPayload = serde_json::Map<String, Value>;

pub fn decode_payload(raw: &[u8]) -> DecodedPayload {
    match serde_json::from_slice(raw) {
        Ok(map) => map,
        Err(e) => {
            debug!("Error decoding message payload: {}", e);
            DecodedPayload::new()
        }
    }
}

/// The firmware is loose about scalar types: numbers may arrive as JSON
/// strings, booleans as 0/1. Absent or unusable keys yield `None` and the
/// field update is skipped.
fn field_f64(payload: &DecodedPayload, key: &str) -> Option<f64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_bool(payload: &DecodedPayload, key: &str) -> Option<bool> {
    match payload.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        _ => None,
    }
}

/// Decode arm of the field binding table: turns one classified field message
/// into the state mutation it requests, or `None` when the payload carries
/// nothing usable.
pub fn decode_field(field: ResponseField, payload: &DecodedPayload) -> Option<FieldUpdate> {
    match field {
        ResponseField::Current => field_f64(payload, "value").map(FieldUpdate::MeasuredCurrent),
        ResponseField::SourceVoltage => {
            field_f64(payload, "value").map(FieldUpdate::SourceVoltage)
        }
        ResponseField::SourceEnable => field_bool(payload, "value").map(FieldUpdate::SourceEnabled),
        ResponseField::MeasureContinuously => {
            field_bool(payload, "value").map(FieldUpdate::MeasureContinuously)
        }
        ResponseField::CurrentRange => {
            // measure-settings echo: any subset of the three keys may appear
            let range = field_f64(payload, "value");
            let auto_range = field_bool(payload, "auto_range");
            let nplc = field_f64(payload, "nplc");
            if range.is_none() && auto_range.is_none() && nplc.is_none() {
                return None;
            }
            Some(FieldUpdate::CurrentRange {
                range,
                auto_range,
                nplc,
            })
        }
    }
}

/// Classifies each transport event and drives the state synchronizer.
/// Exactly one handler per message; unrecognized topics fall through
/// silently.
pub struct Router {
    topics: Topics,
    requests: mpsc::Sender<TransportRequest>,
    subscribed: BTreeSet<String>,
}

impl Router {
    pub fn new(topics: Topics, requests: mpsc::Sender<TransportRequest>) -> Self {
        Self {
            topics,
            requests,
            subscribed: BTreeSet::new(),
        }
    }

    /// The subscription set requested so far. Re-processing the same
    /// device-connected message leaves it unchanged.
    pub fn subscriptions(&self) -> &BTreeSet<String> {
        &self.subscribed
    }

    pub fn handle_event(&mut self, event: MqttEvent, sync: &mut StateSynchronizer) {
        match event {
            MqttEvent::Connecting => sync.set_broker_status(BrokerStatus::Connecting),
            MqttEvent::Connected => sync.set_broker_status(BrokerStatus::Connected),
            MqttEvent::ConnectionLost(reason) => {
                warn!("Broker connection lost: {}", reason);
                sync.set_broker_status(BrokerStatus::Disconnected);
                // device status means nothing without a broker link
                sync.set_device_status(DeviceStatus::Unknown);
            }
            MqttEvent::Message(msg) => self.dispatch(&msg, sync),
        }
    }

    fn dispatch(&mut self, msg: &InboundMessage, sync: &mut StateSynchronizer) {
        let Some(kind) = self.topics.classify(&msg.topic) else {
            // unknown topics are ignored so newer firmware cannot break us
            return;
        };

        match kind {
            InboundTopic::DeviceConnected => {
                info!("Device connected");
                self.resubscribe();
                sync.set_device_status(DeviceStatus::Connected);
            }
            InboundTopic::DeviceError => {
                warn!(
                    "Device error: {}",
                    String::from_utf8_lossy(&msg.payload)
                );
                sync.set_device_status(DeviceStatus::Error);
            }
            InboundTopic::Field(field) => {
                let payload = decode_payload(&msg.payload);
                debug!(
                    "Received message on topic {} with payload {:?}",
                    msg.topic, payload
                );
                match decode_field(field, &payload) {
                    Some(update) => sync.apply(update),
                    None => debug!("No usable {} payload, skipping", field.suffix()),
                }
            }
        }
    }

    /// Safe to repeat: the set is fixed and the broker treats a duplicate
    /// subscription as a refresh.
    fn resubscribe(&mut self) {
        let topics = self.topics.subscriptions();
        self.subscribed.extend(topics.iter().cloned());
        if self
            .requests
            .try_send(TransportRequest::Subscribe(topics))
            .is_err()
        {
            warn!("Transport channel full, dropping subscribe request");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::watch;

    use crate::console::command::CommandPublisher;
    use crate::console::state::testutil::{DisplayCall, DisplayLog, RecordingSurface};
    use crate::console::EditGate;

    use super::*;

    struct Fixture {
        router: Router,
        sync: StateSynchronizer,
        /// The edit-event entry point a UI layer would hold; shares its gate
        /// and link status with the synchronizer.
        publisher: CommandPublisher,
        log: DisplayLog,
        requests_rx: mpsc::Receiver<TransportRequest>,
    }

    /// Wire a full core: router + synchronizer + publisher. With `echo` the
    /// surface behaves like a live widget toolkit, synchronously re-raising
    /// every display write as a user edit through the same publisher.
    fn fixture(echo: bool) -> Fixture {
        let topics = Topics::from_parts("lab/hv", "keithley1");
        let gate = Arc::new(EditGate::default());
        let (requests_tx, requests_rx) = mpsc::channel(16);
        let (link_tx, link_rx) = watch::channel(BrokerStatus::Disconnected);

        let publisher = CommandPublisher::new(
            topics.clone(),
            requests_tx.clone(),
            link_rx,
            gate.clone(),
        );

        let (mut surface, log) = RecordingSurface::new(gate.clone());
        if echo {
            surface.echo = Some(publisher.clone());
        }

        let sync = StateSynchronizer::new(
            Box::new(surface),
            gate,
            link_tx,
            "broker.local:1883".into(),
        );
        let router = Router::new(topics, requests_tx);

        Fixture {
            router,
            sync,
            publisher,
            log,
            requests_rx,
        }
    }

    fn message(topic: &str, payload: &[u8]) -> MqttEvent {
        MqttEvent::Message(InboundMessage {
            topic: topic.into(),
            payload: payload.to_vec(),
        })
    }

    #[test]
    fn source_voltage_response_updates_state_without_an_echo() {
        let mut f = fixture(true);
        f.router.handle_event(MqttEvent::Connected, &mut f.sync);
        drain_requests(&mut f.requests_rx);

        f.router.handle_event(
            message("lab/hv/response/keithley1/source_voltage", br#"{"value": 12.5}"#),
            &mut f.sync,
        );

        assert_eq!(f.sync.state().source_voltage, 12.5);
        let suppressed_writes: Vec<_> = f
            .log
            .borrow()
            .iter()
            .filter(|(call, _)| matches!(call, DisplayCall::SourceVoltage(_)))
            .cloned()
            .collect();
        assert_eq!(
            suppressed_writes,
            vec![(DisplayCall::SourceVoltage(12.5), true)]
        );
        // the surface re-raised the edit, but the gate swallowed it
        assert!(f.requests_rx.try_recv().is_err());
    }

    #[test]
    fn malformed_payload_leaves_state_untouched() {
        let mut f = fixture(false);
        let before = *f.sync.state();

        f.router.handle_event(
            message("lab/hv/response/keithley1/source_voltage", b"not json at all"),
            &mut f.sync,
        );
        f.router.handle_event(
            message("lab/hv/response/keithley1/current", b"\xff\xfe\x00"),
            &mut f.sync,
        );

        assert_eq!(*f.sync.state(), before);
        assert!(f.log.borrow().is_empty());
    }

    #[test]
    fn payload_missing_the_expected_key_is_skipped() {
        let mut f = fixture(false);
        f.router.handle_event(
            message("lab/hv/response/keithley1/source_voltage", br#"{"reading": 1.0}"#),
            &mut f.sync,
        );

        assert_eq!(f.sync.state().source_voltage, 0.0);
        assert!(f.log.borrow().is_empty());
    }

    #[test]
    fn device_connected_sets_status_and_resubscribes_idempotently() {
        let mut f = fixture(false);
        let connected = message("lab/hv/connected/keithley1", b"1");

        f.router.handle_event(connected.clone(), &mut f.sync);
        let first: BTreeSet<String> = f.router.subscriptions().clone();
        f.router.handle_event(connected, &mut f.sync);

        assert_eq!(f.router.subscriptions(), &first);
        assert_eq!(first.len(), 3);
        assert!(first.contains("lab/hv/response/keithley1/#"));
        assert_eq!(
            f.log.borrow().last().unwrap().0,
            DisplayCall::DeviceStatus("connected".into())
        );
    }

    #[test]
    fn device_error_shows_io_error_and_processing_continues() {
        let mut f = fixture(false);
        f.router.handle_event(
            message("lab/hv/error/keithley1", b"overload"),
            &mut f.sync,
        );
        assert_eq!(
            f.log.borrow().last().unwrap().0,
            DisplayCall::DeviceStatus("IO error".into())
        );

        f.router.handle_event(
            message("lab/hv/response/keithley1/current", br#"{"value": 1e-9}"#),
            &mut f.sync,
        );
        assert_eq!(f.sync.state().measured_current, 1e-9);
    }

    #[test]
    fn unrecognized_topics_are_silently_ignored() {
        let mut f = fixture(false);
        f.router.handle_event(
            message("lab/hv/response/keithley1/humidity", br#"{"value": 40}"#),
            &mut f.sync,
        );
        f.router
            .handle_event(message("somewhere/else", b"{}"), &mut f.sync);

        assert!(f.log.borrow().is_empty());
        assert!(f.requests_rx.try_recv().is_err());
    }

    #[test]
    fn broker_loss_resets_device_status() {
        let mut f = fixture(false);
        f.router.handle_event(MqttEvent::Connected, &mut f.sync);
        f.router.handle_event(
            message("lab/hv/connected/keithley1", b"1"),
            &mut f.sync,
        );
        f.router.handle_event(
            MqttEvent::ConnectionLost("keep-alive timeout".into()),
            &mut f.sync,
        );

        assert_eq!(f.sync.link().broker, BrokerStatus::Disconnected);
        assert_eq!(f.sync.link().device, DeviceStatus::Unknown);
        assert_eq!(
            f.log.borrow().last().unwrap().0,
            DisplayCall::DeviceStatus("disconnected".into())
        );
    }

    #[test]
    fn numeric_strings_and_numeric_booleans_decode() {
        let mut f = fixture(false);
        f.router.handle_event(
            message("lab/hv/response/keithley1/source_voltage", br#"{"value": "12.5"}"#),
            &mut f.sync,
        );
        f.router.handle_event(
            message("lab/hv/response/keithley1/source_enable", br#"{"value": 1}"#),
            &mut f.sync,
        );

        assert_eq!(f.sync.state().source_voltage, 12.5);
        assert!(f.sync.state().source_enabled);
    }

    /// Broker connects, device announces itself, the user sets 12.5 V, the
    /// device echoes it back. Exactly one outbound command; the echo applies
    /// cleanly without firing a second one.
    #[test]
    fn end_to_end_voltage_round_trip_fires_exactly_one_command() {
        let mut f = fixture(true);

        f.router.handle_event(MqttEvent::Connected, &mut f.sync);
        f.router.handle_event(
            message("lab/hv/connected/keithley1", b"1"),
            &mut f.sync,
        );
        assert_eq!(
            f.log.borrow().last().unwrap().0,
            DisplayCall::DeviceStatus("connected".into())
        );
        drain_requests(&mut f.requests_rx);

        // user edit
        f.publisher.publish_source_voltage(12.5);

        let commands = drain_requests(&mut f.requests_rx);
        assert_eq!(commands.len(), 1);
        let TransportRequest::Publish { topic, payload } = &commands[0] else {
            panic!("expected a publish");
        };
        assert_eq!(topic, "lab/hv/cmnd/keithley1/source_voltage");
        let decoded: serde_json::Value = serde_json::from_slice(payload).unwrap();
        assert_eq!(decoded, serde_json::json!({ "value": 12.5 }));

        // device round trip
        f.router.handle_event(
            message("lab/hv/response/keithley1/source_voltage", payload),
            &mut f.sync,
        );
        assert_eq!(f.sync.state().source_voltage, 12.5);
        assert_eq!(
            f.log.borrow().last().unwrap().0,
            DisplayCall::SourceVoltage(12.5)
        );
        // no second outbound command from the echo
        assert!(drain_requests(&mut f.requests_rx).is_empty());
    }

    fn drain_requests(rx: &mut mpsc::Receiver<TransportRequest>) -> Vec<TransportRequest> {
        let mut drained = Vec::new();
        while let Ok(request) = rx.try_recv() {
            drained.push(request);
        }
        drained
    }
}
