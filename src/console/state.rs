use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::display::{SpeedTier, eng_notation};
use super::{Control, EditGate};

/// The console's cached belief about the device. Mutated only by decoded
/// inbound field updates; user input never writes here directly (it goes out
/// as a command and comes back as state).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceState {
    pub source_voltage: f64,
    pub source_enabled: bool,
    pub current_range: f64,
    pub auto_range: bool,
    pub nplc: f64,
    pub measure_continuously: bool,
    pub measured_current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Connected,
    Error,
}

/// Connection state of the two hops between console and instrument. The
/// device sub-state is only meaningful while the broker is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub broker: BrokerStatus,
    pub device: DeviceStatus,
}

/// One decoded inbound field update, the unit of state mutation. The
/// current-range response is the measure-settings echo and may carry any
/// subset of its three keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    MeasuredCurrent(f64),
    SourceVoltage(f64),
    SourceEnabled(bool),
    MeasureContinuously(bool),
    CurrentRange {
        range: Option<f64>,
        auto_range: Option<bool>,
        nplc: Option<f64>,
    },
}

/// Display side of the UI collaborator. Implementations bind each sink to a
/// widget (or a log line, for the headless binary).
///
/// Every method is called from the core task only. An implementation whose
/// widget raises an edit event from within a `show_*` call (toolkit signals
/// do) gets that event filtered by the suppression gate, so programmatic
/// updates are never re-published as user intent.
pub trait ConsoleSurface {
    /// Measured current, pre-formatted in engineering notation.
    fn show_measured_current(&mut self, text: &str);
    fn show_source_voltage(&mut self, volts: f64);
    fn show_source_enabled(&mut self, enabled: bool);
    fn show_measure_continuously(&mut self, enabled: bool);
    /// `"Auto"` while auto-ranging, otherwise the range in engineering
    /// notation.
    fn show_current_range(&mut self, text: &str);
    fn show_speed(&mut self, speed: SpeedTier);
    fn show_device_status(&mut self, text: &str);
    fn show_broker_status(&mut self, text: &str);
}

/// Owns [`DeviceState`] and [`LinkStatus`]; converts inbound field updates
/// into display updates with the corresponding edit channel disarmed for the
/// duration of the write.
pub struct StateSynchronizer {
    state: DeviceState,
    link: LinkStatus,
    surface: Box<dyn ConsoleSurface>,
    gate: Arc<EditGate>,
    link_tx: watch::Sender<BrokerStatus>,
    broker_label: String,
}

impl StateSynchronizer {
    pub fn new(
        surface: Box<dyn ConsoleSurface>,
        gate: Arc<EditGate>,
        link_tx: watch::Sender<BrokerStatus>,
        broker_label: String,
    ) -> Self {
        Self {
            state: DeviceState::default(),
            link: LinkStatus::default(),
            surface,
            gate,
            link_tx,
            broker_label,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn link(&self) -> LinkStatus {
        self.link
    }

    /// Write `update` into the cached state, then push the new value to the
    /// surface inside a suppression window for the bound control.
    pub fn apply(&mut self, update: FieldUpdate) {
        debug!("Applying field update: {:?}", update);
        match update {
            FieldUpdate::MeasuredCurrent(amps) => {
                self.state.measured_current = amps;
                let text = eng_notation(amps, 4);
                self.display(Control::MeasuredCurrent, |surface| {
                    surface.show_measured_current(&text)
                });
            }
            FieldUpdate::SourceVoltage(volts) => {
                self.state.source_voltage = volts;
                self.display(Control::SourceVoltage, |surface| {
                    surface.show_source_voltage(volts)
                });
            }
            FieldUpdate::SourceEnabled(enabled) => {
                self.state.source_enabled = enabled;
                self.display(Control::SourceEnabled, |surface| {
                    surface.show_source_enabled(enabled)
                });
            }
            FieldUpdate::MeasureContinuously(enabled) => {
                self.state.measure_continuously = enabled;
                self.display(Control::MeasureContinuously, |surface| {
                    surface.show_measure_continuously(enabled)
                });
            }
            FieldUpdate::CurrentRange {
                range,
                auto_range,
                nplc,
            } => {
                if let Some(amps) = range {
                    self.state.current_range = amps;
                }
                if let Some(auto) = auto_range {
                    self.state.auto_range = auto;
                }
                if range.is_some() || auto_range.is_some() {
                    // "Auto" wins over any cached numeric range
                    let text = if self.state.auto_range {
                        "Auto".to_string()
                    } else {
                        eng_notation(self.state.current_range, 2)
                    };
                    self.display(Control::CurrentRange, |surface| {
                        surface.show_current_range(&text)
                    });
                }
                if let Some(value) = nplc {
                    self.state.nplc = value;
                    if let Some(tier) = SpeedTier::from_nplc(value) {
                        self.display(Control::Speed, |surface| surface.show_speed(tier));
                    }
                }
            }
        }
    }

    /// No suppression here: the status area carries no edit signal.
    pub fn set_device_status(&mut self, status: DeviceStatus) {
        self.link.device = status;
        let text = match status {
            DeviceStatus::Unknown => "disconnected".to_string(),
            DeviceStatus::Connected => "connected".to_string(),
            DeviceStatus::Error => "IO error".to_string(),
        };
        self.surface.show_device_status(&text);
    }

    pub fn set_broker_status(&mut self, status: BrokerStatus) {
        self.link.broker = status;
        self.link_tx.send_replace(status);
        let text = match status {
            BrokerStatus::Disconnected => "disconnected".to_string(),
            BrokerStatus::Connecting => "connecting".to_string(),
            BrokerStatus::Connected => format!("connected to broker {}", self.broker_label),
        };
        self.surface.show_broker_status(&text);
    }

    fn display(&mut self, control: Control, write: impl FnOnce(&mut dyn ConsoleSurface)) {
        let _window = self.gate.suppress(control);
        write(self.surface.as_mut());
    }
}
