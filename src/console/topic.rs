use crate::config::Config;

use super::Control;

/// Fields the device reports under `{base}/response/{device}/`.
///
/// [`ResponseField::ALL`] is the dispatch table: one row per synchronized
/// field, in match order. Adding a field is one new variant plus its row,
/// suffix and control binding here and its decode arm in the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseField {
    Current,
    CurrentRange,
    SourceVoltage,
    SourceEnable,
    MeasureContinuously,
}

impl ResponseField {
    pub const ALL: [ResponseField; 5] = [
        ResponseField::Current,
        ResponseField::CurrentRange,
        ResponseField::SourceVoltage,
        ResponseField::SourceEnable,
        ResponseField::MeasureContinuously,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ResponseField::Current => "current",
            ResponseField::CurrentRange => "current_range",
            ResponseField::SourceVoltage => "source_voltage",
            ResponseField::SourceEnable => "source_enable",
            // the firmware spells it without the second "u"
            ResponseField::MeasureContinuously => "measure_continously",
        }
    }

    /// The UI control this field's display updates land on.
    pub fn control(self) -> Control {
        match self {
            ResponseField::Current => Control::MeasuredCurrent,
            ResponseField::CurrentRange => Control::CurrentRange,
            ResponseField::SourceVoltage => Control::SourceVoltage,
            ResponseField::SourceEnable => Control::SourceEnabled,
            ResponseField::MeasureContinuously => Control::MeasureContinuously,
        }
    }
}

/// Commands the console publishes under `{base}/cmnd/{device}/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandField {
    SourceVoltage,
    SourceEnabled,
    MeasureContinuously,
    MeasureCurrent,
    CurrentRange,
    Shutdown,
    Reset,
}

impl CommandField {
    pub fn suffix(self) -> &'static str {
        match self {
            CommandField::SourceVoltage => "source_voltage",
            // command side says "enabled", the response side "enable"
            CommandField::SourceEnabled => "source_enabled",
            CommandField::MeasureContinuously => "measure_continously",
            CommandField::MeasureCurrent => "measure_current",
            CommandField::CurrentRange => "current_range",
            CommandField::Shutdown => "shutdown",
            CommandField::Reset => "reset",
        }
    }
}

/// Classification of one inbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundTopic {
    DeviceConnected,
    DeviceError,
    Field(ResponseField),
}

/// The single constructor for every topic this console touches. Built once
/// from `(topic_base, device_name)`; no other module formats topic strings.
#[derive(Debug, Clone)]
pub struct Topics {
    command_prefix: String,
    response_prefix: String,
    response_wildcard: String,
    connected: String,
    error: String,
}

impl Topics {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(&config.topic_base, &config.device_name)
    }

    pub fn from_parts(base: &str, device: &str) -> Self {
        Self {
            command_prefix: format!("{base}/cmnd/{device}/"),
            response_prefix: format!("{base}/response/{device}/"),
            response_wildcard: format!("{base}/response/{device}/#"),
            connected: format!("{base}/connected/{device}"),
            error: format!("{base}/error/{device}"),
        }
    }

    /// The three subscriptions the console needs. Fixed set; re-issuing it is
    /// always safe.
    pub fn subscriptions(&self) -> Vec<String> {
        vec![
            self.response_wildcard.clone(),
            self.connected.clone(),
            self.error.clone(),
        ]
    }

    pub fn command(&self, field: CommandField) -> String {
        format!("{}{}", self.command_prefix, field.suffix())
    }

    /// Classify an inbound topic. First match wins: the connection-status
    /// topic, then the error topic, then (under the response prefix only)
    /// the first field whose suffix the topic ends with. Anything else is
    /// unrecognized and ignored by the router, so newer firmware fields do
    /// not break older consoles.
    pub fn classify(&self, topic: &str) -> Option<InboundTopic> {
        if topic == self.connected {
            return Some(InboundTopic::DeviceConnected);
        }
        if topic == self.error {
            return Some(InboundTopic::DeviceError);
        }
        if topic.starts_with(&self.response_prefix) {
            return ResponseField::ALL
                .into_iter()
                .find(|field| topic.ends_with(field.suffix()))
                .map(InboundTopic::Field);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::from_parts("lab/hv", "keithley1")
    }

    #[test]
    fn subscriptions_cover_response_connected_and_error() {
        assert_eq!(
            topics().subscriptions(),
            vec![
                "lab/hv/response/keithley1/#",
                "lab/hv/connected/keithley1",
                "lab/hv/error/keithley1",
            ]
        );
    }

    #[test]
    fn command_topics_are_derived_from_base_device_and_field() {
        let topics = topics();
        assert_eq!(
            topics.command(CommandField::SourceVoltage),
            "lab/hv/cmnd/keithley1/source_voltage"
        );
        assert_eq!(
            topics.command(CommandField::SourceEnabled),
            "lab/hv/cmnd/keithley1/source_enabled"
        );
        assert_eq!(
            topics.command(CommandField::MeasureContinuously),
            "lab/hv/cmnd/keithley1/measure_continously"
        );
        assert_eq!(topics.command(CommandField::Shutdown), "lab/hv/cmnd/keithley1/shutdown");
    }

    #[test]
    fn classifies_connection_and_error_topics() {
        let topics = topics();
        assert_eq!(
            topics.classify("lab/hv/connected/keithley1"),
            Some(InboundTopic::DeviceConnected)
        );
        assert_eq!(
            topics.classify("lab/hv/error/keithley1"),
            Some(InboundTopic::DeviceError)
        );
    }

    #[test]
    fn classifies_every_field_suffix() {
        let topics = topics();
        for field in ResponseField::ALL {
            let topic = format!("lab/hv/response/keithley1/{}", field.suffix());
            assert_eq!(topics.classify(&topic), Some(InboundTopic::Field(field)));
        }
    }

    #[test]
    fn every_field_binds_a_distinct_suffix_and_control() {
        for (i, field) in ResponseField::ALL.into_iter().enumerate() {
            for other in &ResponseField::ALL[i + 1..] {
                assert_ne!(field.suffix(), other.suffix());
                assert_ne!(field.control(), other.control());
            }
        }
    }

    #[test]
    fn current_range_does_not_shadow_current() {
        let topics = topics();
        assert_eq!(
            topics.classify("lab/hv/response/keithley1/current_range"),
            Some(InboundTopic::Field(ResponseField::CurrentRange))
        );
    }

    #[test]
    fn unknown_response_suffix_is_unrecognized() {
        assert_eq!(topics().classify("lab/hv/response/keithley1/humidity"), None);
    }

    #[test]
    fn foreign_device_and_foreign_base_are_unrecognized() {
        let topics = topics();
        assert_eq!(topics.classify("lab/hv/response/other/current"), None);
        assert_eq!(topics.classify("other/response/keithley1/current"), None);
        assert_eq!(topics.classify("lab/hv/cmnd/keithley1/source_voltage"), None);
    }
}
