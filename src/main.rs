use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use keithley6517b_mqtt_console::config::Config;
use keithley6517b_mqtt_console::console::command::CommandPublisher;
use keithley6517b_mqtt_console::console::display::SpeedTier;
use keithley6517b_mqtt_console::console::router::Router;
use keithley6517b_mqtt_console::console::state::{
    BrokerStatus, ConsoleSurface, DeviceStatus, StateSynchronizer,
};
use keithley6517b_mqtt_console::console::topic::Topics;
use keithley6517b_mqtt_console::console::EditGate;
use keithley6517b_mqtt_console::mqtt::client::MqttClient;

/// Display surface for headless operation: every update the GUI would render
/// lands in the log instead.
struct LogSurface;

impl ConsoleSurface for LogSurface {
    fn show_measured_current(&mut self, text: &str) {
        info!("Measured current: {}A", text);
    }

    fn show_source_voltage(&mut self, volts: f64) {
        info!("Source voltage: {} V", volts);
    }

    fn show_source_enabled(&mut self, enabled: bool) {
        info!("Source enabled: {}", enabled);
    }

    fn show_measure_continuously(&mut self, enabled: bool) {
        info!("Measure continuously: {}", enabled);
    }

    fn show_current_range(&mut self, text: &str) {
        info!("Current range: {}A", text);
    }

    fn show_speed(&mut self, speed: SpeedTier) {
        info!("Speed: {}", speed);
    }

    fn show_device_status(&mut self, text: &str) {
        info!("Keithley: {}", text);
    }

    fn show_broker_status(&mut self, text: &str) {
        info!("MQTT: {}", text);
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting Keithley 6517B MQTT console (mqtt={}:{}, device={}, topic base={})",
        config.mqtt.broker_host, config.mqtt.broker_port, config.device_name, config.topic_base,
    );

    let topics = Topics::new(&config);

    // Channels: broker traffic in, publish/subscribe requests out
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let (request_tx, request_rx) = mpsc::channel(100);
    let (link_tx, link_rx) = watch::channel(BrokerStatus::Disconnected);

    let mqtt_client = MqttClient::new(&config, topics.clone());
    let mqtt_handle = tokio::spawn(async move {
        mqtt_client.run(event_tx, request_rx).await;
    });

    let gate = Arc::new(EditGate::default());
    let publisher = CommandPublisher::new(topics.clone(), request_tx.clone(), link_rx, gate.clone());

    let broker_label = format!("{}:{}", config.mqtt.broker_host, config.mqtt.broker_port);
    let mut sync = StateSynchronizer::new(Box::new(LogSurface), gate, link_tx, broker_label);
    let mut router = Router::new(topics, request_tx);

    sync.set_broker_status(BrokerStatus::Disconnected);
    sync.set_device_status(DeviceStatus::Unknown);

    let shell_handle = tokio::spawn(operator_shell(publisher));

    // Core loop: single owner of state, one event at a time
    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                router.handle_event(event, &mut sync);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down");
                break;
            }
            _ = async {
                let mut sigterm = tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate()
                ).expect("Failed to register SIGTERM handler");
                sigterm.recv().await;
            } => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    shell_handle.abort();
    mqtt_handle.abort();
    info!("Console stopped");
}

/// Minimal line-oriented stand-in for the GUI's edit events. Reads commands
/// from stdin and forwards them through the publisher.
async fn operator_shell(publisher: CommandPublisher) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    // mirrors the GUI speed selector: remembered locally, sent with measure
    let mut speed = SpeedTier::Medium;

    while let Ok(Some(line)) = lines.next_line().await {
        handle_line(line.trim(), &publisher, &mut speed);
    }
}

fn handle_line(line: &str, publisher: &CommandPublisher, speed: &mut SpeedTier) {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return;
    };
    let arg = parts.next();

    match (command, arg) {
        ("voltage", Some(value)) => match value.parse() {
            Ok(volts) => publisher.publish_source_voltage(volts),
            Err(_) => warn!("Not a voltage: {}", value),
        },
        ("enable", Some(value)) => match parse_switch(value) {
            Some(on) => publisher.publish_source_voltage_enable(on),
            None => warn!("Expected on/off, got: {}", value),
        },
        ("continuous", Some(value)) => match parse_switch(value) {
            Some(on) => publisher.publish_measure_continuously(on),
            None => warn!("Expected on/off, got: {}", value),
        },
        ("range", Some("auto")) => publisher.publish_measure(speed.nplc(), 0.0, true),
        ("range", Some(value)) => match value.parse() {
            Ok(amps) => publisher.publish_current_range(amps),
            Err(_) => warn!("Not a current range: {}", value),
        },
        ("speed", Some(value)) => match parse_speed(value) {
            Some(tier) => {
                *speed = tier;
                publisher.publish_measure(tier.nplc(), 0.0, true);
            }
            None => warn!("Expected fast/medium/slow/high, got: {}", value),
        },
        ("measure", None) => publisher.publish_measure(speed.nplc(), 0.0, true),
        ("shutdown", None) => publisher.publish_shutdown(),
        ("reset", None) => publisher.publish_reset(),
        ("help", _) => {
            println!("commands:");
            println!("  voltage <V>          set source voltage");
            println!("  enable on|off        toggle source voltage output");
            println!("  continuous on|off    toggle continuous measurement");
            println!("  range auto|<amps>    set current range");
            println!("  speed fast|medium|slow|high");
            println!("  measure              trigger a measurement");
            println!("  shutdown | reset");
        }
        _ => warn!("Unknown command: {} (try 'help')", line),
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn parse_speed(value: &str) -> Option<SpeedTier> {
    match value {
        "fast" => Some(SpeedTier::Fast),
        "medium" => Some(SpeedTier::Medium),
        "slow" => Some(SpeedTier::Slow),
        "high" => Some(SpeedTier::HighAccuracy),
        _ => None,
    }
}
