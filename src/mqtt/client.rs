use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::console::topic::Topics;

use super::{InboundMessage, MqttEvent, TransportRequest};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct MqttClient {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
}

impl MqttClient {
    pub fn new(config: &Config, topics: Topics) -> Self {
        let mut mqttopts = MqttOptions::new(
            &config.mqtt.client_id,
            &config.mqtt.broker_host,
            config.mqtt.broker_port,
        );
        mqttopts.set_keep_alive(Duration::from_secs(config.mqtt.connection_timeout_secs));

        if let (Some(user), Some(pass)) = (&config.mqtt.username, &config.mqtt.password) {
            mqttopts.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(mqttopts, 100);

        Self {
            client,
            eventloop,
            topics,
        }
    }

    /// Run the MQTT event loop. Subscribes to the device topics on every
    /// CONNACK (rumqttc does not replay subscriptions across reconnects),
    /// forwards incoming publishes and link-state changes through `event_tx`,
    /// and drains publish/subscribe requests from `request_rx`.
    pub async fn run(
        mut self,
        event_tx: mpsc::Sender<MqttEvent>,
        mut request_rx: mpsc::Receiver<TransportRequest>,
    ) {
        let _ = event_tx.send(MqttEvent::Connecting).await;

        loop {
            tokio::select! {
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(incoming)) => {
                            match incoming {
                                Incoming::ConnAck(_) => {
                                    info!("Connected to MQTT broker");
                                    Self::subscribe_all(&self.client, self.topics.subscriptions()).await;
                                    let _ = event_tx.send(MqttEvent::Connected).await;
                                }
                                Incoming::Publish(publish) => {
                                    let msg = InboundMessage {
                                        topic: publish.topic.clone(),
                                        payload: publish.payload.to_vec(),
                                    };
                                    if event_tx.send(MqttEvent::Message(msg)).await.is_err() {
                                        warn!("Event channel closed, stopping transport");
                                        return;
                                    }
                                }
                                _ => {}
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("MQTT connection error: {}. Reconnecting...", e);
                            let _ = event_tx.send(MqttEvent::ConnectionLost(e.to_string())).await;
                            tokio::time::sleep(RECONNECT_DELAY).await;
                            let _ = event_tx.send(MqttEvent::Connecting).await;
                        }
                    }
                }
                Some(request) = request_rx.recv() => {
                    match request {
                        TransportRequest::Publish { topic, payload } => {
                            if let Err(e) = self
                                .client
                                .publish(&topic, QoS::AtMostOnce, false, payload)
                                .await
                            {
                                warn!("Failed to publish {}: {}", topic, e);
                            }
                        }
                        TransportRequest::Subscribe(topics) => {
                            Self::subscribe_all(&self.client, topics).await;
                        }
                    }
                }
            }
        }
    }

    async fn subscribe_all(client: &AsyncClient, topics: Vec<String>) {
        for topic in topics {
            if let Err(e) = client.subscribe(&topic, QoS::AtMostOnce).await {
                error!("Failed to subscribe to {}: {}", topic, e);
            }
        }
    }
}
