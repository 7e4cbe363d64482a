use crate::config::{MqttConfig, PayloadFormat};
use crate::sink::{Measurement, ReadingSink, SinkError};
use async_trait::async_trait;
use log::{debug, error, info};
use rumqttc::{AsyncClient, Event, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Receiver, Sender};

pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

pub enum Transmission {
    Measurement { meter: String, measurement: Measurement },
    Publish(PublishData),
}

/// Owns the broker connection; every publish of every meter goes through here.
pub struct MqttManager {
    rx: Receiver<Transmission>,
    client: AsyncClient,
    base_topic: String,
    format: PayloadFormat,
}

pub fn status_topic(base_topic: &str) -> String {
    format!("{}/status", base_topic)
}

pub fn measurement_topic(base_topic: &str, meter: &str, category: &str) -> String {
    format!("{}/{}/{}", base_topic, meter, category)
}

pub fn encode_measurement(format: PayloadFormat, measurement: &Measurement) -> Result<String, SinkError> {
    match format {
        PayloadFormat::Json => Ok(serde_json::to_string(measurement)?),
        PayloadFormat::Influx => Ok(measurement.to_line_protocol()),
    }
}

impl MqttManager {
    pub fn new(config: &MqttConfig) -> (Self, Sender<Transmission>) {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        info!("MQTT connection starting up");
        let status = status_topic(&config.base_topic);
        let mut mqttoptions = MqttOptions::new(config.client_name.clone(), config.host.clone(), config.port);
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        mqttoptions.set_last_will(LastWill::new(status.clone(), "offline", QoS::AtLeastOnce, true));
        if !config.user.is_empty() {
            mqttoptions.set_credentials(config.user.clone(), config.pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);

        let status_c = client.clone();
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected to MQTT broker");
                        let client_clone = status_c.clone();
                        let topic = status.clone();
                        tokio::spawn(async move {
                            if let Err(e) = client_clone.publish(topic, QoS::AtLeastOnce, true, "online").await {
                                error!("Error publishing status: {}", e);
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        return (MqttManager {
            rx: mrx,
            client,
            base_topic: config.base_topic.clone(),
            format: config.format,
        }, mtx);
    }

    /// Publishes queued transmissions. A full client queue (broker away)
    /// drops the message with an error log instead of waiting.
    pub async fn start_thread(&mut self) {
        while let Some(transmission) = self.rx.recv().await {
            match transmission {
                Transmission::Measurement { meter, measurement } => {
                    let topic = measurement_topic(&self.base_topic, &meter, &measurement.category);
                    let payload = match encode_measurement(self.format, &measurement) {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!("Unable to encode {} measurement: {}", measurement.category, e);
                            continue;
                        }
                    };
                    match self.client.try_publish(topic.clone(), QoS::AtLeastOnce, false, payload) {
                        Err(e) => { error!("Error sending to {}: {}", topic, e); },
                        Ok(_) => { debug!("Send {} successfully", topic); }
                    }
                }
                Transmission::Publish(publish_data) => {
                    match self.client.try_publish(publish_data.topic, QoS::AtLeastOnce, publish_data.retain, publish_data.payload) {
                        Err(e) => { error!("Error publishing: {}", e); },
                        Ok(_) => { debug!("Published successfully"); }
                    }
                }
            }
        }

        info!("All senders gone, MQTT thread exits");
    }
}

/// Sink handle of one meter, cheap to clone.
#[derive(Clone)]
pub struct MqttSink {
    sender: Sender<Transmission>,
    meter: String,
}

impl MqttSink {
    pub fn new(sender: Sender<Transmission>, meter: &str) -> Self {
        MqttSink { sender, meter: meter.to_string() }
    }
}

#[async_trait]
impl ReadingSink for MqttSink {
    async fn insert(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let transmission = Transmission::Measurement {
            meter: self.meter.clone(),
            measurement: measurement.clone(),
        };
        match self.sender.try_send(transmission) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SinkError::Transport("MQTT queue full, measurement dropped".to_string())),
            Err(TrySendError::Closed(_)) => Err(SinkError::Transport("MQTT manager stopped".to_string())),
        }
    }
}
