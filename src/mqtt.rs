// MIT License - Copyright (c) 2026 Peter Wright
// MQTT transport: publishing, last will and the client event loop

use std::sync::Arc;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::config::MqttToml;
use crate::error::Result;

pub const AVAILABILITY_ONLINE: &str = "online";
pub const AVAILABILITY_OFFLINE: &str = "offline";

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// The message bus as seen by the bridge and the event loop.
///
/// Every publish and subscription is QoS 1; only retention varies.
#[async_trait]
pub trait BusClient: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl BusClient for AsyncClient {
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload.as_bytes().to_vec())
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        AsyncClient::subscribe(self, topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        AsyncClient::disconnect(self).await?;
        Ok(())
    }
}

/// Build client options with an `offline` last will on the availability topic.
pub fn mqtt_options(settings: &MqttToml, availability_topic: &str) -> MqttOptions {
    let mut opts = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
    opts.set_keep_alive(KEEP_ALIVE);
    opts.set_last_will(LastWill::new(
        availability_topic,
        AVAILABILITY_OFFLINE,
        QoS::AtLeastOnce,
        true,
    ));
    if let Some(username) = &settings.username {
        opts.set_credentials(username, settings.password.clone().unwrap_or_default());
    }
    opts
}

/// What the event loop should do after one event has been handled.
#[derive(Debug, PartialEq, Eq)]
pub enum EventAction {
    Continue,
    /// Payload received on the command topic
    Command(Vec<u8>),
    Stop,
}

/// Handle one event from the MQTT event loop.
///
/// On every broker (re)connect the command topic is subscribed again and
/// `online` is published, so availability tracks bus connectivity only.
pub async fn handle_event(
    event: Event,
    bus: &dyn BusClient,
    command_topic: &str,
    availability_topic: &str,
) -> EventAction {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            info!("MQTT: connected ({:?}), subscribing to {command_topic}", ack.code);
            // rumqttc does not resubscribe on its own after a reconnect
            if let Err(e) = bus.subscribe(command_topic).await {
                error!("Failed to subscribe to {command_topic}: {e}");
            }
            if let Err(e) = bus.publish(availability_topic, AVAILABILITY_ONLINE, true).await {
                error!("Failed to publish availability: {e}");
            }
            EventAction::Continue
        }
        Event::Incoming(Packet::Publish(msg)) if msg.topic == command_topic => {
            debug!("MQTT: {} {:?} (qos={:?})", msg.topic, msg.payload, msg.qos);
            EventAction::Command(msg.payload.to_vec())
        }
        Event::Incoming(Packet::Disconnect) => {
            warn!("MQTT: broker closed the connection");
            EventAction::Continue
        }
        Event::Outgoing(Outgoing::Disconnect) => {
            info!("MQTT: client disconnected");
            EventAction::Stop
        }
        _ => EventAction::Continue,
    }
}

/// Drive the MQTT connection until the client disconnects.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    bridge: Arc<Bridge>,
    command_topic: String,
    availability_topic: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(event) => {
                match handle_event(event, &client, &command_topic, &availability_topic).await {
                    EventAction::Continue => {}
                    EventAction::Command(payload) => bridge.on_message(&payload).await,
                    EventAction::Stop => break,
                }
            }
            Err(e) => {
                error!("MQTT event loop error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, ConnectReturnCode, Publish};
    use std::sync::Mutex;

    const COMMANDS: &str = "home/alarm/set";
    const AVAILABILITY: &str = "home/alarm/availability";

    #[derive(Default)]
    struct RecordingBus {
        published: Mutex<Vec<(String, String, bool)>>,
        subscribed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BusClient for RecordingBus {
        async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), retain));
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> Result<()> {
            self.subscribed.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    async fn handle(bus: &RecordingBus, event: Event) -> EventAction {
        handle_event(event, bus, COMMANDS, AVAILABILITY).await
    }

    fn connack() -> Event {
        Event::Incoming(Packet::ConnAck(ConnAck::new(ConnectReturnCode::Success, false)))
    }

    fn incoming(topic: &str, payload: &str) -> Event {
        Event::Incoming(Packet::Publish(Publish::new(
            topic,
            QoS::AtLeastOnce,
            payload.as_bytes().to_vec(),
        )))
    }

    #[tokio::test]
    async fn test_connack_subscribes_and_announces_online() {
        let bus = RecordingBus::default();
        assert_eq!(handle(&bus, connack()).await, EventAction::Continue);

        assert_eq!(*bus.subscribed.lock().unwrap(), vec![COMMANDS.to_string()]);
        assert_eq!(
            *bus.published.lock().unwrap(),
            vec![(AVAILABILITY.to_string(), "online".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_every_reconnect_resubscribes() {
        let bus = RecordingBus::default();
        handle(&bus, connack()).await;
        handle(&bus, Event::Incoming(Packet::Disconnect)).await;
        handle(&bus, connack()).await;

        assert_eq!(bus.subscribed.lock().unwrap().len(), 2);
        assert_eq!(bus.published.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_command_topic_payload_is_forwarded() {
        let bus = RecordingBus::default();
        let action = handle(&bus, incoming(COMMANDS, "ARM_AWAY")).await;
        assert_eq!(action, EventAction::Command(b"ARM_AWAY".to_vec()));
        assert!(bus.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_topics_are_ignored() {
        let bus = RecordingBus::default();
        let action = handle(&bus, incoming("home/alarm", "DISARM")).await;
        assert_eq!(action, EventAction::Continue);
    }

    #[tokio::test]
    async fn test_client_disconnect_stops_loop() {
        let bus = RecordingBus::default();
        let action = handle(&bus, Event::Outgoing(Outgoing::Disconnect)).await;
        assert_eq!(action, EventAction::Stop);

        let action = handle(&bus, Event::Incoming(Packet::Disconnect)).await;
        assert_eq!(action, EventAction::Continue);
    }

    fn settings(username: Option<&str>) -> MqttToml {
        MqttToml {
            host: "broker.local".to_string(),
            port: 1884,
            username: username.map(str::to_string),
            password: Some("pw".to_string()),
            client_id: "arlo-test".to_string(),
        }
    }

    #[test]
    fn test_options_last_will() {
        let opts = mqtt_options(&settings(None), "home/alarm/availability");
        assert_eq!(opts.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(opts.client_id(), "arlo-test");
        assert_eq!(opts.keep_alive(), KEEP_ALIVE);

        let will = opts.last_will().unwrap();
        assert_eq!(will.topic, "home/alarm/availability");
        assert_eq!(&will.message[..], b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
        assert!(opts.credentials().is_none());
    }

    #[test]
    fn test_options_credentials() {
        let opts = mqtt_options(&settings(Some("ha")), "a");
        assert_eq!(opts.credentials(), Some(("ha".to_string(), "pw".to_string())));
    }
}
