use embassy_time::Duration;

use super::state::{advance, MqttState};
use super::urc_handler::InboundMessage;
use super::{AtEngine, Sequence};
use crate::command::{mqtt, Ack, Command};
use crate::config::{MqttConfig, Timing};
use crate::console::Console;
use crate::error::Error;
use crate::transport::Uart;

/// Establish the MQTT session and subscribe to the command topic.
///
/// Every step is lenient: unless the transport fails, the sequence runs to
/// the end and reports how far each key step was confirmed.
pub struct MqttBringUp<'a> {
    mqtt: &'a MqttConfig<'a>,
    timing: &'a Timing,
}

impl<'a> MqttBringUp<'a> {
    pub fn new(mqtt: &'a MqttConfig<'a>, timing: &'a Timing) -> Self {
        Self { mqtt, timing }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    pub state: MqttState,
    pub connect: Ack,
    pub subscribe: Ack,
}

impl<U: Uart, C: Console> Sequence<U, C> for MqttBringUp<'_> {
    type Output = Session;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Session, Error> {
        let settle = self.timing.mqtt_settle;
        let mut state = MqttState::Disconnected;

        // Clean slate; both commands fail harmlessly when nothing is running
        lenient(Ack::from(&at.execute(&mqtt::STOP).await?), "stop");
        at.settle(settle).await?;
        lenient(Ack::from(&at.execute(&mqtt::RELEASE).await?), "release");
        at.settle(settle).await?;

        lenient(Ack::from(&at.execute(&mqtt::START).await?), "start");
        // The service needs a moment before it accepts a client
        at.settle(settle * 3).await?;

        let acquire = mqtt::acquire(self.mqtt.client_id)?;
        let command = Command::new(&acquire).timeout(mqtt::ACQUIRE_TIMEOUT);
        lenient(Ack::from(&at.execute(&command).await?), "acquire client");
        at.settle(settle).await?;

        advance(&mut state, MqttState::Connecting);
        info!("Connecting to {}:{}", self.mqtt.broker, self.mqtt.port);
        let connect = mqtt::connect(self.mqtt)?;
        let command = Command::new(&connect)
            .timeout(self.timing.connect_timeout)
            .until(mqtt::CONNECT_UNTIL)
            .expect(mqtt::CONNECT_OK);
        let connect = lenient(Ack::from(&at.execute(&command).await?), "connect");
        // Proceed as connected even when the result code was not seen
        advance(&mut state, MqttState::Connected);
        at.settle(settle).await?;

        let subscribe = mqtt::subscribe(self.mqtt.subscribe_topic, self.mqtt.qos)?;
        let command = Command::new(&subscribe)
            .timeout(self.timing.subscribe_timeout)
            .until(mqtt::SUBSCRIBE_UNTIL)
            .expect(mqtt::SUBSCRIBE_OK)
            .ignore(mqtt::SUBSCRIBE_IGNORE);
        let subscribe = lenient(Ack::from(&at.execute(&command).await?), "subscribe");
        if subscribe != Ack::Unclear {
            advance(&mut state, MqttState::Subscribed);
            info!("Subscribed to {}", self.mqtt.subscribe_topic);
        }

        Ok(Session {
            state,
            connect,
            subscribe,
        })
    }
}

fn lenient(ack: Ack, step: &str) -> Ack {
    if ack == Ack::Unclear {
        warn!("MQTT {} unclear, proceeding", step);
    }
    ack
}

/// Publish one message on client 0.
///
/// Topic and payload are handed over without waiting for the data prompts,
/// each followed by a settle delay. Only the final `AT+CMQTTPUB` is awaited.
pub struct Publish<'a> {
    topic: &'a str,
    payload: &'a str,
    qos: u8,
    timeout_secs: u8,
    timing: &'a Timing,
}

impl<'a> Publish<'a> {
    pub fn new(mqtt: &'a MqttConfig<'a>, payload: &'a str, timing: &'a Timing) -> Self {
        Self {
            topic: mqtt.publish_topic,
            payload,
            qos: mqtt.qos,
            timeout_secs: mqtt.publish_timeout_secs,
            timing,
        }
    }

    pub fn topic(mut self, topic: &'a str) -> Self {
        self.topic = topic;
        self
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for Publish<'_> {
    type Output = Ack;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Ack, Error> {
        let settle = self.timing.publish_settle;
        debug!("Publishing {} bytes to {}", self.payload.len(), self.topic);

        at.send_line(&mqtt::topic_len(self.topic.len())?).await?;
        at.settle(settle).await?;
        at.send_line(self.topic).await?;
        at.settle(settle).await?;

        at.send_line(&mqtt::payload_len(self.payload.len())?).await?;
        at.settle(settle).await?;
        at.send_line(self.payload).await?;
        at.settle(settle).await?;

        let publish = mqtt::publish(self.qos, self.timeout_secs)?;
        let command = Command::new(&publish)
            .timeout(self.timing.publish_ack_timeout)
            .until(mqtt::PUBLISH_UNTIL)
            .expect(mqtt::PUBLISH_OK);
        let ack = Ack::from(&at.execute(&command).await?);
        if ack == Ack::Unclear {
            warn!("Publish to {} not acknowledged", self.topic);
        }
        Ok(ack)
    }
}

/// Hand out one received message, if any.
///
/// Messages captured while other sequences ran come first. Otherwise any
/// pending output is read, and a receive block that has started is read to
/// its end or until the modem goes quiet for the idle time.
pub struct InboundDrain {
    idle: Duration,
}

impl InboundDrain {
    pub fn new(timing: &Timing) -> Self {
        Self {
            idle: timing.inbound_idle,
        }
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for InboundDrain {
    type Output = Option<InboundMessage>;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Option<InboundMessage>, Error> {
        let message = at.receive_inbound(self.idle).await?;
        if let Some(message) = &message {
            info!("Received message on {}", message.topic.as_str());
        }
        Ok(message)
    }
}
