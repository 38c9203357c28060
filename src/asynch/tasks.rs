//! Task bodies for multi-task mode.
//!
//! Every task goes through the shared [`Modem`], holding its lock for one
//! whole sequence. A lock that could not be taken within
//! [`Timing::lock_wait`](crate::config::Timing) is a soft error: the task
//! logs it and skips the cycle.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Instant, Ticker, Timer};

use super::bridge::{Bridge, BRIDGE_POLL};
use super::mqtt::{InboundDrain, Publish, Session};
use super::probe::Heartbeat;
use super::runner::{uptime_payload, Connect, Detect};
use super::state::{self, LinkState, MqttState};
use super::urc_handler::InboundMessage;
use super::{power_on, Modem, Sequence};
use crate::command::Ack;
use crate::config::Config;
use crate::console::Console;
use crate::error::Error;
use crate::expander::IoExpander;
use crate::transport::Uart;

/// One-time start-up. The lock is held from module detection until the
/// MQTT session is announced.
pub async fn setup<M: RawMutex, U: Uart, C: Console, E: IoExpander>(
    modem: &Modem<M, U, C>,
    expander: &mut E,
    config: &Config<'_>,
    ch: state::Runner<'_>,
) -> Result<Session, Error> {
    power_on(expander, config).await?;

    let mut at = modem.lock(config.timing.lock_wait).await?;
    let baud_rate = Detect::new(&config.timing).run(&mut *at).await?;
    ch.set_link_state(LinkState::Up);
    debug!("Module detected at {} baud", baud_rate);

    Connect::new(config, ch).run(&mut *at).await
}

pub async fn publish_once<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
) -> Result<Ack, Error> {
    let payload = uptime_payload(Instant::now().as_secs())?;
    info!("Publishing: {}", payload.as_str());
    modem
        .run(
            Publish::new(&config.mqtt, &payload, &config.timing),
            config.timing.lock_wait,
        )
        .await
}

/// Publish the uptime every [`Timing::publish_period`](crate::config::Timing)
/// once the session is connected.
pub async fn publisher<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
    ch: state::Runner<'_>,
) -> ! {
    ch.wait_for_mqtt_state(MqttState::Connected).await;

    let mut ticker = Ticker::every(config.timing.publish_period);
    loop {
        ticker.next().await;
        match publish_once(modem, config).await {
            Ok(_) => {}
            Err(Error::Busy) => debug!("Modem busy, skipping publish"),
            Err(e) => warn!("Publish failed: {:?}", e),
        }
    }
}

pub async fn poll_inbound_once<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
) -> Result<Option<InboundMessage>, Error> {
    modem
        .run(InboundDrain::new(&config.timing), config.timing.lock_wait)
        .await
}

/// Poll for received messages and hand them to `messages`. A full queue
/// drops the message.
pub async fn inbound<M: RawMutex, U: Uart, C: Console, Q: RawMutex, const N: usize>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
    ch: state::Runner<'_>,
    messages: Sender<'_, Q, InboundMessage, N>,
) -> ! {
    ch.wait_for_mqtt_state(MqttState::Connected).await;

    loop {
        match poll_inbound_once(modem, config).await {
            Ok(Some(message)) => {
                if messages.try_send(message).is_err() {
                    warn!("Inbound queue full, message dropped");
                }
            }
            Ok(None) => {}
            Err(Error::Busy) => trace!("Modem busy, skipping inbound poll"),
            Err(e) => warn!("Inbound poll failed: {:?}", e),
        }
        Timer::after(config.timing.poll_period).await;
    }
}

/// Forward one typed operator line, if any, and relay modem output.
pub async fn operator_once<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
) -> Result<bool, Error> {
    let mut at = modem.lock(config.timing.lock_wait).await?;
    Bridge::new(&mut *at).service().await
}

/// Operator console pass-through, interleaved with the other tasks one
/// line at a time.
pub async fn operator<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
) -> ! {
    loop {
        match operator_once(modem, config).await {
            Ok(_) => {}
            Err(Error::Busy) => trace!("Modem busy, skipping operator pass"),
            Err(e) => warn!("Operator bridge: {:?}", e),
        }
        Timer::after(BRIDGE_POLL).await;
    }
}

/// One heartbeat. Transport faults count as a missed beat.
pub async fn watchdog_tick<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
    ch: state::Runner<'_>,
) -> Result<LinkState, Error> {
    match modem
        .run(Heartbeat::new(&config.timing), config.timing.lock_wait)
        .await
    {
        Ok(alive) => Ok(ch.record_heartbeat(alive)),
        Err(Error::Busy) => Err(Error::Busy),
        Err(e) => {
            warn!("Heartbeat failed: {:?}", e);
            Ok(ch.record_heartbeat(false))
        }
    }
}

pub async fn watchdog<M: RawMutex, U: Uart, C: Console>(
    modem: &Modem<M, U, C>,
    config: &Config<'_>,
    ch: state::Runner<'_>,
) -> ! {
    let mut ticker = Ticker::every(config.timing.watchdog_period);
    loop {
        ticker.next().await;
        match watchdog_tick(modem, config, ch).await {
            Ok(LinkState::Down) => warn!("Module not answering"),
            Ok(LinkState::Up) => {}
            Err(_) => debug!("Modem busy, skipping heartbeat"),
        }
    }
}
