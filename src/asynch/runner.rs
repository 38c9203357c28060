use core::fmt::Write as _;

use embassy_time::{Duration, Instant, Timer};
use heapless::String;

use super::bridge::{Bridge, BRIDGE_POLL};
use super::mqtt::{InboundDrain, MqttBringUp, Publish, Session};
use super::network::NetworkAttach;
use super::probe::LivenessProbe;
use super::sms::SendSms;
use super::state::{self, LinkState, MqttState};
use super::urc_handler::InboundMessage;
use super::{power_on, AtEngine, Sequence};
use crate::command::{general, network};
use crate::config::{Config, Sms, Timing};
use crate::console::Console;
use crate::error::Error;
use crate::expander::IoExpander;
use crate::transport::Uart;

/// Published once the MQTT session is up
pub const ONLINE_MESSAGE: &str = "SIM7600 online!";

pub type UptimePayload = String<32>;

/// `Uptime: <secs> seconds`
pub fn uptime_payload(secs: u64) -> Result<UptimePayload, Error> {
    let mut payload = UptimePayload::new();
    write!(payload, "Uptime: {} seconds", secs)?;
    Ok(payload)
}

/// Where a failed start-up leaves the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fallback {
    /// Hand the modem to the operator console.
    Bridge,
    /// Stop; nothing useful can run until restart.
    Halt,
}

impl From<Error> for Fallback {
    fn from(e: Error) -> Self {
        match e {
            Error::Unresponsive | Error::SimNotReady | Error::RegistrationTimeout => {
                Self::Bridge
            }
            _ => Self::Halt,
        }
    }
}

/// Find the module, switch echo off and log its identification.
pub struct Detect<'a> {
    timing: &'a Timing,
}

impl<'a> Detect<'a> {
    pub fn new(timing: &'a Timing) -> Self {
        Self { timing }
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for Detect<'_> {
    type Output = u32;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<u32, Error> {
        let baud_rate = LivenessProbe::new(self.timing).run(at).await?;

        at.execute(&general::ECHO_OFF).await?;
        at.execute(&general::IDENTIFY).await?;

        Ok(baud_rate)
    }
}

/// Echo off, a registration and signal report, then the configured SMS.
///
/// Registration is only reported here; the SMS is attempted either way.
pub struct SmsCheck<'a> {
    sms: Option<&'a Sms<'a>>,
    timing: &'a Timing,
}

impl<'a> SmsCheck<'a> {
    pub fn new(sms: Option<&'a Sms<'a>>, timing: &'a Timing) -> Self {
        Self { sms, timing }
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for SmsCheck<'_> {
    type Output = ();

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<(), Error> {
        at.execute(&general::ECHO_OFF).await?;

        let creg = network::REGISTRATION.timeout(Duration::from_millis(2000));
        let creg = at.execute(&creg).await?;
        info!(
            "Registration: {:?}",
            network::registration_status(creg.response())
        );

        let csq = network::SIGNAL_QUALITY.timeout(Duration::from_millis(1000));
        let csq = at.execute(&csq).await?;
        if let Some(signal) = network::parse_signal_quality(csq.response()) {
            info!("Signal quality: rssi {} ber {}", signal.rssi, signal.ber);
        }

        let Some(sms) = self.sms else {
            info!("No SMS configured");
            return Ok(());
        };
        at.console().write_str("\r\n=== Sending SMS ===\r\n");
        SendSms::from_config(sms, self.timing).run(at).await
    }
}

/// Everything between a live module and a subscribed MQTT session: network
/// attach, the optional start-up SMS, MQTT bring-up and the online
/// announcement. Progress is published to the shared state as it happens.
pub struct Connect<'a> {
    config: &'a Config<'a>,
    ch: state::Runner<'a>,
}

impl<'a> Connect<'a> {
    pub fn new(config: &'a Config<'a>, ch: state::Runner<'a>) -> Self {
        Self { config, ch }
    }
}

impl<U: Uart, C: Console> Sequence<U, C> for Connect<'_> {
    type Output = Session;

    async fn run(self, at: &mut AtEngine<U, C>) -> Result<Session, Error> {
        let timing = &self.config.timing;

        let attached = NetworkAttach::new(&self.config.apn, timing).run(at).await?;
        self.ch.set_registration_state(attached.state);

        if let Some(sms) = &self.config.startup_sms {
            if let Err(e) = SendSms::from_config(sms, timing).run(at).await {
                warn!("Start-up SMS failed: {:?}", e);
            }
        }

        self.ch.set_mqtt_state(MqttState::Connecting);
        let session = MqttBringUp::new(&self.config.mqtt, timing).run(at).await?;
        self.ch.set_mqtt_state(session.state);
        at.console().write_str("\r\nSystem ready, MQTT connected\r\n");

        Publish::new(&self.config.mqtt, ONLINE_MESSAGE, timing)
            .run(at)
            .await?;

        Ok(session)
    }
}

/// Single cooperative loop owning the modem.
///
/// Nothing else touches the engine, so it is never reentered while an
/// exchange is pending. Call `.run()` as the only modem task.
pub struct Runner<'a, U: Uart, C: Console, E: IoExpander> {
    at: AtEngine<U, C>,
    expander: E,
    config: &'a Config<'a>,
    ch: state::Runner<'a>,
    next_publish: Instant,
}

impl<'a, U: Uart, C: Console, E: IoExpander> Runner<'a, U, C, E> {
    pub fn new(
        at: AtEngine<U, C>,
        expander: E,
        config: &'a Config<'a>,
        ch: state::Runner<'a>,
    ) -> Self {
        Self {
            at,
            expander,
            config,
            ch,
            next_publish: Instant::now(),
        }
    }

    /// Hardware bring-up and module detection. Returns the baud rate the
    /// module answered at.
    pub async fn init(&mut self) -> Result<u32, Error> {
        debug!("Initializing module");
        power_on(&mut self.expander, self.config).await?;

        let baud_rate = Detect::new(&self.config.timing).run(&mut self.at).await?;
        self.ch.set_link_state(LinkState::Up);
        Ok(baud_rate)
    }

    pub async fn bring_up(&mut self) -> Result<Session, Error> {
        let session = Connect::new(self.config, self.ch).run(&mut self.at).await?;
        self.next_publish = Instant::now() + self.config.timing.publish_period;
        Ok(session)
    }

    /// One pass of the service loop: forward an operator line, drain an
    /// inbound message, publish the uptime when due.
    pub async fn poll(&mut self) -> Result<Option<InboundMessage>, Error> {
        let timing = &self.config.timing;

        Bridge::new(&mut self.at).service().await?;

        let message = InboundDrain::new(timing).run(&mut self.at).await?;

        if Instant::now() >= self.next_publish {
            self.next_publish = Instant::now() + timing.publish_period;
            let payload = uptime_payload(Instant::now().as_secs())?;
            info!("Publishing: {}", payload.as_str());
            Publish::new(&self.config.mqtt, &payload, timing)
                .run(&mut self.at)
                .await?;
        }

        Ok(message)
    }

    pub async fn run(mut self) -> ! {
        let started = match self.init().await {
            Ok(_) => self.bring_up().await.map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = started {
            error!("Start-up failed: {:?}", e);
            match Fallback::from(e) {
                Fallback::Bridge => {
                    self.bridge("\r\nEntering AT command mode for debugging\r\n")
                        .await
                }
                Fallback::Halt => self.halt().await,
            }
        }

        loop {
            if let Err(e) = self.poll().await {
                warn!("Service loop: {:?}", e);
            }
            Timer::after(self.config.timing.poll_period).await;
        }
    }

    /// Power on, find the module and run [`SmsCheck`].
    ///
    /// Only hardware and transport faults before the SMS check are errors.
    /// A silent module skips the check, and a failed check is logged.
    pub async fn prepare_bridge(&mut self) -> Result<(), Error> {
        power_on(&mut self.expander, self.config).await?;

        match LivenessProbe::new(&self.config.timing).run(&mut self.at).await {
            Ok(_) => self.ch.set_link_state(LinkState::Up),
            Err(Error::Unresponsive) => {
                warn!("Module not responding, skipping SMS");
                self.at
                    .console()
                    .write_str("\r\nNo response from module, bridge mode anyway\r\n");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let check = SmsCheck::new(self.config.startup_sms.as_ref(), &self.config.timing);
        if let Err(e) = check.run(&mut self.at).await {
            warn!("SMS check failed: {:?}", e);
        }
        Ok(())
    }

    /// Send one SMS, then hand the modem to the operator console for good.
    ///
    /// Alternative to [`Runner::run`] without MQTT.
    pub async fn run_sms_bridge(mut self) -> ! {
        match self.prepare_bridge().await {
            Ok(()) => {
                self.bridge("\r\n=== Now entering AT Command Bridge Mode ===\r\n")
                    .await
            }
            Err(e) => {
                error!("Start-up failed: {:?}", e);
                self.halt().await
            }
        }
    }

    pub fn at(&mut self) -> &mut AtEngine<U, C> {
        &mut self.at
    }

    async fn bridge(&mut self, banner: &str) -> ! {
        self.at.console().write_str(banner);
        Bridge::new(&mut self.at).run(BRIDGE_POLL).await
    }

    async fn halt(&mut self) -> ! {
        self.ch.set_link_state(LinkState::Down);
        self.at.console().write_str("\r\nHalted\r\n");
        loop {
            core::future::pending::<()>().await;
        }
    }
}
