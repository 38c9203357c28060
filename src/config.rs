use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, OutputPin};
use serde::Deserialize;

use crate::error::Error;
use crate::module_timing;

pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Complete device configuration.
///
/// Every field has a default (see [`Config::default`]), so a JSON document
/// passed to [`Config::from_json`] only needs to name what differs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config<'a> {
    pub uart: UartConfig,
    /// I2C address of the digital output expander
    pub expander_address: u8,
    /// Expander line wired to the modem `PWRKEY`
    pub pwrkey_line: u8,
    /// Pulse `PWRKEY` during init. Leave off when the module is already
    /// running (its `LED_WWAN` blinks).
    pub power_cycle_on_boot: bool,
    #[serde(borrow)]
    pub apn: Apn<'a>,
    #[serde(borrow)]
    pub mqtt: MqttConfig<'a>,
    /// SMS sent once network attach succeeded
    #[serde(borrow)]
    pub startup_sms: Option<Sms<'a>>,
    #[serde(skip)]
    pub timing: Timing,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            uart: UartConfig::default(),
            expander_address: 0x27,
            pwrkey_line: 9,
            power_cycle_on_boot: false,
            apn: Apn::default(),
            mqtt: MqttConfig::default(),
            startup_sms: None,
            timing: Timing::default(),
        }
    }
}

impl<'a> Config<'a> {
    /// Parse a configuration from JSON, borrowing strings from `json`.
    pub fn from_json(json: &'a str) -> Result<Self, Error> {
        serde_json_core::from_str::<Config<'a>>(json)
            .map(|(config, _)| config)
            .map_err(|_| Error::Config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    /// MCU RX pin, wired to the modem TX
    pub rx_pin: u8,
    /// MCU TX pin, wired to the modem RX
    pub tx_pin: u8,
    pub baud_rate: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            rx_pin: 19,
            tx_pin: 20,
            baud_rate: 115_200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AuthType {
    None = 0,
    #[default]
    Pap = 1,
    Chap = 2,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Apn<'a> {
    pub name: &'a str,
    #[serde(borrow)]
    pub username: Option<&'a str>,
    #[serde(borrow)]
    pub password: Option<&'a str>,
    pub auth: AuthType,
}

impl Default for Apn<'_> {
    fn default() -> Self {
        Self {
            name: "safaricom",
            username: Some("saf"),
            password: Some("data"),
            auth: AuthType::Pap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig<'a> {
    pub broker: &'a str,
    pub port: u16,
    #[serde(borrow)]
    pub username: Option<&'a str>,
    #[serde(borrow)]
    pub password: Option<&'a str>,
    pub client_id: &'a str,
    pub keepalive_secs: u16,
    pub clean_session: bool,
    pub publish_topic: &'a str,
    pub subscribe_topic: &'a str,
    pub qos: u8,
    /// Publish timeout handed to `AT+CMQTTPUB`
    pub publish_timeout_secs: u8,
}

impl Default for MqttConfig<'_> {
    fn default() -> Self {
        Self {
            broker: "broker.hivemq.com",
            port: 1883,
            username: None,
            password: None,
            client_id: "SIM7600_ESP32_Client",
            keepalive_secs: 90,
            clean_session: true,
            publish_topic: "test/sim7600/status",
            subscribe_topic: "test/sim7600/command",
            qos: 1,
            publish_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Sms<'a> {
    pub recipient: &'a str,
    pub text: &'a str,
}

/// Delays, poll cadences and the long per-step timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub pwrkey_lead: Duration,
    pub pwrkey_pulse: Duration,
    pub boot_wait: Duration,
    pub stabilize: Duration,
    pub baud_switch_settle: Duration,
    pub probe_timeout: Duration,

    pub registration_attempts: u8,
    pub registration_interval: Duration,
    pub network_settle: Duration,

    pub mqtt_settle: Duration,
    pub connect_timeout: Duration,
    pub subscribe_timeout: Duration,
    pub publish_settle: Duration,
    pub publish_ack_timeout: Duration,
    /// Quiet time after which an inbound message is considered complete
    pub inbound_idle: Duration,

    pub sms_settle: Duration,
    pub sms_body_settle: Duration,
    pub sms_prompt_timeout: Duration,
    pub sms_confirm_timeout: Duration,

    pub publish_period: Duration,
    pub poll_period: Duration,
    pub watchdog_period: Duration,
    /// Bounded wait for the AT engine lock in multi-task mode
    pub lock_wait: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pwrkey_lead: module_timing::pwr_on_lead_time(),
            pwrkey_pulse: module_timing::pwr_on_time(),
            boot_wait: module_timing::boot_time(),
            stabilize: module_timing::stabilize_time(),
            baud_switch_settle: module_timing::baud_switch_time(),
            probe_timeout: Duration::from_secs(2),

            registration_attempts: 20,
            registration_interval: Duration::from_secs(2),
            network_settle: Duration::from_secs(5),

            mqtt_settle: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(5),
            publish_settle: Duration::from_secs(1),
            publish_ack_timeout: Duration::from_secs(10),
            inbound_idle: Duration::from_millis(100),

            sms_settle: Duration::from_millis(500),
            sms_body_settle: Duration::from_millis(100),
            sms_prompt_timeout: Duration::from_secs(5),
            sms_confirm_timeout: Duration::from_secs(10),

            publish_period: Duration::from_secs(30),
            poll_period: Duration::from_millis(100),
            watchdog_period: Duration::from_secs(10),
            lock_wait: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_reference_board() {
        let config = Config::default();
        assert_eq!(config.uart.baud_rate, 115_200);
        assert_eq!(config.uart.rx_pin, 19);
        assert_eq!(config.pwrkey_line, 9);
        assert_eq!(config.timing.registration_attempts, 20);
        assert!(!config.power_cycle_on_boot);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = Config::from_json(
            r#"{"pwrkey_line":4,"apn":{"name":"internet","auth":"none"},"mqtt":{"broker":"mqtt.local","username":"dev","password":"secret"}}"#,
        )
        .unwrap();

        assert_eq!(config.pwrkey_line, 4);
        assert_eq!(config.apn.name, "internet");
        assert_eq!(config.apn.auth, AuthType::None);
        assert_eq!(config.apn.username, Some("saf"));
        assert_eq!(config.mqtt.broker, "mqtt.local");
        assert_eq!(config.mqtt.username, Some("dev"));
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.uart, UartConfig::default());
        assert!(config.startup_sms.is_none());
    }

    #[test]
    fn startup_sms_from_json() {
        let config =
            Config::from_json(r#"{"startup_sms":{"recipient":"+15550100","text":"hello"}}"#)
                .unwrap();
        assert_eq!(
            config.startup_sms,
            Some(Sms {
                recipient: "+15550100",
                text: "hello"
            })
        );
    }

    #[test]
    fn malformed_json_is_config_error() {
        assert_eq!(
            Config::from_json(r#"{"pwrkey_line":"nine"}"#).unwrap_err(),
            Error::Config
        );
    }
}
