//! ### MQTT(S) client commands
//!
//! Client index 0 is the only one used.
use core::fmt::Write;

use embassy_time::Duration;

use super::{Command, CommandLine, Marker, ERROR};
use crate::config::MqttConfig;
use crate::error::Error;

/// Stop the MQTT service. `+CMQTTSTOP: 21` means it was not running.
pub const STOP: Command<'static> = Command::new("AT+CMQTTSTOP")
    .timeout(Duration::from_millis(3000))
    .ignore(STOP_IGNORE);
pub const STOP_IGNORE: &[&str] = &["+CMQTTSTOP: 21"];

/// Release client 0
pub const RELEASE: Command<'static> = Command::new("AT+CMQTTREL=0");

/// Start the MQTT service. `+CMQTTSTART: 23` reports the network as not
/// ready yet; the service is still usable.
pub const START: Command<'static> = Command::new("AT+CMQTTSTART")
    .timeout(Duration::from_millis(5000))
    .ignore(START_IGNORE);
pub const START_IGNORE: &[&str] = &["+CMQTTSTART: 23"];

pub const ACQUIRE_TIMEOUT: Duration = Duration::from_millis(5000);

pub const CONNECT_UNTIL: &[Marker<'static>] = &[Marker::Line("+CMQTTCONNECT:"), ERROR];
pub const CONNECT_OK: &[&str] = &["+CMQTTCONNECT: 0,0"];

pub const SUBSCRIBE_UNTIL: &[Marker<'static>] = &[Marker::Line("+CMQTTSUB:"), ERROR];
pub const SUBSCRIBE_OK: &[&str] = &["+CMQTTSUB: 0,0"];
/// Topic format rejected; the session stays up
pub const SUBSCRIBE_IGNORE: &[&str] = &["+CMQTTSUB: 0,12"];

pub const PUBLISH_UNTIL: &[Marker<'static>] = &[Marker::Line("+CMQTTPUB:"), ERROR];
pub const PUBLISH_OK: &[&str] = &["+CMQTTPUB: 0,0"];

/// Unsolicited result codes framing a received message
pub const RX_START: &str = "+CMQTTRXSTART";
pub const RX_TOPIC: &str = "+CMQTTRXTOPIC";
pub const RX_PAYLOAD: &str = "+CMQTTRXPAYLOAD";
pub const RX_END: &str = "+CMQTTRXEND";

/// `AT+CMQTTACCQ=0,"<client id>"`
pub fn acquire(client_id: &str) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMQTTACCQ=0,\"{}\"", client_id)?;
    Ok(line)
}

/// `AT+CMQTTCONNECT=0,"tcp://<host>:<port>",<keepalive>,<clean>[,"<user>","<pass>"]`
pub fn connect(mqtt: &MqttConfig<'_>) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(
        line,
        "AT+CMQTTCONNECT=0,\"tcp://{}:{}\",{},{}",
        mqtt.broker, mqtt.port, mqtt.keepalive_secs, mqtt.clean_session as u8
    )?;
    if let Some(username) = mqtt.username {
        write!(line, ",\"{}\"", username)?;
        if let Some(password) = mqtt.password {
            write!(line, ",\"{}\"", password)?;
        }
    }
    Ok(line)
}

/// `AT+CMQTTSUB=0,"<topic>",<qos>`
pub fn subscribe(topic: &str, qos: u8) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMQTTSUB=0,\"{}\",{}", topic, qos)?;
    Ok(line)
}

/// `AT+CMQTTTOPIC=0,<len>`, followed by the raw topic.
pub fn topic_len(len: usize) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMQTTTOPIC=0,{}", len)?;
    Ok(line)
}

/// `AT+CMQTTPAYLOAD=0,<len>`, followed by the raw payload.
pub fn payload_len(len: usize) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMQTTPAYLOAD=0,{}", len)?;
    Ok(line)
}

/// `AT+CMQTTPUB=0,<qos>,<timeout>`
pub fn publish(qos: u8, timeout_secs: u8) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CMQTTPUB=0,{},{}", qos, timeout_secs)?;
    Ok(line)
}

/// `true` if `line` opens or belongs to an inbound message block.
pub fn is_inbound_start(line: &str) -> bool {
    [RX_START, RX_TOPIC, RX_PAYLOAD]
        .iter()
        .any(|urc| line.contains(urc))
}
