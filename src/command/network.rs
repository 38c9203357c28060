//! ### Network service and packet domain commands
use core::fmt::Write;

use embassy_time::Duration;

use super::{Command, CommandLine, RawResponse};
use crate::config::Apn;
use crate::error::Error;

/// Enter PIN, read form. Succeeds only when the SIM reports `READY`.
pub const PIN_STATUS: Command<'static> = Command::new("AT+CPIN?").expect(&[SIM_READY]);
pub const SIM_READY: &str = "READY";

/// Network registration, read form
pub const REGISTRATION: Command<'static> =
    Command::new("AT+CREG?").timeout(Duration::from_millis(1000));

/// `<stat>` suffixes meaning registered, home (1) or roaming (5)
pub const REGISTERED: [&str; 2] = [",1", ",5"];

/// Signal quality report
pub const SIGNAL_QUALITY: Command<'static> = Command::new("AT+CSQ");

/// `AT+CGDCONT=1,"IP","<apn>"`
pub fn define_context(apn: &Apn<'_>) -> Result<CommandLine, Error> {
    let mut line = CommandLine::new();
    write!(line, "AT+CGDCONT=1,\"IP\",\"{}\"", apn.name)?;
    Ok(line)
}

/// `AT+CGAUTH=1,<auth>,"<user>","<password>"`, only when the APN carries
/// credentials.
pub fn authenticate(apn: &Apn<'_>) -> Result<Option<CommandLine>, Error> {
    let (Some(username), Some(password)) = (apn.username, apn.password) else {
        return Ok(None);
    };

    let mut line = CommandLine::new();
    write!(
        line,
        "AT+CGAUTH=1,{},\"{}\",\"{}\"",
        apn.auth as u8, username, password
    )?;
    Ok(Some(line))
}

/// Registration check used to decide attach success.
pub fn is_registered(response: &RawResponse) -> bool {
    REGISTERED.iter().any(|m| response.contains(m))
}

/// 3GPP registration status as reported by `+CREG`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::Unknown,
            5 => Self::Roaming,
            _ => Self::None,
        }
    }
}

impl Status {
    pub fn registered(&self) -> bool {
        matches!(self, Self::Home | Self::Roaming)
    }
}

/// Parse `<stat>` out of `+CREG: <n>,<stat>[,...]`.
pub fn registration_status(response: &RawResponse) -> Status {
    response
        .lines()
        .find_map(|line| line.strip_prefix("+CREG:"))
        .and_then(|params| params.split(',').nth(1))
        .and_then(|stat| stat.trim().parse::<u8>().ok())
        .map(Status::from)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    /// 0..=31, 99 when not known
    pub rssi: u8,
    /// 0..=7, 99 when not known
    pub ber: u8,
}

impl SignalQuality {
    /// Approximate received power in dBm.
    pub fn dbm(&self) -> Option<i16> {
        (self.rssi <= 31).then(|| -113 + 2 * self.rssi as i16)
    }
}

/// Parse `+CSQ: <rssi>,<ber>`.
pub fn parse_signal_quality(response: &RawResponse) -> Option<SignalQuality> {
    let params = response
        .lines()
        .find_map(|line| line.strip_prefix("+CSQ:"))?;
    let mut fields = params.split(',').map(|f| f.trim().parse::<u8>().ok());
    Some(SignalQuality {
        rssi: fields.next()??,
        ber: fields.next()??,
    })
}
